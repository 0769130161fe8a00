/// Circular intensity profiles around a center point
use crate::error::{Result, StarshotError};
use crate::geometry::Point;
use crate::image_source::StarshotImage;
use std::f64::consts::TAU;

/// Fewest samples taken on any circle
const MIN_SAMPLES: usize = 360;

/// Intensities sampled at evenly spaced angles on one circle
#[derive(Debug, Clone)]
pub struct CircleProfile {
    pub center: Point,
    pub radius: f64,
    pub values: Vec<f64>,
}

impl CircleProfile {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Angular step between samples (radians)
    pub fn step(&self) -> f64 {
        TAU / self.values.len() as f64
    }

    /// Angle of a (possibly fractional) sample position
    pub fn angle_at(&self, position: f64) -> f64 {
        (position * self.step()).rem_euclid(TAU)
    }

    /// Image-space point of a (possibly fractional) sample position
    pub fn point_at(&self, position: f64) -> Point {
        Point::from_polar(self.center, self.radius, self.angle_at(position))
    }

    /// `(angle, intensity)` pairs in sampling order
    pub fn samples(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let step = self.step();
        self.values
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i as f64 * step, v))
    }
}

/// Largest radius whose circle around `center` stays on the pixel grid.
/// Negative when `center` itself is off the image.
pub fn max_radius(image: &StarshotImage, center: Point) -> f64 {
    let right = (image.width() - 1) as f64 - center.x;
    let bottom = (image.height() - 1) as f64 - center.y;
    center.x.min(center.y).min(right).min(bottom)
}

/// Roughly one sample per pixel of arc
pub fn samples_for_radius(radius: f64) -> usize {
    ((TAU * radius).ceil() as usize).max(MIN_SAMPLES)
}

/// Sample the circle of `radius` around `center`.
///
/// The circle must lie entirely inside the image; it is rejected rather than
/// clipped so the caller can pick a smaller radius.
pub fn circle_profile(
    image: &StarshotImage,
    center: Point,
    radius: f64,
    samples: usize,
) -> Result<CircleProfile> {
    let limit = max_radius(image, center);
    if !(radius > 0.0) || radius > limit {
        return Err(StarshotError::Bounds {
            radius,
            max_radius: limit.max(0.0),
        });
    }
    let samples = samples.max(3);
    let step = TAU / samples as f64;

    let values = (0..samples)
        .map(|k| {
            let p = Point::from_polar(center, radius, k as f64 * step);
            image.bilinear_sample(p.x, p.y)
        })
        .collect();

    Ok(CircleProfile {
        center,
        radius,
        values,
    })
}

/// One profile per radius, each with the default sample density
pub fn circle_profiles(
    image: &StarshotImage,
    center: Point,
    radii: &[f64],
) -> Result<Vec<CircleProfile>> {
    radii
        .iter()
        .map(|&r| circle_profile(image, center, r, samples_for_radius(r)))
        .collect()
}
