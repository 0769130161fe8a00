// End-to-end checks on rendered star-shot films.
//
// Each film is a set of Gaussian spokes drawn tangent to a known circle,
// alternating sides so that circle is exactly the smallest one touching every
// spoke. Noise is seeded so every run sees the same pixels.

use crate::config::StarshotConfig;
use crate::geometry::{Line, Point};
use crate::image_source::StarshotImage;
use crate::starshot::{MechPointOrigin, Starshot, StarshotState};
use crate::wobble::max_distance;
use rand::prelude::*;
use std::f64::consts::PI;
use std::sync::Arc;

/// A rendered star-shot with a known wobble circle
#[derive(Debug, Clone)]
pub(crate) struct SyntheticStarshot {
    pub width: usize,
    pub height: usize,
    pub pixel_size_mm: f64,
    /// True wobble circle center (pixels)
    pub center: Point,
    /// True wobble circle radius (pixels)
    pub wobble_radius: f64,
    pub spokes: usize,
    /// Angle of the first spoke (radians)
    pub angle_offset: f64,
    /// Gaussian cross-section of one spoke (pixels)
    pub sigma: f64,
    pub amplitude: f64,
    pub background: f64,
    /// Peak-to-peak uniform noise
    pub noise: f64,
    pub seed: u64,
}

impl Default for SyntheticStarshot {
    fn default() -> Self {
        Self {
            width: 400,
            height: 400,
            pixel_size_mm: 0.1,
            center: Point::new(205.0, 193.0),
            wobble_radius: 2.0,
            spokes: 9,
            angle_offset: 0.15,
            sigma: 3.0,
            amplitude: 1000.0,
            background: 100.0,
            noise: 50.0,
            seed: 7,
        }
    }
}

impl SyntheticStarshot {
    pub fn config(&self) -> StarshotConfig {
        StarshotConfig {
            expected_spoke_count: self.spokes,
            ..Default::default()
        }
    }

    /// Spoke center lines, touching the wobble circle on alternating sides
    pub fn lines(&self) -> Vec<Line> {
        (0..self.spokes)
            .map(|k| {
                let angle = self.angle_offset + PI * k as f64 / self.spokes as f64;
                let side = if k % 2 == 0 { 1.0 } else { -1.0 };
                let touch = Point::new(
                    self.center.x - side * self.wobble_radius * angle.sin(),
                    self.center.y + side * self.wobble_radius * angle.cos(),
                );
                Line::from_angle(touch, angle)
            })
            .collect()
    }

    pub fn render(&self) -> StarshotImage {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let lines = self.lines();
        let two_sigma_sq = 2.0 * self.sigma * self.sigma;

        let data = (0..self.width * self.height)
            .map(|i| {
                let p = Point::new((i % self.width) as f64, (i / self.width) as f64);
                let signal: f64 = lines
                    .iter()
                    .map(|l| (-l.distance_to(&p).powi(2) / two_sigma_sq).exp())
                    .sum();
                let noise = (rng.gen::<f64>() - 0.5) * self.noise;
                (self.background + self.amplitude * signal + noise).max(0.0) as f32
            })
            .collect();

        StarshotImage::from_raw(self.width, self.height, data, self.pixel_size_mm).unwrap()
    }
}

fn analyzed(pattern: &SyntheticStarshot) -> Starshot {
    let mut starshot = Starshot::with_image(pattern.config(), Arc::new(pattern.render())).unwrap();
    starshot.analyze().unwrap();
    starshot
}

#[test]
fn test_rendered_lines_touch_the_circle() {
    let pattern = SyntheticStarshot::default();
    let lines = pattern.lines();
    assert_eq!(lines.len(), 9);
    for line in &lines {
        assert!((line.distance_to(&pattern.center) - pattern.wobble_radius).abs() < 1e-9);
    }
    assert!((max_distance(&lines, &pattern.center) - pattern.wobble_radius).abs() < 1e-9);
}

#[test]
fn test_recovers_wobble_circle() {
    let pattern = SyntheticStarshot::default();
    let starshot = analyzed(&pattern);

    assert_eq!(starshot.state(), StarshotState::Analyzed);
    assert_eq!(starshot.peak_locations().len(), 18);
    assert_eq!(starshot.lines().len(), 9);

    let center = starshot.wobble_center().unwrap();
    assert!(
        center.distance_to(&pattern.center) < 0.5,
        "wobble center {} too far from {}",
        center,
        pattern.center
    );
    let radius_px = starshot.wobble_radius_px().unwrap();
    assert!((radius_px - pattern.wobble_radius).abs() < 0.3, "radius {}", radius_px);

    let radius_mm = starshot.wobble_radius().unwrap();
    assert!((radius_mm - radius_px * pattern.pixel_size_mm).abs() < 1e-12);
    assert!((starshot.wobble_diameter_mm().unwrap() - 2.0 * radius_mm).abs() < 1e-12);
    assert_eq!(starshot.wobble_passed(), Some(true));
}

#[test]
fn test_every_spoke_is_found() {
    let pattern = SyntheticStarshot::default();
    let starshot = analyzed(&pattern);
    let analysis = starshot.analysis().unwrap();

    for truth in pattern.lines() {
        let matched = analysis.detection.spokes.iter().any(|s| {
            let d = (s.line.angle() - truth.angle()).abs();
            d.min(PI - d) < 0.01 && (s.line.offset().abs() - truth.offset().abs()).abs() < 0.5
        });
        assert!(matched, "no spoke near angle {:.3}", truth.angle());
    }
    for spoke in &analysis.detection.spokes {
        assert!(spoke.residual_px < 0.5);
    }
}

#[test]
fn test_auto_mech_point_near_pattern_center() {
    let pattern = SyntheticStarshot::default();
    let starshot = analyzed(&pattern);
    let state = starshot.mechanical_point_state();
    assert_eq!(state.origin(), Some(MechPointOrigin::Auto));
    assert!(state.point().unwrap().distance_to(&pattern.center) < 5.0);
}

#[test]
fn test_analysis_is_repeatable() {
    let pattern = SyntheticStarshot::default();
    let mut starshot = analyzed(&pattern);
    let first = starshot.results().unwrap();
    starshot.analyze().unwrap();
    let second = starshot.results().unwrap();

    assert_eq!(first.wobble_center, second.wobble_center);
    assert_eq!(first.wobble_radius_px, second.wobble_radius_px);
    assert_eq!(first.mechanical_point, second.mechanical_point);
}

#[test]
fn test_result_independent_of_mech_point_seed() {
    let pattern = SyntheticStarshot::default();
    let reference = analyzed(&pattern);

    let mut shifted = Starshot::with_image(pattern.config(), Arc::new(pattern.render())).unwrap();
    let seed = Point::new(pattern.center.x + 12.0, pattern.center.y - 10.0);
    assert!(shifted.set_mech_point(seed, true).unwrap().is_none());
    shifted.analyze().unwrap();

    let a = reference.wobble_center().unwrap();
    let b = shifted.wobble_center().unwrap();
    assert!(a.distance_to(&b) < 0.5, "{} vs {}", a, b);
    assert!((reference.wobble_radius_px().unwrap() - shifted.wobble_radius_px().unwrap()).abs() < 0.3);
    assert_eq!(reference.wobble_passed(), shifted.wobble_passed());
    assert_eq!(shifted.mechanical_point(), Some(seed));
}

#[test]
fn test_large_wobble_fails_tolerance() {
    let pattern = SyntheticStarshot {
        wobble_radius: 6.0,
        pixel_size_mm: 0.25,
        seed: 11,
        ..Default::default()
    };
    let starshot = analyzed(&pattern);

    let radius_px = starshot.wobble_radius_px().unwrap();
    assert!((radius_px - 6.0).abs() < 0.5, "radius {}", radius_px);
    assert!(starshot.wobble_radius().unwrap() > 1.0);
    assert_eq!(starshot.wobble_passed(), Some(false));
}

#[test]
fn test_tighter_tolerance_flips_verdict() {
    let pattern = SyntheticStarshot::default();
    let mut starshot = analyzed(&pattern);
    assert_eq!(starshot.wobble_passed(), Some(true));

    starshot
        .set_config(StarshotConfig {
            wobble_tolerance_mm: 0.05,
            ..pattern.config()
        })
        .unwrap();
    assert!(starshot.wobble_passed().is_none());
    starshot.analyze().unwrap();
    assert_eq!(starshot.wobble_passed(), Some(false));
}

#[test]
fn test_inverted_film() {
    let pattern = SyntheticStarshot::default();
    let negative = pattern.render().inverted();
    let config = StarshotConfig {
        invert: Some(true),
        ..pattern.config()
    };
    let mut starshot = Starshot::with_image(config, Arc::new(negative)).unwrap();
    starshot.analyze().unwrap();

    let center = starshot.wobble_center().unwrap();
    assert!(center.distance_to(&pattern.center) < 0.5, "{}", center);
    assert_eq!(starshot.peak_locations().len(), 18);
}

#[test]
fn test_four_spoke_pattern() {
    let pattern = SyntheticStarshot {
        spokes: 4,
        angle_offset: 0.3,
        seed: 3,
        ..Default::default()
    };
    let starshot = analyzed(&pattern);
    assert_eq!(starshot.peak_locations().len(), 8);
    assert!(starshot.wobble_center().unwrap().distance_to(&pattern.center) < 0.5);
    assert!((starshot.wobble_radius_px().unwrap() - pattern.wobble_radius).abs() < 0.3);
}

#[test]
fn test_results_serialize() {
    let pattern = SyntheticStarshot::default();
    let starshot = analyzed(&pattern);
    let results = starshot.results().unwrap();
    assert_eq!(results.spoke_count, 9);
    assert_eq!(results.peak_locations.len(), 18);
    assert_eq!(results.spoke_angles_deg.len(), 9);

    let json = serde_json::to_value(&results).unwrap();
    assert_eq!(json["passed"], serde_json::json!(true));
    assert_eq!(json["mechanical_point_origin"], serde_json::json!("auto"));
    assert_eq!(json["inverted"], serde_json::json!(false));
    assert!(json["image_statistics"]["median"].is_number());
    assert!(json["wobble_radius_mm"].as_f64().unwrap() > 0.0);
    assert!(json["wobble_center"]["x"].is_number());
}

#[test]
fn test_image_shared_across_threads() {
    let pattern = SyntheticStarshot::default();
    let image = Arc::new(pattern.render());

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let image = image.clone();
            let config = pattern.config();
            std::thread::spawn(move || {
                let mut starshot = Starshot::with_image(config, image).unwrap();
                starshot.analyze().unwrap();
                starshot.wobble_center().unwrap()
            })
        })
        .collect();
    let centers: Vec<Point> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert_eq!(centers[0], centers[1]);
}

// Real films. Set STARSHOT_DEMO1 / STARSHOT_DEMO2 to the image path and
// STARSHOT_DEMO1_PIXEL_MM / STARSHOT_DEMO2_PIXEL_MM to its pixel size.
fn reference_film(n: u32) -> Option<StarshotImage> {
    let path = std::env::var(format!("STARSHOT_DEMO{}", n)).ok()?;
    let pixel_size_mm = std::env::var(format!("STARSHOT_DEMO{}_PIXEL_MM", n))
        .ok()?
        .parse::<f64>()
        .ok()?;
    Some(StarshotImage::from_file(std::path::Path::new(&path), pixel_size_mm).unwrap())
}

#[test]
fn test_reference_pattern_1() {
    let Some(image) = reference_film(1) else {
        println!("STARSHOT_DEMO1 not set, skipping");
        return;
    };
    let mut starshot = Starshot::with_image(StarshotConfig::default(), Arc::new(image)).unwrap();
    starshot.analyze().unwrap();

    assert!((starshot.wobble_radius().unwrap() - 0.49).abs() < 0.1);
    assert!(starshot.wobble_center().unwrap().distance_to(&Point::new(1300.0, 1510.0)) < 10.0);
    assert_eq!(starshot.wobble_passed(), Some(true));
    assert_eq!(starshot.peak_locations().len(), 18);
}

#[test]
fn test_reference_pattern_2() {
    let Some(image) = reference_film(2) else {
        println!("STARSHOT_DEMO2 not set, skipping");
        return;
    };
    let image = Arc::new(image);
    let expected = Point::new(1296.0, 1698.0);

    let mut starshot = Starshot::with_image(StarshotConfig::default(), image.clone()).unwrap();
    starshot.analyze().unwrap();
    assert!((starshot.wobble_radius().unwrap() - 0.17).abs() < 0.1);
    assert!(starshot.wobble_center().unwrap().distance_to(&expected) < 10.0);
    assert_eq!(starshot.wobble_passed(), Some(true));
    assert_eq!(starshot.peak_locations().len(), 18);

    let mut overridden = Starshot::with_image(StarshotConfig::default(), image).unwrap();
    overridden.set_mech_point(Point::new(1200.0, 1600.0), true).unwrap();
    overridden.analyze().unwrap();
    assert!((overridden.wobble_radius().unwrap() - 0.17).abs() < 0.1);
    assert!(overridden.wobble_center().unwrap().distance_to(&expected) < 10.0);
    assert_eq!(overridden.wobble_passed(), Some(true));
}
