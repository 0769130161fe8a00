/// Spoke location: multi-radius peak search, angular clustering and line fits
use crate::config::StarshotConfig;
use crate::error::{Result, StarshotError};
use crate::geometry::{angular_distance, fit_line, Line, Point};
use crate::image_source::StarshotImage;
use crate::peak_detection::{find_cyclic_peaks, PeakParams};
use crate::radial_profile::{circle_profile, circle_profiles, max_radius, samples_for_radius, CircleProfile};
use serde::Serialize;
use tracing::debug;

/// Where a spoke crossed one sampling circle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeakLocation {
    pub point: Point,
    /// Sampling radius (pixels)
    pub radius: f64,
    /// Angle around the mechanical point (radians, 0..2pi)
    pub angle: f64,
}

/// One physical radiation line
#[derive(Debug, Clone, Serialize)]
pub struct Spoke {
    pub line: Line,
    /// RMS perpendicular distance of the supporting points from the line
    pub residual_px: f64,
    /// Spoke crossings at every sampling radius, both ends
    pub points: Vec<Point>,
}

/// Everything the spoke search found around one mechanical point
#[derive(Debug, Clone, Serialize)]
pub struct SpokeDetection {
    pub center: Point,
    pub radii: Vec<f64>,
    /// One location per spoke end, taken on the middle sampling circle
    pub peak_locations: Vec<PeakLocation>,
    pub spokes: Vec<Spoke>,
}

impl SpokeDetection {
    pub fn lines(&self) -> Vec<Line> {
        self.spokes.iter().map(|s| s.line).collect()
    }
}

/// Bisection steps when searching for the innermost circle that separates
/// every spoke end
const RESOLVE_STEPS: usize = 8;
/// Extra distance past that circle, as a fraction of the remaining annulus
const RESOLVE_MARGIN: f64 = 0.15;

fn spread(inner: f64, outer: f64, count: usize) -> Vec<f64> {
    if count <= 1 {
        return vec![(inner + outer) / 2.0];
    }
    let step = (outer - inner) / (count - 1) as f64;
    (0..count).map(|i| inner + step * i as f64).collect()
}

/// Sampling radii spread over the configured annulus around `center`
pub fn sampling_radii(image: &StarshotImage, center: Point, config: &StarshotConfig) -> Result<Vec<f64>> {
    let limit = max_radius(image, center);
    if !(limit > 0.0) {
        return Err(StarshotError::Bounds {
            radius: config.inner_radius_fraction * image.width().min(image.height()) as f64 / 2.0,
            max_radius: limit.max(0.0),
        });
    }
    Ok(spread(
        config.inner_radius_fraction * limit,
        config.outer_radius_fraction * limit,
        config.radius_count,
    ))
}

/// Sampling radii that separate every spoke end.
///
/// Near the mechanical point neighbouring spokes cross, and with a large
/// wobble the crossings reach the inner circles of the annulus, where two
/// ends blur into one peak. When the innermost circle shows the wrong count
/// but the outermost one is clean, the inner edge is moved out to the first
/// radius that resolves all ends (plus a margin) and the radii are spread
/// again. Any other mismatch is left for the count check.
pub fn usable_radii(image: &StarshotImage, center: Point, config: &StarshotConfig) -> Result<Vec<f64>> {
    let radii = sampling_radii(image, center, config)?;
    let (inner, outer) = match (radii.first(), radii.last()) {
        (Some(&inner), Some(&outer)) if outer > inner => (inner, outer),
        _ => return Ok(radii),
    };

    let expected = 2 * config.expected_spoke_count;
    let resolves = |r: f64| -> Result<bool> { Ok(ends_on_circle(image, center, r, config)?.len() == expected) };
    if resolves(inner)? || !resolves(outer)? {
        return Ok(radii);
    }

    let (mut lo, mut hi) = (inner, outer);
    for _ in 0..RESOLVE_STEPS {
        let mid = (lo + hi) / 2.0;
        if resolves(mid)? {
            hi = mid;
        } else {
            lo = mid;
        }
    }
    let start = hi + RESOLVE_MARGIN * (outer - hi);
    debug!(
        "spoke ends merge inside {:.1} px, sampling from {:.1} px instead of {:.1} px",
        hi, start, inner
    );
    Ok(spread(start, outer, config.radius_count))
}

fn peak_params(profile: &CircleProfile, config: &StarshotConfig) -> PeakParams {
    PeakParams {
        prominence_threshold: config.peak_prominence_threshold,
        min_separation: (config.min_peak_separation / profile.step()).ceil() as usize,
        smoothing: config.profile_smoothing,
    }
}

/// Every peak of one profile as a spoke end, ordered by angle
fn ends_on_profile(profile: &CircleProfile, config: &StarshotConfig) -> Vec<PeakLocation> {
    let peaks = find_cyclic_peaks(&profile.values, &peak_params(profile, config));
    let mut locations: Vec<PeakLocation> = peaks
        .iter()
        .map(|p| PeakLocation {
            point: profile.point_at(p.position),
            radius: profile.radius,
            angle: profile.angle_at(p.position),
        })
        .collect();
    locations.sort_by(|a, b| a.angle.total_cmp(&b.angle));
    locations
}

fn ends_on_circle(
    image: &StarshotImage,
    center: Point,
    radius: f64,
    config: &StarshotConfig,
) -> Result<Vec<PeakLocation>> {
    let profile = circle_profile(image, center, radius, samples_for_radius(radius))?;
    Ok(ends_on_profile(&profile, config))
}

/// Spoke ends on one circle; the count must be exactly two per spoke
fn peaks_on_circle(profile: &CircleProfile, config: &StarshotConfig) -> Result<Vec<PeakLocation>> {
    let locations = ends_on_profile(profile, config);

    let expected = 2 * config.expected_spoke_count;
    debug!(
        "radius {:.1} px: {} peaks over {} samples (expected {})",
        profile.radius,
        locations.len(),
        profile.len(),
        expected
    );
    if locations.len() != expected {
        let reason = if locations.len() < expected {
            "insufficient contrast or occluded spoke"
        } else {
            "ambiguous detection"
        };
        return Err(StarshotError::Detection(format!(
            "unexpected peak count: found {} peaks at radius {:.1} px, expected {} ({})",
            locations.len(),
            profile.radius,
            expected,
            reason
        )));
    }
    Ok(locations)
}

/// Cyclic shift of `current` that best lines up with `previous`, and the
/// largest angular mismatch under that shift
fn best_alignment(previous: &[f64], current: &[PeakLocation]) -> (usize, f64) {
    let m = current.len();
    (0..m)
        .map(|shift| {
            let diffs = previous
                .iter()
                .enumerate()
                .map(|(i, &a)| angular_distance(a, current[(i + shift) % m].angle));
            let (total, worst) = diffs.fold((0.0, 0.0f64), |(t, w), d| (t + d, w.max(d)));
            (shift, total, worst)
        })
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(shift, _, worst)| (shift, worst))
        .unwrap_or((0, 0.0))
}

/// Group spoke ends across radii by angular proximity
fn cluster_ends(rings: Vec<Vec<PeakLocation>>, config: &StarshotConfig) -> Result<Vec<Vec<PeakLocation>>> {
    let mut rings = rings.into_iter();
    let mut tracks: Vec<Vec<PeakLocation>> = match rings.next() {
        Some(first) => first.into_iter().map(|p| vec![p]).collect(),
        None => return Ok(Vec::new()),
    };

    for ring in rings {
        let previous: Vec<f64> = tracks
            .iter()
            .filter_map(|t| t.last().map(|p| p.angle))
            .collect();
        let (shift, worst) = best_alignment(&previous, &ring);
        if worst > config.angular_cluster_tolerance {
            return Err(StarshotError::Detection(format!(
                "spoke ends drift {:.3} rad between radii at {:.1} px (tolerance {:.3} rad)",
                worst,
                ring.first().map(|p| p.radius).unwrap_or(0.0),
                config.angular_cluster_tolerance
            )));
        }
        let m = ring.len();
        for (i, track) in tracks.iter_mut().enumerate() {
            track.push(ring[(i + shift) % m]);
        }
    }
    Ok(tracks)
}

/// Locate every spoke of the pattern around `center`.
///
/// Each sampling circle must cross every spoke twice. Ends are matched across
/// circles, then end `k` and end `k + N` (in angular order) form one spoke:
/// chords that pairwise intersect inside a circle interleave their endpoints.
pub fn locate_spokes(image: &StarshotImage, center: Point, config: &StarshotConfig) -> Result<SpokeDetection> {
    let radii = usable_radii(image, center, config)?;
    let rings = circle_profiles(image, center, &radii)?
        .iter()
        .map(|profile| peaks_on_circle(profile, config))
        .collect::<Result<Vec<_>>>()?;

    let tracks = cluster_ends(rings, config)?;
    let spoke_count = config.expected_spoke_count;
    if tracks.len() != 2 * spoke_count {
        return Err(StarshotError::Detection(format!(
            "unexpected peak count: {} spoke ends clustered, expected {}",
            tracks.len(),
            2 * spoke_count
        )));
    }

    let mut spokes = Vec::with_capacity(spoke_count);
    for k in 0..spoke_count {
        let points: Vec<Point> = tracks[k]
            .iter()
            .chain(tracks[k + spoke_count].iter())
            .map(|p| p.point)
            .collect();
        let (line, residual_px) = fit_line(&points).ok_or_else(|| {
            StarshotError::Detection(format!("spoke {} has no usable direction", k))
        })?;
        if residual_px > config.max_line_residual_px {
            return Err(StarshotError::Detection(format!(
                "spoke {} is not straight: RMS residual {:.2} px exceeds {:.2} px",
                k, residual_px, config.max_line_residual_px
            )));
        }
        debug!(
            "spoke {}: angle {:.2} deg, residual {:.3} px",
            k,
            line.angle().to_degrees(),
            residual_px
        );
        spokes.push(Spoke {
            line,
            residual_px,
            points,
        });
    }

    let middle = radii.len() / 2;
    let peak_locations = tracks.iter().map(|t| t[middle]).collect();

    Ok(SpokeDetection {
        center,
        radii,
        peak_locations,
        spokes,
    })
}
