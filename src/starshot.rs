/// Star-shot analyzer
///
/// Holds one loaded image and the mechanical point, runs the spoke search and
/// the wobble solver, and exposes the outcome. The analyzer moves through
/// three states: nothing loaded, image loaded, and analyzed. A failed
/// analysis leaves it loaded so it can be retried with other settings.
use crate::config::StarshotConfig;
use crate::error::{Result, StarshotError};
use crate::geometry::{Line, Point};
use crate::image_source::{ImageStatistics, StarshotImage};
use crate::spoke_locator::{locate_spokes, PeakLocation, SpokeDetection};
use crate::wobble::{WobbleResult, WobbleSolver};
use serde::Serialize;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Who chose the mechanical point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MechPointOrigin {
    /// Estimated from the brightest region of the film
    Auto,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum MechanicalPoint {
    Unset,
    Set { point: Point, origin: MechPointOrigin },
}

impl MechanicalPoint {
    pub fn point(&self) -> Option<Point> {
        match self {
            MechanicalPoint::Unset => None,
            MechanicalPoint::Set { point, .. } => Some(*point),
        }
    }

    pub fn origin(&self) -> Option<MechPointOrigin> {
        match self {
            MechanicalPoint::Unset => None,
            MechanicalPoint::Set { origin, .. } => Some(*origin),
        }
    }
}

/// A user supplied mechanical point far from where the pattern appears to be
#[derive(Debug, Clone, Serialize)]
pub struct MechPointWarning {
    pub requested: Point,
    /// Previous point, or the automatic estimate when none was set
    pub reference: Point,
    pub distance_mm: f64,
    pub threshold_mm: f64,
}

impl std::fmt::Display for MechPointWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "mechanical point {} is {:.2} mm from {} (warning threshold {:.2} mm)",
            self.requested, self.distance_mm, self.reference, self.threshold_mm
        )
    }
}

/// Outcome of one successful analysis
#[derive(Debug, Clone, Serialize)]
pub struct StarshotAnalysis {
    /// Point the spoke search was centered on
    pub mechanical_point: Point,
    pub detection: SpokeDetection,
    pub wobble: WobbleResult,
    pub pixel_size_mm: f64,
    pub tolerance_mm: f64,
    /// Spokes were searched on the negative of the film
    pub inverted: bool,
    /// `inverted` came from the configuration rather than the histogram
    pub inversion_overridden: bool,
    /// Intensities of the loaded film, before any inversion
    pub image_statistics: ImageStatistics,
}

impl StarshotAnalysis {
    pub fn radius_mm(&self) -> f64 {
        self.wobble.radius * self.pixel_size_mm
    }

    pub fn diameter_mm(&self) -> f64 {
        2.0 * self.radius_mm()
    }

    pub fn passed(&self) -> bool {
        self.radius_mm() <= self.tolerance_mm
    }
}

#[derive(Debug, Clone)]
enum AnalyzerState {
    Unloaded,
    Loaded {
        image: Arc<StarshotImage>,
    },
    Analyzed {
        image: Arc<StarshotImage>,
        analysis: Box<StarshotAnalysis>,
    },
}

/// Lifecycle stage of a [`Starshot`], without the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StarshotState {
    Unloaded,
    Loaded,
    Analyzed,
}

/// Flat summary suitable for reports and JSON output
#[derive(Debug, Clone, Serialize)]
pub struct StarshotResults {
    pub passed: bool,
    pub tolerance_mm: f64,
    pub wobble_radius_mm: f64,
    pub wobble_diameter_mm: f64,
    pub wobble_radius_px: f64,
    /// Wobble circle center (pixels, x = column, y = row)
    pub wobble_center: Point,
    pub wobble_center_mm: Point,
    pub mechanical_point: Point,
    pub mechanical_point_origin: Option<MechPointOrigin>,
    /// Distance between the mechanical point and the wobble center (mm)
    pub center_offset_mm: f64,
    pub pixel_size_mm: f64,
    pub spoke_count: usize,
    pub spoke_angles_deg: Vec<f64>,
    pub max_line_residual_px: f64,
    pub sampling_radii_px: Vec<f64>,
    pub peak_locations: Vec<PeakLocation>,
    pub supporting_lines: Vec<usize>,
    pub solver_iterations: usize,
    pub inverted: bool,
    pub inversion_overridden: bool,
    pub image_statistics: ImageStatistics,
}

/// Star-shot analyzer
#[derive(Debug, Clone)]
pub struct Starshot {
    config: StarshotConfig,
    state: AnalyzerState,
    mech_point: MechanicalPoint,
}

impl Default for Starshot {
    fn default() -> Self {
        Self {
            config: StarshotConfig::default(),
            state: AnalyzerState::Unloaded,
            mech_point: MechanicalPoint::Unset,
        }
    }
}

impl Starshot {
    pub fn new(config: StarshotConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Default::default()
        })
    }

    /// Analyzer with `image` already loaded
    pub fn with_image(config: StarshotConfig, image: Arc<StarshotImage>) -> Result<Self> {
        let mut starshot = Self::new(config)?;
        starshot.load_image(image);
        Ok(starshot)
    }

    pub fn config(&self) -> &StarshotConfig {
        &self.config
    }

    /// Replace the settings; any previous analysis is dropped
    pub fn set_config(&mut self, config: StarshotConfig) -> Result<()> {
        config.validate()?;
        self.config = config;
        self.invalidate();
        Ok(())
    }

    /// Load a new image, discarding the previous one, its analysis and the
    /// mechanical point
    pub fn load_image(&mut self, image: Arc<StarshotImage>) {
        info!(
            "Loaded {}x{} image ({} mm/px)",
            image.width(),
            image.height(),
            image.pixel_size_mm()
        );
        self.state = AnalyzerState::Loaded { image };
        self.mech_point = MechanicalPoint::Unset;
    }

    pub fn image(&self) -> Option<&Arc<StarshotImage>> {
        match &self.state {
            AnalyzerState::Unloaded => None,
            AnalyzerState::Loaded { image } | AnalyzerState::Analyzed { image, .. } => Some(image),
        }
    }

    pub fn state(&self) -> StarshotState {
        match self.state {
            AnalyzerState::Unloaded => StarshotState::Unloaded,
            AnalyzerState::Loaded { .. } => StarshotState::Loaded,
            AnalyzerState::Analyzed { .. } => StarshotState::Analyzed,
        }
    }

    /// Override the mechanical point.
    ///
    /// With `warn_if_far_away`, a point further than the configured distance
    /// from the current point (or from the automatic estimate when none is
    /// set yet) is still accepted but reported.
    pub fn set_mech_point(&mut self, point: Point, warn_if_far_away: bool) -> Result<Option<MechPointWarning>> {
        let image = self.image().cloned().ok_or(StarshotError::NotLoaded)?;
        if !(point.x.is_finite() && point.y.is_finite()) {
            return Err(StarshotError::Configuration(format!(
                "mechanical point {} is not finite",
                point
            )));
        }

        let mut warning = None;
        if warn_if_far_away {
            let reference = match self.mech_point {
                MechanicalPoint::Set { point, .. } => point,
                MechanicalPoint::Unset => {
                    let (working, _) = self.working_image(&image);
                    self.estimate_mech_point(&working)
                }
            };
            let distance_mm = reference.distance_to(&point) * image.pixel_size_mm();
            if distance_mm > self.config.mech_point_warn_distance_mm {
                let w = MechPointWarning {
                    requested: point,
                    reference,
                    distance_mm,
                    threshold_mm: self.config.mech_point_warn_distance_mm,
                };
                warn!("{}", w);
                warning = Some(w);
            }
        }

        self.mech_point = MechanicalPoint::Set {
            point,
            origin: MechPointOrigin::User,
        };
        self.invalidate();
        Ok(warning)
    }

    pub fn mechanical_point(&self) -> Option<Point> {
        self.mech_point.point()
    }

    pub fn mechanical_point_state(&self) -> MechanicalPoint {
        self.mech_point
    }

    /// Locate the spokes and compute the wobble circle.
    ///
    /// An unset mechanical point is estimated first and kept, even if the
    /// analysis then fails.
    pub fn analyze(&mut self) -> Result<()> {
        let image = self.image().cloned().ok_or(StarshotError::NotLoaded)?;
        self.state = AnalyzerState::Loaded {
            image: image.clone(),
        };

        let (working, inverted) = self.working_image(&image);

        let mech_point = match self.mech_point {
            MechanicalPoint::Set { point, .. } => point,
            MechanicalPoint::Unset => {
                let point = self.estimate_mech_point(&working);
                info!("Estimated mechanical point at {}", point);
                self.mech_point = MechanicalPoint::Set {
                    point,
                    origin: MechPointOrigin::Auto,
                };
                point
            }
        };

        let detection = locate_spokes(&working, mech_point, &self.config)?;
        let wobble = WobbleSolver::from_config(&self.config).solve(&detection.lines())?;

        let analysis = StarshotAnalysis {
            mechanical_point: mech_point,
            detection,
            wobble,
            pixel_size_mm: image.pixel_size_mm(),
            tolerance_mm: self.config.wobble_tolerance_mm,
            inverted,
            inversion_overridden: self.config.invert.is_some(),
            image_statistics: image.statistics(),
        };
        info!(
            "Wobble circle at {}: diameter {:.3} mm (tolerance {:.3} mm radius) - {}",
            analysis.wobble.center,
            analysis.diameter_mm(),
            analysis.tolerance_mm,
            if analysis.passed() { "PASS" } else { "FAIL" }
        );

        self.state = AnalyzerState::Analyzed {
            image,
            analysis: Box::new(analysis),
        };
        Ok(())
    }

    pub fn analysis(&self) -> Option<&StarshotAnalysis> {
        match &self.state {
            AnalyzerState::Analyzed { analysis, .. } => Some(analysis.as_ref()),
            _ => None,
        }
    }

    /// Wobble circle center (pixels)
    pub fn wobble_center(&self) -> Option<Point> {
        self.analysis().map(|a| a.wobble.center)
    }

    /// Wobble circle radius (mm)
    pub fn wobble_radius(&self) -> Option<f64> {
        self.analysis().map(StarshotAnalysis::radius_mm)
    }

    pub fn wobble_radius_px(&self) -> Option<f64> {
        self.analysis().map(|a| a.wobble.radius)
    }

    pub fn wobble_diameter_mm(&self) -> Option<f64> {
        self.analysis().map(StarshotAnalysis::diameter_mm)
    }

    pub fn wobble_passed(&self) -> Option<bool> {
        self.analysis().map(StarshotAnalysis::passed)
    }

    /// Spoke ends on the middle sampling circle; empty before analysis
    pub fn peak_locations(&self) -> &[PeakLocation] {
        self.analysis()
            .map(|a| a.detection.peak_locations.as_slice())
            .unwrap_or(&[])
    }

    pub fn lines(&self) -> Vec<Line> {
        self.analysis()
            .map(|a| a.detection.lines())
            .unwrap_or_default()
    }

    pub fn results(&self) -> Option<StarshotResults> {
        let a = self.analysis()?;
        let px = a.pixel_size_mm;
        Some(StarshotResults {
            passed: a.passed(),
            tolerance_mm: a.tolerance_mm,
            wobble_radius_mm: a.radius_mm(),
            wobble_diameter_mm: a.diameter_mm(),
            wobble_radius_px: a.wobble.radius,
            wobble_center: a.wobble.center,
            wobble_center_mm: a.wobble.center.to_mm(px),
            mechanical_point: a.mechanical_point,
            mechanical_point_origin: self.mech_point.origin(),
            center_offset_mm: a.mechanical_point.distance_to(&a.wobble.center) * px,
            pixel_size_mm: px,
            spoke_count: a.detection.spokes.len(),
            spoke_angles_deg: a
                .detection
                .spokes
                .iter()
                .map(|s| s.line.angle().to_degrees())
                .collect(),
            max_line_residual_px: a
                .detection
                .spokes
                .iter()
                .map(|s| s.residual_px)
                .fold(0.0, f64::max),
            sampling_radii_px: a.detection.radii.clone(),
            peak_locations: a.detection.peak_locations.clone(),
            supporting_lines: a.wobble.supporting_lines.clone(),
            solver_iterations: a.wobble.iterations,
            inverted: a.inverted,
            inversion_overridden: a.inversion_overridden,
            image_statistics: a.image_statistics.clone(),
        })
    }

    /// The image the spokes are searched on, and whether it is the negative
    /// of the loaded one. The configuration decides when it says so,
    /// otherwise the histogram does.
    fn working_image<'a>(&self, image: &'a StarshotImage) -> (Cow<'a, StarshotImage>, bool) {
        let invert = match self.config.invert {
            Some(invert) => invert,
            None => {
                let invert = image.needs_inversion();
                if invert {
                    info!("Film histogram looks like a negative, analyzing the inverted image");
                }
                invert
            }
        };
        if invert {
            (Cow::Owned(image.inverted()), true)
        } else {
            (Cow::Borrowed(image), false)
        }
    }

    /// Intensity weighted centroid of the brightest pixels, where the spokes
    /// overlap; the grid center when nothing stands out
    fn estimate_mech_point(&self, image: &StarshotImage) -> Point {
        let threshold = image.percentile(self.config.auto_center_percentile);
        match image.bright_centroid(threshold) {
            Some(point) => point,
            None => {
                debug!("No bright region above {:.1}, using the image center", threshold);
                image.geometric_center()
            }
        }
    }

    fn invalidate(&mut self) {
        if let AnalyzerState::Analyzed { image, .. } = &self.state {
            let image = image.clone();
            self.state = AnalyzerState::Loaded { image };
        }
    }
}
