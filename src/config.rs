use crate::error::{Result, StarshotError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Analysis parameters shared by the spoke locator, wobble solver and analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarshotConfig {
    /// Number of physical spokes (lines) in the pattern
    pub expected_spoke_count: usize,
    /// Innermost sampling radius as a fraction of the largest circle that fits
    pub inner_radius_fraction: f64,
    /// Outermost sampling radius as a fraction of the largest circle that fits
    pub outer_radius_fraction: f64,
    /// Number of sampling circles between the inner and outer radius
    pub radius_count: usize,
    /// Minimum peak prominence as a fraction of the profile range (0-1)
    pub peak_prominence_threshold: f64,
    /// Minimum angular distance between two peaks on one circle (radians)
    pub min_peak_separation: f64,
    /// Median window applied to each circle profile (samples, 0 or 1 disables)
    pub profile_smoothing: usize,
    /// Largest angular drift of one spoke end between adjacent radii (radians)
    pub angular_cluster_tolerance: f64,
    /// Largest RMS perpendicular residual accepted for a fitted spoke (pixels)
    pub max_line_residual_px: f64,
    /// Pass/fail threshold on the wobble radius (mm)
    pub wobble_tolerance_mm: f64,
    pub max_solver_iterations: usize,
    /// Convergence threshold of the wobble search (pixels)
    pub solver_tolerance: f64,
    /// Distance beyond which an overridden mechanical point is reported (mm)
    pub mech_point_warn_distance_mm: f64,
    /// Pixels above this intensity quantile seed the automatic mechanical point
    pub auto_center_percentile: f64,
    /// Treat dark spokes on a bright film as the signal. `None` decides from
    /// the image histogram; `Some` forces the choice.
    pub invert: Option<bool>,
}

impl Default for StarshotConfig {
    fn default() -> Self {
        Self {
            expected_spoke_count: 9,
            inner_radius_fraction: 0.3,
            outer_radius_fraction: 0.8,
            radius_count: 10,
            peak_prominence_threshold: 0.2,
            min_peak_separation: 0.05,
            profile_smoothing: 5,
            angular_cluster_tolerance: 0.15,
            max_line_residual_px: 5.0,
            wobble_tolerance_mm: 1.0,
            max_solver_iterations: 2000,
            solver_tolerance: 1e-9,
            mech_point_warn_distance_mm: 5.0,
            auto_center_percentile: 0.995,
            invert: None,
        }
    }
}

impl StarshotConfig {
    /// Load a configuration from a JSON file; missing keys take their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: StarshotConfig = serde_json::from_str(&text).map_err(|e| {
            StarshotError::Configuration(format!("{}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.expected_spoke_count < 2 {
            return Err(invalid(format!(
                "expected_spoke_count must be at least 2, got {}",
                self.expected_spoke_count
            )));
        }
        if !(self.inner_radius_fraction > 0.0
            && self.inner_radius_fraction < self.outer_radius_fraction
            && self.outer_radius_fraction <= 1.0)
        {
            return Err(invalid(format!(
                "radius fractions must satisfy 0 < inner < outer <= 1, got inner={} outer={}",
                self.inner_radius_fraction, self.outer_radius_fraction
            )));
        }
        if self.radius_count == 0 {
            return Err(invalid("radius_count must be at least 1".to_string()));
        }
        if !(self.peak_prominence_threshold > 0.0 && self.peak_prominence_threshold < 1.0) {
            return Err(invalid(format!(
                "peak_prominence_threshold must be in (0, 1), got {}",
                self.peak_prominence_threshold
            )));
        }
        if !(self.min_peak_separation > 0.0) {
            return Err(invalid(format!(
                "min_peak_separation must be positive, got {}",
                self.min_peak_separation
            )));
        }
        if self.profile_smoothing > 1 && self.profile_smoothing % 2 == 0 {
            return Err(invalid(format!(
                "profile_smoothing must be an odd window, got {}",
                self.profile_smoothing
            )));
        }
        if !(self.angular_cluster_tolerance > 0.0) {
            return Err(invalid(format!(
                "angular_cluster_tolerance must be positive, got {}",
                self.angular_cluster_tolerance
            )));
        }
        if !(self.max_line_residual_px > 0.0) {
            return Err(invalid(format!(
                "max_line_residual_px must be positive, got {}",
                self.max_line_residual_px
            )));
        }
        if !(self.wobble_tolerance_mm >= 0.0) {
            return Err(invalid(format!(
                "wobble_tolerance_mm must not be negative, got {}",
                self.wobble_tolerance_mm
            )));
        }
        if self.max_solver_iterations == 0 {
            return Err(invalid("max_solver_iterations must be at least 1".to_string()));
        }
        if !(self.solver_tolerance > 0.0) {
            return Err(invalid(format!(
                "solver_tolerance must be positive, got {}",
                self.solver_tolerance
            )));
        }
        if !(self.mech_point_warn_distance_mm >= 0.0) {
            return Err(invalid(format!(
                "mech_point_warn_distance_mm must not be negative, got {}",
                self.mech_point_warn_distance_mm
            )));
        }
        if !(self.auto_center_percentile > 0.0 && self.auto_center_percentile < 1.0) {
            return Err(invalid(format!(
                "auto_center_percentile must be in (0, 1), got {}",
                self.auto_center_percentile
            )));
        }
        Ok(())
    }
}

fn invalid(message: String) -> StarshotError {
    StarshotError::Configuration(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StarshotConfig::default().validate().is_ok());
    }

    #[test]
    fn test_negative_tolerance_rejected() {
        let config = StarshotConfig {
            wobble_tolerance_mm: -0.5,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(StarshotError::Configuration(_))
        ));
    }

    #[test]
    fn test_radius_fractions_rejected() {
        let config = StarshotConfig {
            inner_radius_fraction: 0.8,
            outer_radius_fraction: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = StarshotConfig {
            outer_radius_fraction: 1.2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_single_spoke_rejected() {
        let config = StarshotConfig {
            expected_spoke_count: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_even_smoothing_window_rejected() {
        let config = StarshotConfig {
            profile_smoothing: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_json_takes_defaults() {
        let config: StarshotConfig =
            serde_json::from_str(r#"{"expected_spoke_count": 6, "wobble_tolerance_mm": 0.5}"#)
                .unwrap();
        assert_eq!(config.expected_spoke_count, 6);
        assert_eq!(config.wobble_tolerance_mm, 0.5);
        assert_eq!(config.radius_count, StarshotConfig::default().radius_count);
    }

    #[test]
    fn test_invert_defaults_to_automatic() {
        assert_eq!(StarshotConfig::default().invert, None);
        let config: StarshotConfig = serde_json::from_str(r#"{"invert": true}"#).unwrap();
        assert_eq!(config.invert, Some(true));
        let config: StarshotConfig = serde_json::from_str(r#"{"invert": null}"#).unwrap();
        assert_eq!(config.invert, None);
    }
}
