use anyhow::Context;
use clap::{Parser, Subcommand};
use starshot::{Point, StarshotConfig};
use std::path::Path;

#[derive(Parser)]
#[command(name = "starshot")]
#[command(about = "Measure the mechanical isocenter wobble of a star-shot film", long_about = None)]
pub struct Cli {
    /// Log pipeline details (peak counts, line fits, solver progress)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Locate the spokes and compute the wobble circle
    Analyze {
        /// Image file (FITS, PNG, TIFF, ...)
        path: String,

        #[command(flatten)]
        options: AnalysisOptions,

        /// Mechanical point to center the spoke search on, as X,Y pixels
        #[arg(long, value_name = "X,Y")]
        mech_point: Option<Point>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Dump the intensity profile along one circle
    Profile {
        /// Image file (FITS, PNG, TIFF, ...)
        path: String,

        /// Physical size of one pixel (mm)
        #[arg(long)]
        pixel_size: f64,

        /// Circle radius (pixels)
        #[arg(long)]
        radius: f64,

        /// Circle center as X,Y pixels (default: image center)
        #[arg(long, value_name = "X,Y")]
        center: Option<Point>,

        /// Number of samples (default: about one per pixel of arc)
        #[arg(long)]
        samples: Option<usize>,

        /// Sample the negative of the image
        #[arg(long)]
        invert: bool,

        /// Output format (csv, json)
        #[arg(short, long, default_value = "csv")]
        format: String,
    },
}

#[derive(Parser, Debug, Clone)]
pub struct AnalysisOptions {
    /// Physical size of one pixel (mm)
    #[arg(long)]
    pub pixel_size: f64,

    /// JSON file with analysis settings; flags below override it
    #[arg(long)]
    pub config: Option<String>,

    /// Number of spokes (lines) on the film
    #[arg(long)]
    pub spokes: Option<usize>,

    /// Pass/fail threshold on the wobble radius (mm)
    #[arg(long)]
    pub tolerance: Option<f64>,

    /// Spokes are dark on a bright film (default: decided from the histogram)
    #[arg(long, conflicts_with = "no_invert")]
    pub invert: bool,

    /// Never invert, even when the histogram looks like a negative
    #[arg(long)]
    pub no_invert: bool,
}

impl AnalysisOptions {
    pub fn to_config(&self) -> anyhow::Result<StarshotConfig> {
        let mut config = match &self.config {
            Some(path) => StarshotConfig::from_json_file(Path::new(path))
                .with_context(|| format!("Failed to load config: {}", path))?,
            None => StarshotConfig::default(),
        };
        if let Some(spokes) = self.spokes {
            config.expected_spoke_count = spokes;
        }
        if let Some(tolerance) = self.tolerance {
            config.wobble_tolerance_mm = tolerance;
        }
        if self.invert {
            config.invert = Some(true);
        } else if self.no_invert {
            config.invert = Some(false);
        }
        config.validate()?;
        Ok(config)
    }
}
