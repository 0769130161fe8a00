use thiserror::Error;

/// Errors raised by the star-shot pipeline.
///
/// Nothing in the core retries or recovers from these; they surface from
/// `Starshot::analyze` as-is.
#[derive(Debug, Error)]
pub enum StarshotError {
    /// Spoke or peak evidence does not match the configured pattern.
    #[error("Detection failed: {0}")]
    Detection(String),

    /// The line set cannot bound a wobble circle.
    #[error("Degenerate geometry: {0}")]
    Geometry(String),

    /// A sampling circle does not fit inside the image.
    #[error("Sampling radius {radius:.1} px exceeds image bounds (max {max_radius:.1} px)")]
    Bounds { radius: f64, max_radius: f64 },

    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No image loaded")]
    NotLoaded,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Decode(#[from] image::ImageError),
}

pub type Result<T> = std::result::Result<T, StarshotError>;
