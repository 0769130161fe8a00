pub mod config;
pub mod error;
pub mod geometry;
pub mod image_source;
pub mod peak_detection;
pub mod radial_profile;
pub mod spoke_locator;
pub mod starshot;
pub mod wobble;

#[cfg(test)]
mod test_starshot;

// Re-export commonly used items
pub use config::StarshotConfig;
pub use error::{Result, StarshotError};
pub use geometry::{Line, Point};
pub use image_source::{ImageStatistics, StarshotImage};
pub use starshot::{MechPointOrigin, MechPointWarning, MechanicalPoint, Starshot, StarshotResults, StarshotState};
pub use wobble::{WobbleResult, WobbleSolver};
