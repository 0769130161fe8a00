pub mod analyze;
pub mod profile;

pub use analyze::analyze_film;
pub use profile::dump_profile;
