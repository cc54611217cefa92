pub mod dataset;
pub mod errors;
pub mod params;
pub mod run_log;

pub use dataset::*;
pub use errors::*;
pub use params::*;
pub use run_log::*;
