// Utility modules
pub mod error;
pub mod config;
pub mod types;
pub mod time_range;
pub mod cancel;
pub mod logging;

pub use error::*;
pub use config::*;
pub use types::*;
pub use time_range::*;
pub use cancel::*;
pub use logging::*;
