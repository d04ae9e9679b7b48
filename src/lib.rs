pub mod engine;
pub mod plugins;
pub mod services;
pub mod cli;
pub mod utils;

pub use engine::*;
pub use plugins::*;
pub use services::*;
pub use cli::*;
pub use utils::*;
