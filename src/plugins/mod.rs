// Plugin client capability and implementations
pub mod plugin_trait;
pub mod http_plugin;
pub mod mock_plugin;

pub use plugin_trait::*;
pub use http_plugin::*;
pub use mock_plugin::*;
