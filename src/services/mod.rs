// Collaborators the dispatch core depends on
pub mod service_traits;
pub mod datasource_cache;
pub mod access_validator;
pub mod secrets;
pub mod oauth_token;
pub mod expression_engine;

pub use service_traits::*;
pub use datasource_cache::*;
pub use access_validator::*;
pub use secrets::*;
pub use oauth_token::*;
pub use expression_engine::*;
