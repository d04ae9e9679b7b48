// Query dispatch core
pub mod query_parser;
pub mod datasource_resolver;
pub mod batch_classifier;
pub mod expression_dispatcher;
pub mod plugin_dispatcher;
pub mod query_service;

pub use query_parser::*;
pub use datasource_resolver::*;
pub use batch_classifier::*;
pub use expression_dispatcher::*;
pub use plugin_dispatcher::*;
pub use query_service::*;
