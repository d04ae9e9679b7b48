use thiserror::Error;

/// Main error type for the query gateway
#[derive(Debug, Error)]
pub enum GateError {
    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    DataSource(#[from] DataSourceError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("data source access denied")]
    AccessDenied,

    #[error("request cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Malformed or ambiguous query batches
#[derive(Debug, Error, PartialEq)]
pub enum QueryError {
    #[error("{0}")]
    BadQuery(String),
}

/// Errors raised by data source lookups
#[derive(Debug, Error)]
pub enum DataSourceError {
    #[error("data source not found: {0}")]
    NotFound(String),

    #[error("access to data source denied: {0}")]
    AccessDenied(String),

    #[error("data source lookup failed: {0}")]
    Backend(String),
}

/// Failures on either dispatch path
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("expression request error: {0}")]
    Expression(#[source] Box<GateError>),

    #[error("failed to convert data source to instance settings: {0}")]
    InstanceSettings(#[source] serde_json::Error),

    #[error("no plugin client registered for type: {0}")]
    UnknownPlugin(String),

    #[error("backend responded with an error: {0}")]
    Backend(String),
}

/// Result type alias for gateway operations
pub type GateResult<T> = Result<T, GateError>;

impl GateError {
    /// Shorthand for a `BadQuery` error
    pub fn bad_query(message: impl Into<String>) -> Self {
        GateError::Query(QueryError::BadQuery(message.into()))
    }

    /// Whether the failure is the caller's fault rather than ours
    pub fn is_client_error(&self) -> bool {
        matches!(self, GateError::Query(_))
    }

    /// Whether this is a `BadQuery` carrying exactly `message`
    pub fn is_bad_query(&self, message: &str) -> bool {
        matches!(self, GateError::Query(QueryError::BadQuery(m)) if m == message)
    }
}
