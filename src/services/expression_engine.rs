use async_trait::async_trait;
use std::time::Duration;

use crate::plugins::http_plugin::HttpBackend;
use crate::services::service_traits::ExpressionEngine;
use crate::utils::{
    config::ExpressionConfig,
    error::{GateError, GateResult},
    types::{ExpressionRequest, QueryDataResponse},
};

/// Expression engine running as a separate HTTP service
#[derive(Debug, Clone)]
pub struct HttpExpressionEngine {
    backend: HttpBackend,
}

impl HttpExpressionEngine {
    pub fn new(endpoint: &str, timeout: Duration) -> GateResult<Self> {
        Ok(Self {
            backend: HttpBackend::new(endpoint, timeout)?,
        })
    }
}

#[async_trait]
impl ExpressionEngine for HttpExpressionEngine {
    async fn transform(&self, request: ExpressionRequest) -> GateResult<QueryDataResponse> {
        self.backend.post_json(&request).await
    }
}

/// Stand-in used when no expression engine is configured
#[derive(Debug, Clone, Default)]
pub struct UnavailableExpressionEngine;

#[async_trait]
impl ExpressionEngine for UnavailableExpressionEngine {
    async fn transform(&self, _request: ExpressionRequest) -> GateResult<QueryDataResponse> {
        Err(GateError::Configuration("no expression engine endpoint configured".to_string()))
    }
}

/// Pick the engine matching the config
pub fn expression_engine_from_config(config: &ExpressionConfig) -> GateResult<Box<dyn ExpressionEngine>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Box::new(HttpExpressionEngine::new(
            endpoint,
            Duration::from_secs(config.timeout_seconds),
        )?)),
        None => Ok(Box::new(UnavailableExpressionEngine)),
    }
}
