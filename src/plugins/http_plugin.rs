use async_trait::async_trait;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use url::Url;

use crate::plugins::plugin_trait::PluginClient;
use crate::utils::{
    config::PluginEndpointConfig,
    error::{DispatchError, GateError, GateResult},
    types::{PluginQueryRequest, QueryDataResponse},
};

/// JSON-over-HTTP transport shared by remote plugins and the expression engine
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    endpoint: Url,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(endpoint: &str, timeout: Duration) -> GateResult<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| GateError::Configuration(format!("invalid endpoint '{}': {}", endpoint, e)))?;

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GateError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// POST `body` as JSON and decode a JSON answer
    pub async fn post_json<B, R>(&self, body: &B) -> GateResult<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.endpoint.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| DispatchError::Backend(format!("HTTP request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(DispatchError::Backend(format!(
                "HTTP request failed with status {}: {}",
                status,
                detail.trim()
            ))
            .into());
        }

        response
            .json::<R>()
            .await
            .map_err(|e| DispatchError::Backend(format!("Failed to parse JSON response: {}", e)).into())
    }
}

/// Plugin client for a backend reachable over HTTP
#[derive(Debug, Clone)]
pub struct HttpPluginClient {
    backend: HttpBackend,
}

impl HttpPluginClient {
    pub fn new(endpoint: &str, timeout: Duration) -> GateResult<Self> {
        Ok(Self {
            backend: HttpBackend::new(endpoint, timeout)?,
        })
    }

    pub fn from_config(config: &PluginEndpointConfig) -> GateResult<Self> {
        Self::new(&config.endpoint, Duration::from_secs(config.timeout_seconds))
    }

    pub fn endpoint(&self) -> &Url {
        self.backend.endpoint()
    }
}

#[async_trait]
impl PluginClient for HttpPluginClient {
    async fn query_data(&self, request: PluginQueryRequest) -> GateResult<QueryDataResponse> {
        self.backend.post_json(&request).await
    }
}
