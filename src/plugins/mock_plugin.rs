use async_trait::async_trait;
use serde_json::json;
use std::sync::Mutex;
use std::time::Duration;

use crate::plugins::plugin_trait::PluginClient;
use crate::utils::{
    error::{GateError, GateResult},
    types::{DataResponse, Frame, PluginQueryRequest, QueryDataResponse},
};

/// Plugin client producing deterministic series, for tests and local runs
#[derive(Debug, Default)]
pub struct MockPluginClient {
    requests: Mutex<Vec<PluginQueryRequest>>,
    failure: Option<String>,
    delay: Option<Duration>,
}

impl MockPluginClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call fails with the given message
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Sleep before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Requests received so far
    pub fn requests(&self) -> Vec<PluginQueryRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn last_request(&self) -> Option<PluginQueryRequest> {
        self.requests.lock().ok().and_then(|r| r.last().cloned())
    }

    /// A short series spread evenly over the query's time range
    fn series_for(request: &PluginQueryRequest, index: usize) -> Frame {
        let query = &request.queries[index];
        let points = query.max_data_points.clamp(1, 5) as i64;
        let from = query.time_range.from.timestamp_millis();
        let step = (query.time_range.to.timestamp_millis() - from) / points.max(1);

        let times = (0..points).map(|i| json!(from + i * step)).collect();
        let values = (0..points).map(|i| json!((index as i64 + 1) * 10 + i)).collect();

        Frame::new(&query.ref_id)
            .with_field("time", times)
            .with_field("value", values)
    }
}

#[async_trait]
impl PluginClient for MockPluginClient {
    async fn query_data(&self, request: PluginQueryRequest) -> GateResult<QueryDataResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(message) = &self.failure {
            return Err(GateError::Internal(message.clone()));
        }

        let mut response = QueryDataResponse::new();
        for (index, query) in request.queries.iter().enumerate() {
            response.insert(
                &query.ref_id,
                DataResponse {
                    frames: vec![Self::series_for(&request, index)],
                    error: None,
                },
            );
        }
        Ok(response)
    }
}
