use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::engine::{batch_classifier::ParsedRequest, datasource_resolver::DataSourceResolver};
use crate::utils::{
    error::{GateError, GateResult},
    time_range::TimeRange,
    types::{DataQuery, DataSourceReference, QueryBatchRequest, SignedInUser},
};

pub const DEFAULT_REF_ID: &str = "A";
pub const DEFAULT_MAX_DATA_POINTS: i64 = 100;
pub const DEFAULT_INTERVAL_MS: i64 = 1000;

/// Turns a raw batch into typed, resolved and classified queries
#[derive(Clone)]
pub struct QueryBatchParser {
    resolver: DataSourceResolver,
}

impl QueryBatchParser {
    pub fn new(resolver: DataSourceResolver) -> Self {
        Self { resolver }
    }

    pub async fn parse(
        &self,
        cancel: &CancellationToken,
        user: &SignedInUser,
        skip_cache: bool,
        batch: &QueryBatchRequest,
    ) -> GateResult<ParsedRequest> {
        self.parse_at(cancel, user, skip_cache, batch, Utc::now()).await
    }

    /// Like [`parse`](Self::parse) with relative times resolved against `now`
    pub async fn parse_at(
        &self,
        cancel: &CancellationToken,
        user: &SignedInUser,
        skip_cache: bool,
        batch: &QueryBatchRequest,
        now: DateTime<Utc>,
    ) -> GateResult<ParsedRequest> {
        if batch.queries.is_empty() {
            return Err(GateError::bad_query("no queries found"));
        }

        let time_range = TimeRange::parse(&batch.from, &batch.to, now);
        let mut resolution = self.resolver.for_batch(user, skip_cache, cancel);
        let mut request = ParsedRequest::new();

        for raw in &batch.queries {
            let reference = extract_reference(raw);
            let source = resolution.resolve(&reference).await?;

            debug!(uid = source.uid(), query = %raw, "Processing metrics query");

            let query = build_data_query(raw, time_range)?;
            request.add(Some(source), query);
        }

        debug!(
            queries = request.len(),
            sources = resolution.distinct_sources(),
            has_expression = request.has_expression(),
            "parsed query batch"
        );

        request.validate()?;
        Ok(request)
    }
}

/// Pull the data source reference out of a raw query.
///
/// `datasource.uid` wins over a bare `datasource` string; `datasourceId`
/// is carried alongside for lookups by numeric id.
pub fn extract_reference(raw: &JsonValue) -> DataSourceReference {
    let uid = match raw.get("datasource") {
        Some(JsonValue::Object(ds)) => ds.get("uid").and_then(JsonValue::as_str),
        Some(JsonValue::String(legacy)) => Some(legacy.as_str()),
        _ => None,
    }
    .filter(|uid| !uid.is_empty())
    .map(str::to_string);

    let id = raw.get("datasourceId").and_then(JsonValue::as_i64);

    DataSourceReference { uid, id }
}

/// Build the backend query for one raw query document
pub fn build_data_query(raw: &JsonValue, time_range: TimeRange) -> GateResult<DataQuery> {
    let json = serde_json::to_vec(raw)
        .map_err(|e| GateError::Internal(format!("failed to serialize query: {}", e)))?;

    let interval_ms = int_field(raw, "intervalMs").unwrap_or(DEFAULT_INTERVAL_MS);

    Ok(DataQuery {
        ref_id: string_field(raw, "refId").unwrap_or(DEFAULT_REF_ID).to_string(),
        query_type: string_field(raw, "queryType").unwrap_or_default().to_string(),
        max_data_points: int_field(raw, "maxDataPoints").unwrap_or(DEFAULT_MAX_DATA_POINTS),
        interval: Duration::from_millis(interval_ms.max(0) as u64),
        time_range,
        json,
    })
}

fn string_field<'a>(raw: &'a JsonValue, key: &str) -> Option<&'a str> {
    raw.get(key).and_then(JsonValue::as_str)
}

fn int_field(raw: &JsonValue, key: &str) -> Option<i64> {
    raw.get(key).and_then(JsonValue::as_i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reference_object_form() {
        let reference = extract_reference(&json!({"datasource": {"uid": "prom", "type": "prometheus"}}));
        assert_eq!(reference, DataSourceReference::by_uid("prom"));
    }

    #[test]
    fn test_reference_legacy_string_form() {
        let reference = extract_reference(&json!({"datasource": "__expr__"}));
        assert_eq!(reference.uid(), "__expr__");
    }

    #[test]
    fn test_reference_numeric_id() {
        let reference = extract_reference(&json!({"datasourceId": 5}));
        assert_eq!(reference, DataSourceReference::by_id(5));
    }

    #[test]
    fn test_reference_missing() {
        let reference = extract_reference(&json!({"refId": "A", "datasource": {"type": "prometheus"}}));
        assert_eq!(reference, DataSourceReference::default());
    }

    #[test]
    fn test_defaults_applied() {
        let range = TimeRange::new(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::UNIX_EPOCH);
        let query = build_data_query(&json!({"datasourceId": 5}), range).unwrap();

        assert_eq!(query.ref_id, "A");
        assert_eq!(query.max_data_points, 100);
        assert_eq!(query.interval, Duration::from_millis(1000));
        assert_eq!(query.query_type, "");
    }

    #[test]
    fn test_fields_extracted_and_payload_kept() {
        let raw = json!({
            "refId": "B",
            "maxDataPoints": 1500,
            "intervalMs": 250,
            "queryType": "range",
            "expr": "up",
            "datasource": {"uid": "prom"}
        });
        let range = TimeRange::new(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::UNIX_EPOCH);
        let query = build_data_query(&raw, range).unwrap();

        assert_eq!(query.ref_id, "B");
        assert_eq!(query.max_data_points, 1500);
        assert_eq!(query.interval, Duration::from_millis(250));
        assert_eq!(query.query_type, "range");

        let payload: JsonValue = serde_json::from_slice(&query.json).unwrap();
        assert_eq!(payload, raw);
    }

    #[test]
    fn test_wrongly_typed_fields_fall_back() {
        let raw = json!({"refId": 7, "maxDataPoints": "lots", "intervalMs": 2.5});
        let range = TimeRange::new(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::UNIX_EPOCH);
        let query = build_data_query(&raw, range).unwrap();

        assert_eq!(query.ref_id, "A");
        assert_eq!(query.max_data_points, 100);
        assert_eq!(query.interval, Duration::from_millis(1000));
    }
}
