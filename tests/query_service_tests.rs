use async_trait::async_trait;
use querygate::{
    AccessValidator, DataResponse, DataSource, DataSourceCache, DataSourceError, DispatchError,
    ExpressionEngine, ExpressionRequest, GateError, GateResult, InMemoryDataSourceCache,
    MockPluginClient, OAuthToken, PlaintextSecretsService, QueryBatchRequest, QueryDataResponse,
    QueryService, SecretsService, SignedInUser, StaticOAuthTokenService,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Expression engine that records requests and echoes one response per ref id
#[derive(Default)]
struct RecordingExpressionEngine {
    requests: Mutex<Vec<ExpressionRequest>>,
}

impl RecordingExpressionEngine {
    fn requests(&self) -> Vec<ExpressionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExpressionEngine for RecordingExpressionEngine {
    async fn transform(&self, request: ExpressionRequest) -> GateResult<QueryDataResponse> {
        let mut response = QueryDataResponse::new();
        for query in &request.queries {
            response.insert(&query.ref_id, DataResponse::default());
        }
        self.requests.lock().unwrap().push(request);
        Ok(response)
    }
}

/// Validator with a fixed verdict that counts its calls
struct CountingValidator {
    allow: bool,
    calls: AtomicUsize,
}

impl CountingValidator {
    fn new(allow: bool) -> Self {
        Self {
            allow,
            calls: AtomicUsize::new(0),
        }
    }
}

impl AccessValidator for CountingValidator {
    fn validate(&self, _url: &str, _headers: Option<&HashMap<String, String>>) -> GateResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.allow {
            Ok(())
        } else {
            Err(GateError::AccessDenied)
        }
    }
}

/// Secrets service that counts calls and optionally fails
struct CountingSecrets {
    fail: bool,
    calls: AtomicUsize,
}

impl CountingSecrets {
    fn new(fail: bool) -> Self {
        Self {
            fail,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SecretsService for CountingSecrets {
    async fn decrypt_json_data(&self, secure: &HashMap<String, Vec<u8>>) -> GateResult<HashMap<String, String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(GateError::Internal("key unavailable".to_string()));
        }
        PlaintextSecretsService::new().decrypt_json_data(secure).await
    }
}

struct Harness {
    service: QueryService,
    cache: Arc<InMemoryDataSourceCache>,
    engine: Arc<RecordingExpressionEngine>,
    plugin: Arc<MockPluginClient>,
    validator: Arc<CountingValidator>,
    secrets: Arc<CountingSecrets>,
}

struct HarnessOptions {
    allow: bool,
    fail_decrypt: bool,
    plugin: MockPluginClient,
    token: Option<OAuthToken>,
}

impl Default for HarnessOptions {
    fn default() -> Self {
        Self {
            allow: true,
            fail_decrypt: false,
            plugin: MockPluginClient::new(),
            token: None,
        }
    }
}

fn data_sources() -> Vec<DataSource> {
    vec![
        DataSource::new(1, "prom", "prometheus")
            .with_url("http://prometheus:9090")
            .with_secure_value("basicAuthPassword", b"s3cret"),
        DataSource::new(2, "loki", "loki").with_url("http://loki:3100"),
        DataSource::new(3, "prom-oauth", "prometheus")
            .with_url("http://prometheus:9090")
            .with_json_data(json!({"oauthPassThru": true})),
        DataSource::new(4, "other-org", "prometheus").with_org(2),
    ]
}

fn harness(options: HarnessOptions) -> Harness {
    let cache = Arc::new(
        data_sources()
            .into_iter()
            .fold(InMemoryDataSourceCache::new(Duration::from_secs(60)), |c, ds| c.with_data_source(ds)),
    );
    let engine = Arc::new(RecordingExpressionEngine::default());
    let plugin = Arc::new(options.plugin);
    let validator = Arc::new(CountingValidator::new(options.allow));
    let secrets = Arc::new(CountingSecrets::new(options.fail_decrypt));

    let service = QueryService::builder()
        .with_data_source_cache(cache.clone())
        .with_expression_engine(engine.clone())
        .with_access_validator(validator.clone())
        .with_secrets_service(secrets.clone())
        .with_oauth_token_service(Arc::new(StaticOAuthTokenService::new(options.token)))
        .with_plugin_client(plugin.clone())
        .build()
        .unwrap();

    Harness {
        service,
        cache,
        engine,
        plugin,
        validator,
        secrets,
    }
}

fn user() -> SignedInUser {
    SignedInUser::new(7, 1, "editor")
}

fn batch(queries: Vec<serde_json::Value>) -> QueryBatchRequest {
    queries
        .into_iter()
        .fold(QueryBatchRequest::new("now-1h", "now"), |b, q| b.with_query(q))
}

fn uid_query(ref_id: &str, uid: &str) -> serde_json::Value {
    json!({"refId": ref_id, "datasource": {"uid": uid}})
}

#[tokio::test]
async fn test_single_source_batch_goes_to_plugin_in_order() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("B", "prom"), uid_query("A", "prom"), uid_query("C", "prom")]);

    let response = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    assert_eq!(response.len(), 3);
    assert!(h.engine.requests().is_empty());

    let sent = h.plugin.last_request().unwrap();
    let ref_ids: Vec<_> = sent.queries.iter().map(|q| q.ref_id.as_str()).collect();
    assert_eq!(ref_ids, vec!["B", "A", "C"]);
    assert_eq!(sent.plugin_context.plugin_id, "prometheus");
    assert_eq!(sent.plugin_context.org_id, 1);
    assert_eq!(sent.plugin_context.user.as_ref().unwrap().login, "editor");

    let settings = sent.plugin_context.data_source_instance_settings.unwrap();
    assert_eq!(settings.uid, "prom");
    assert_eq!(settings.url, "http://prometheus:9090");
    assert_eq!(settings.decrypted_secure_json_data["basicAuthPassword"], "s3cret");
    assert!(sent.headers.is_empty());
}

#[tokio::test]
async fn test_expression_anywhere_routes_whole_batch_to_engine() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![
        uid_query("A", "prom"),
        json!({"refId": "B", "datasource": {"uid": "__expr__", "type": "__expr__"}, "expression": "$A + $C"}),
        uid_query("C", "loki"),
    ]);

    let response = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    assert_eq!(response.len(), 3);
    assert_eq!(h.plugin.request_count(), 0);

    let sent = h.engine.requests();
    assert_eq!(sent.len(), 1);
    let tags: Vec<_> = sent[0]
        .queries
        .iter()
        .map(|q| (q.ref_id.as_str(), q.datasource.uid.as_str(), q.datasource.ds_type.as_str()))
        .collect();
    assert_eq!(
        tags,
        vec![("A", "prom", "prometheus"), ("B", "__expr__", "__expr__"), ("C", "loki", "loki")]
    );
    assert_eq!(sent[0].org_id, 1);

    let payload: serde_json::Value = serde_json::from_slice(&sent[0].queries[1].json).unwrap();
    assert_eq!(payload["expression"], "$A + $C");
}

#[tokio::test]
async fn test_legacy_expression_uid_is_recognised() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom"), json!({"refId": "B", "datasource": "-100"})]);

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    assert_eq!(h.engine.requests().len(), 1);
    assert_eq!(h.engine.requests()[0].queries[1].datasource.uid, "__expr__");
}

#[tokio::test]
async fn test_mixed_sources_without_expression_rejected() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom"), uid_query("B", "loki")]);

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap_err();

    assert!(err.is_bad_query("all queries must use the same datasource"));
    assert_eq!(h.plugin.request_count(), 0);
    assert!(h.engine.requests().is_empty());
    assert_eq!(h.validator.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_metrics_pseudo_source_counts_towards_mixing() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom"), uid_query("B", "grafana")]);

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap_err();
    assert!(err.is_bad_query("all queries must use the same datasource"));
}

#[tokio::test]
async fn test_metrics_pseudo_source_alone_dispatches_without_lookup() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "grafana")]);

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    assert_eq!(h.cache.lookup_count(), 0);
    let sent = h.plugin.last_request().unwrap();
    assert_eq!(sent.plugin_context.plugin_id, "datasource");
    let settings = sent.plugin_context.data_source_instance_settings.unwrap();
    assert_eq!(settings.name, "-- Grafana --");
    assert_eq!(settings.id, -1);
}

#[tokio::test]
async fn test_empty_batch_rejected_before_any_lookup() {
    let h = harness(HarnessOptions::default());

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![]), true)
        .await
        .unwrap_err();

    assert!(err.is_bad_query("no queries found"));
    assert_eq!(h.cache.lookup_count(), 0);
    assert_eq!(h.plugin.request_count(), 0);
}

#[tokio::test]
async fn test_query_without_data_source_reference() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom"), json!({"refId": "B", "expr": "up"})]);

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap_err();

    assert!(err.is_bad_query("missing data source ID/UID"));
    assert_eq!(h.plugin.request_count(), 0);
}

#[tokio::test]
async fn test_repeated_uid_is_looked_up_once() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom"), uid_query("B", "prom"), uid_query("C", "prom")]);

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();
    assert_eq!(h.cache.lookup_count(), 1);

    // A second batch starts with a fresh memo but hits the TTL cache
    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();
    assert_eq!(h.cache.lookup_count(), 2);
    assert_eq!(h.cache.store_read_count(), 1);
}

#[tokio::test]
async fn test_skip_cache_reads_through() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom")]);

    for _ in 0..2 {
        h.service
            .query_data(&CancellationToken::new(), &user(), true, &request, true)
            .await
            .unwrap();
    }
    assert_eq!(h.cache.store_read_count(), 2);
}

#[tokio::test]
async fn test_numeric_id_reference() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![json!({"refId": "A", "datasourceId": 2})]);

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    let sent = h.plugin.last_request().unwrap();
    assert_eq!(sent.plugin_context.plugin_id, "loki");
}

#[tokio::test]
async fn test_expressions_disabled_forces_plugin_path() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "prom"), uid_query("B", "__expr__")]);

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, false)
        .await
        .unwrap();

    assert!(h.engine.requests().is_empty());
    let sent = h.plugin.last_request().unwrap();
    assert_eq!(sent.plugin_context.plugin_id, "prometheus");
    assert_eq!(sent.queries.len(), 2);
}

#[tokio::test]
async fn test_access_denied_before_decrypt() {
    let h = harness(HarnessOptions {
        allow: false,
        ..HarnessOptions::default()
    });
    let request = batch(vec![uid_query("A", "prom")]);

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::AccessDenied));
    assert_eq!(h.validator.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.secrets.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.plugin.request_count(), 0);
}

#[tokio::test]
async fn test_decrypt_failure_continues_without_secrets() {
    let h = harness(HarnessOptions {
        fail_decrypt: true,
        ..HarnessOptions::default()
    });
    let request = batch(vec![uid_query("A", "prom")]);

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    assert_eq!(h.secrets.calls.load(Ordering::SeqCst), 1);
    let settings = h
        .plugin
        .last_request()
        .unwrap()
        .plugin_context
        .data_source_instance_settings
        .unwrap();
    assert!(settings.decrypted_secure_json_data.is_empty());
}

#[tokio::test]
async fn test_oauth_passthrough_sets_authorization_header() {
    let mut token = OAuthToken::bearer("tok-123");
    token.token_type = "bearer".to_string();
    let h = harness(HarnessOptions {
        token: Some(token),
        ..HarnessOptions::default()
    });

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "prom-oauth")]), true)
        .await
        .unwrap();
    let sent = h.plugin.last_request().unwrap();
    assert_eq!(sent.headers.get("Authorization").map(String::as_str), Some("Bearer tok-123"));

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "prom")]), true)
        .await
        .unwrap();
    assert!(h.plugin.last_request().unwrap().headers.is_empty());
}

#[tokio::test]
async fn test_oauth_passthrough_without_token_sends_no_header() {
    let h = harness(HarnessOptions::default());

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "prom-oauth")]), true)
        .await
        .unwrap();
    assert!(h.plugin.last_request().unwrap().headers.is_empty());
}

#[tokio::test]
async fn test_unknown_uid_propagates_lookup_error() {
    let h = harness(HarnessOptions::default());

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "nope")]), true)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::DataSource(DataSourceError::NotFound(_))));
}

#[tokio::test]
async fn test_data_sources_are_org_scoped() {
    let h = harness(HarnessOptions::default());

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "other-org")]), true)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::DataSource(DataSourceError::NotFound(_))));

    let other = SignedInUser::new(8, 2, "viewer");
    h.service
        .query_data(&CancellationToken::new(), &other, false, &batch(vec![uid_query("A", "other-org")]), true)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_plugin_failure_is_returned_unchanged() {
    let h = harness(HarnessOptions {
        plugin: MockPluginClient::failing("connection refused"),
        ..HarnessOptions::default()
    });

    let err = h
        .service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "prom")]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Internal(ref msg) if msg == "connection refused"));
    assert_eq!(err.to_string(), "Internal error: connection refused");
    assert_eq!(h.plugin.request_count(), 1);
}

#[tokio::test]
async fn test_expression_failure_is_wrapped() {
    let service = QueryService::builder()
        .with_data_source_cache(Arc::new(InMemoryDataSourceCache::default()))
        .with_expression_engine(Arc::new(querygate::UnavailableExpressionEngine))
        .with_plugin_client(Arc::new(MockPluginClient::new()))
        .build()
        .unwrap();

    let err = service
        .query_data(&CancellationToken::new(), &user(), false, &batch(vec![uid_query("A", "__expr__")]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Dispatch(DispatchError::Expression(_))));
    assert!(err.to_string().starts_with("expression request error: "));
}

#[tokio::test]
async fn test_out_of_range_time_offset_falls_back_to_epoch() {
    let h = harness(HarnessOptions::default());
    let request = QueryBatchRequest::new("now-999999999999999d", "now").with_query(uid_query("A", "prom"));

    h.service
        .query_data(&CancellationToken::new(), &user(), false, &request, true)
        .await
        .unwrap();

    let sent = h.plugin.last_request().unwrap();
    assert_eq!(sent.queries[0].time_range.from.timestamp_millis(), 0);
    assert!(sent.queries[0].time_range.to.timestamp_millis() > 0);
}

#[tokio::test]
async fn test_cancelled_before_start() {
    let h = harness(HarnessOptions::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .service
        .query_data(&cancel, &user(), false, &batch(vec![uid_query("A", "prom")]), true)
        .await
        .unwrap_err();

    assert!(matches!(err, GateError::Cancelled));
    assert_eq!(h.plugin.request_count(), 0);
}

#[tokio::test]
async fn test_cancelled_while_plugin_is_running() {
    let h = harness(HarnessOptions {
        plugin: MockPluginClient::new().with_delay(Duration::from_secs(5)),
        ..HarnessOptions::default()
    });
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        Duration::from_secs(2),
        h.service
            .query_data(&cancel, &user(), false, &batch(vec![uid_query("A", "prom")]), true),
    )
    .await
    .expect("cancellation should end the call promptly");

    assert!(matches!(result, Err(GateError::Cancelled)));
}

#[test]
fn test_query_data_from_sync_context() {
    let h = harness(HarnessOptions::default());
    let request = batch(vec![uid_query("A", "loki")]);

    let response = tokio_test::block_on(h.service.query_data(
        &CancellationToken::new(),
        &user(),
        false,
        &request,
        true,
    ))
    .unwrap();

    let frames = &response.get("A").unwrap().frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].fields[0].name, "time");
}

#[tokio::test]
async fn test_cache_trait_object_is_shared() {
    let h = harness(HarnessOptions::default());
    let cache: Arc<dyn DataSourceCache> = h.cache.clone();

    let ds = cache.get_by_uid("loki", &user(), false).await.unwrap();
    assert_eq!(ds.id, 2);
    assert_eq!(h.cache.lookup_count(), 1);
}
