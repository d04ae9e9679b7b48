use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

use crate::engine::{
    datasource_resolver::DataSourceResolver,
    expression_dispatcher::ExpressionDispatcher,
    plugin_dispatcher::PluginDispatcher,
    query_parser::QueryBatchParser,
};
use crate::plugins::{HttpPluginClient, PluginClient, PluginRegistry};
use crate::services::{
    expression_engine_from_config, AccessValidator, DataSourceCache, ExpressionEngine,
    HostAllowListValidator, InMemoryDataSourceCache, OAuthTokenService, PlaintextSecretsService,
    SecretsService, StaticOAuthTokenService,
};
use crate::utils::{
    config::ServiceConfig,
    error::{GateError, GateResult},
    types::{QueryBatchRequest, QueryDataResponse, SignedInUser},
};

/// Entry point for executing query batches
#[derive(Clone)]
pub struct QueryService {
    parser: QueryBatchParser,
    expressions: ExpressionDispatcher,
    plugins: PluginDispatcher,
}

impl QueryService {
    pub fn builder() -> QueryServiceBuilder {
        QueryServiceBuilder::new()
    }

    /// Wire the service from a config file's collaborators.
    ///
    /// Every plugin endpoint of the config is registered on top of
    /// `registry`, which may already hold in-process clients.
    pub fn from_config(config: &ServiceConfig, mut registry: PluginRegistry) -> GateResult<Self> {
        for (plugin_id, endpoint) in &config.plugins {
            registry.register(plugin_id, Arc::new(HttpPluginClient::from_config(endpoint)?))?;
        }

        QueryService::builder()
            .with_data_source_cache(Arc::new(InMemoryDataSourceCache::from_config(config)?))
            .with_expression_engine(Arc::from(expression_engine_from_config(&config.expressions)?))
            .with_access_validator(Arc::new(HostAllowListValidator::new(
                config.security.allowed_hosts.clone(),
            )))
            .with_secrets_service(Arc::new(PlaintextSecretsService::new()))
            .with_oauth_token_service(Arc::new(StaticOAuthTokenService::from_config(config.oauth.as_ref())))
            .with_plugin_client(Arc::new(registry))
            .build()
    }

    /// Blocks until `shutdown` fires; the service keeps no background work
    pub async fn run(&self, shutdown: CancellationToken) -> GateResult<()> {
        shutdown.cancelled().await;
        Ok(())
    }

    /// Parse, classify and dispatch one batch.
    ///
    /// With `handle_expressions` false the batch always goes to the plugin
    /// path, even when it references the expression engine.
    #[instrument(skip_all, fields(user = %user.login, org_id = user.org_id, queries = batch.queries.len()))]
    pub async fn query_data(
        &self,
        cancel: &CancellationToken,
        user: &SignedInUser,
        skip_cache: bool,
        batch: &QueryBatchRequest,
        handle_expressions: bool,
    ) -> GateResult<QueryDataResponse> {
        let parsed = self.parser.parse(cancel, user, skip_cache, batch).await?;

        if handle_expressions && parsed.has_expression() {
            return self.expressions.dispatch(cancel, user, &parsed).await;
        }
        self.plugins.dispatch(cancel, user, &parsed).await
    }
}

/// Builder for [`QueryService`]
#[derive(Default)]
pub struct QueryServiceBuilder {
    data_source_cache: Option<Arc<dyn DataSourceCache>>,
    expression_engine: Option<Arc<dyn ExpressionEngine>>,
    access_validator: Option<Arc<dyn AccessValidator>>,
    secrets_service: Option<Arc<dyn SecretsService>>,
    oauth_token_service: Option<Arc<dyn OAuthTokenService>>,
    plugin_client: Option<Arc<dyn PluginClient>>,
}

impl QueryServiceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_source_cache(mut self, cache: Arc<dyn DataSourceCache>) -> Self {
        self.data_source_cache = Some(cache);
        self
    }

    pub fn with_expression_engine(mut self, engine: Arc<dyn ExpressionEngine>) -> Self {
        self.expression_engine = Some(engine);
        self
    }

    pub fn with_access_validator(mut self, validator: Arc<dyn AccessValidator>) -> Self {
        self.access_validator = Some(validator);
        self
    }

    pub fn with_secrets_service(mut self, secrets: Arc<dyn SecretsService>) -> Self {
        self.secrets_service = Some(secrets);
        self
    }

    pub fn with_oauth_token_service(mut self, oauth: Arc<dyn OAuthTokenService>) -> Self {
        self.oauth_token_service = Some(oauth);
        self
    }

    pub fn with_plugin_client(mut self, client: Arc<dyn PluginClient>) -> Self {
        self.plugin_client = Some(client);
        self
    }

    /// Build the service.
    ///
    /// The data source cache, expression engine and plugin client are
    /// required. The validator defaults to allowing every host, secrets to
    /// plaintext and OAuth to no token.
    pub fn build(self) -> GateResult<QueryService> {
        let cache = self
            .data_source_cache
            .ok_or_else(|| GateError::Configuration("a data source cache is required".to_string()))?;
        let engine = self
            .expression_engine
            .ok_or_else(|| GateError::Configuration("an expression engine is required".to_string()))?;
        let client = self
            .plugin_client
            .ok_or_else(|| GateError::Configuration("a plugin client is required".to_string()))?;

        let validator = self
            .access_validator
            .unwrap_or_else(|| Arc::new(HostAllowListValidator::allow_all()) as Arc<dyn AccessValidator>);
        let secrets = self
            .secrets_service
            .unwrap_or_else(|| Arc::new(PlaintextSecretsService::new()) as Arc<dyn SecretsService>);
        let oauth = self
            .oauth_token_service
            .unwrap_or_else(|| Arc::new(StaticOAuthTokenService::default()) as Arc<dyn OAuthTokenService>);

        info!("Query service initialization");

        Ok(QueryService {
            parser: QueryBatchParser::new(DataSourceResolver::new(cache)),
            expressions: ExpressionDispatcher::new(engine),
            plugins: PluginDispatcher::new(validator, secrets, oauth, client),
        })
    }
}
