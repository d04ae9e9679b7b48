use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument};

use crate::engine::batch_classifier::ParsedRequest;
use crate::plugins::PluginClient;
use crate::services::{AccessValidator, OAuthTokenService, SecretsService};
use crate::utils::{
    cancel::with_cancellation,
    error::{DispatchError, GateError, GateResult},
    types::{
        DataSource, DataSourceInstanceSettings, PluginContext, PluginQueryRequest, PluginUser,
        QueryDataResponse, SignedInUser,
    },
};

/// Sends single-source batches straight to the backing plugin
#[derive(Clone)]
pub struct PluginDispatcher {
    validator: Arc<dyn AccessValidator>,
    secrets: Arc<dyn SecretsService>,
    oauth: Arc<dyn OAuthTokenService>,
    client: Arc<dyn PluginClient>,
}

impl PluginDispatcher {
    pub fn new(
        validator: Arc<dyn AccessValidator>,
        secrets: Arc<dyn SecretsService>,
        oauth: Arc<dyn OAuthTokenService>,
        client: Arc<dyn PluginClient>,
    ) -> Self {
        Self {
            validator,
            secrets,
            oauth,
            client,
        }
    }

    /// Assemble the plugin request for a batch backed by one data source
    pub async fn prepare_request(
        &self,
        cancel: &CancellationToken,
        user: &SignedInUser,
        parsed: &ParsedRequest,
    ) -> GateResult<PluginQueryRequest> {
        let first = parsed
            .queries()
            .first()
            .ok_or_else(|| GateError::bad_query("no queries found"))?;
        let ds = first
            .source
            .as_ref()
            .ok_or_else(|| GateError::bad_query(format!("query missing datasource info: {}", first.query.ref_id)))?
            .data_source()
            .clone();

        if cancel.is_cancelled() {
            return Err(GateError::Cancelled);
        }

        if self.validator.validate(&ds.url, None).is_err() {
            return Err(GateError::AccessDenied);
        }

        let decrypted = self.decrypt_secure_json_data(cancel, &ds).await?;
        let instance_settings = model_to_instance_settings(&ds, decrypted)?;

        let mut headers = HashMap::new();
        if self.oauth.is_pass_through_enabled(&ds) {
            let token = with_cancellation(cancel, async { Ok(self.oauth.current_token(user).await) }).await?;
            if let Some(token) = token {
                headers.insert("Authorization".to_string(), token.authorization_header());
            }
        }

        Ok(PluginQueryRequest {
            plugin_context: PluginContext {
                org_id: ds.org_id,
                plugin_id: ds.ds_type.clone(),
                user: Some(PluginUser::from(user)),
                data_source_instance_settings: Some(instance_settings),
            },
            headers,
            queries: parsed.queries().iter().map(|pq| pq.query.clone()).collect(),
        })
    }

    #[instrument(skip_all, fields(org_id = user.org_id, queries = parsed.len()))]
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        user: &SignedInUser,
        parsed: &ParsedRequest,
    ) -> GateResult<QueryDataResponse> {
        let request = self.prepare_request(cancel, user, parsed).await?;
        debug!(plugin_id = %request.plugin_context.plugin_id, "dispatching to plugin");

        with_cancellation(cancel, self.client.query_data(request)).await
    }

    /// Decrypt secure settings; a failure leaves the plugin without credentials
    async fn decrypt_secure_json_data(
        &self,
        cancel: &CancellationToken,
        ds: &DataSource,
    ) -> GateResult<HashMap<String, String>> {
        match with_cancellation(cancel, self.secrets.decrypt_json_data(&ds.secure_json_data)).await {
            Ok(decrypted) => Ok(decrypted),
            Err(GateError::Cancelled) => Err(GateError::Cancelled),
            Err(e) => {
                error!(uid = %ds.uid, error = %e, "Failed to decrypt secure json data");
                Ok(HashMap::new())
            }
        }
    }
}

/// Materialise the settings a plugin needs to talk to one data source
pub fn model_to_instance_settings(
    ds: &DataSource,
    decrypted_secure_json_data: HashMap<String, String>,
) -> GateResult<DataSourceInstanceSettings> {
    let json_data = serde_json::to_vec(&ds.json_data).map_err(DispatchError::InstanceSettings)?;

    Ok(DataSourceInstanceSettings {
        id: ds.id,
        uid: ds.uid.clone(),
        name: ds.name.clone(),
        url: ds.url.clone(),
        user: ds.user.clone(),
        database: ds.database.clone(),
        basic_auth_enabled: ds.basic_auth,
        basic_auth_user: ds.basic_auth_user.clone(),
        json_data,
        decrypted_secure_json_data,
        updated: ds.updated,
    })
}
