use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::services::oauth_token::OAuthToken;
use crate::utils::{
    error::GateResult,
    types::{DataSource, ExpressionRequest, QueryDataResponse, SignedInUser},
};

/// Lookup of configured data sources, possibly cached
#[async_trait]
pub trait DataSourceCache: Send + Sync {
    /// Fetch a data source by numeric id
    async fn get_by_id(&self, id: i64, user: &SignedInUser, skip_cache: bool) -> GateResult<Arc<DataSource>>;

    /// Fetch a data source by uid
    async fn get_by_uid(&self, uid: &str, user: &SignedInUser, skip_cache: bool) -> GateResult<Arc<DataSource>>;
}

/// Decides whether outgoing requests to a data source URL are allowed
pub trait AccessValidator: Send + Sync {
    fn validate(&self, url: &str, headers: Option<&HashMap<String, String>>) -> GateResult<()>;
}

/// Decrypts secure data source configuration
#[async_trait]
pub trait SecretsService: Send + Sync {
    async fn decrypt_json_data(&self, secure: &HashMap<String, Vec<u8>>) -> GateResult<HashMap<String, String>>;
}

/// Access to the signed-in user's upstream OAuth token
#[async_trait]
pub trait OAuthTokenService: Send + Sync {
    /// Whether the data source forwards the user's token
    fn is_pass_through_enabled(&self, ds: &DataSource) -> bool {
        ds.json_data
            .get("oauthPassThru")
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    /// The user's current token, if any
    async fn current_token(&self, user: &SignedInUser) -> Option<OAuthToken>;
}

/// Evaluates batches containing expression queries
#[async_trait]
pub trait ExpressionEngine: Send + Sync {
    async fn transform(&self, request: ExpressionRequest) -> GateResult<QueryDataResponse>;
}
