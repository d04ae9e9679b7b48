use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::services::service_traits::OAuthTokenService;
use crate::utils::{config::OAuthConfig, types::SignedInUser};

/// An upstream OAuth access token
#[derive(Debug, Clone, PartialEq)]
pub struct OAuthToken {
    pub token_type: String,
    pub access_token: String,
    pub expiry: Option<DateTime<Utc>>,
}

impl OAuthToken {
    pub fn bearer(access_token: &str) -> Self {
        Self {
            token_type: "Bearer".to_string(),
            access_token: access_token.to_string(),
            expiry: None,
        }
    }

    /// Authorization scheme with the usual casing
    pub fn scheme(&self) -> String {
        match self.token_type.to_ascii_lowercase().as_str() {
            "" | "bearer" => "Bearer".to_string(),
            "mac" => "MAC".to_string(),
            "basic" => "Basic".to_string(),
            _ => self.token_type.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiry.map(|expiry| expiry <= now).unwrap_or(false)
    }

    /// Value of the `Authorization` header
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.scheme(), self.access_token)
    }
}

/// Hands out one fixed token to every user
#[derive(Debug, Clone, Default)]
pub struct StaticOAuthTokenService {
    token: Option<OAuthToken>,
}

impl StaticOAuthTokenService {
    pub fn new(token: Option<OAuthToken>) -> Self {
        Self { token }
    }

    pub fn from_config(config: Option<&OAuthConfig>) -> Self {
        Self::new(config.map(|c| OAuthToken {
            token_type: c.token_type.clone(),
            access_token: c.access_token.clone(),
            expiry: None,
        }))
    }
}

#[async_trait]
impl OAuthTokenService for StaticOAuthTokenService {
    async fn current_token(&self, _user: &SignedInUser) -> Option<OAuthToken> {
        self.token
            .as_ref()
            .filter(|token| !token.is_expired(Utc::now()))
            .cloned()
    }
}
