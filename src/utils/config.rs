use base64::prelude::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use url::Url;

use crate::utils::error::{GateError, GateResult};
use crate::utils::types::DataSource;

/// Main service configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub data_sources: Vec<DataSourceConfig>,
    pub plugins: HashMap<String, PluginEndpointConfig>,
    pub expressions: ExpressionConfig,
    pub security: SecurityConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub oauth: Option<OAuthConfig>,
}

/// A data source definition as written in the config file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DataSourceConfig {
    pub id: i64,
    pub uid: String,
    #[serde(default = "default_org_id")]
    pub org_id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub ds_type: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub basic_auth: bool,
    #[serde(default)]
    pub basic_auth_user: String,
    #[serde(default)]
    pub json_data: serde_json::Value,
    /// Secure values, base64 encoded
    #[serde(default)]
    pub secure_json_data: HashMap<String, String>,
    #[serde(default)]
    pub updated: Option<DateTime<Utc>>,
}

/// Where a plugin backend for one type tag is reachable
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PluginEndpointConfig {
    pub endpoint: String,
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

/// Expression engine endpoint
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExpressionConfig {
    pub endpoint: Option<String>,
    pub timeout_seconds: u64,
}

/// Access control for outgoing data source requests
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// `host` or `host:port` entries; empty allows every host
    pub allowed_hosts: Vec<String>,
}

/// Data source cache tuning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_seconds: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

/// Static token forwarded to data sources with OAuth passthrough
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OAuthConfig {
    #[serde(default)]
    pub token_type: String,
    pub access_token: String,
}

fn default_org_id() -> i64 {
    1
}

fn default_timeout() -> u64 {
    30
}

impl Default for ExpressionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { ttl_seconds: 5 }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl ServiceConfig {
    /// Load and validate a JSON config file
    pub fn from_file(path: impl AsRef<Path>) -> GateResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            GateError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON config document
    pub fn from_json_str(raw: &str) -> GateResult<Self> {
        let config: ServiceConfig = serde_json::from_str(raw)
            .map_err(|e| GateError::Configuration(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GateResult<()> {
        let mut uids = HashSet::new();
        let mut ids = HashSet::new();

        for ds in &self.data_sources {
            if ds.uid.is_empty() {
                return Err(GateError::Configuration(format!("data source {} has no uid", ds.id)));
            }
            if ds.ds_type.is_empty() {
                return Err(GateError::Configuration(format!("data source '{}' has no type", ds.uid)));
            }
            if !uids.insert(ds.uid.as_str()) {
                return Err(GateError::Configuration(format!("duplicate data source uid '{}'", ds.uid)));
            }
            if !ids.insert((ds.org_id, ds.id)) {
                return Err(GateError::Configuration(format!("duplicate data source id {}", ds.id)));
            }
        }

        for (plugin_id, plugin) in &self.plugins {
            Url::parse(&plugin.endpoint).map_err(|e| {
                GateError::Configuration(format!("plugin '{}' endpoint is invalid: {}", plugin_id, e))
            })?;
        }

        if let Some(endpoint) = &self.expressions.endpoint {
            Url::parse(endpoint).map_err(|e| {
                GateError::Configuration(format!("expression endpoint is invalid: {}", e))
            })?;
        }

        Ok(())
    }
}

impl DataSourceConfig {
    /// Build the data source model, decoding secure values
    pub fn to_data_source(&self) -> GateResult<DataSource> {
        let mut secure_json_data = HashMap::new();
        for (key, encoded) in &self.secure_json_data {
            let bytes = BASE64_STANDARD.decode(encoded).map_err(|e| {
                GateError::Configuration(format!(
                    "data source '{}' secure field '{}' is not base64: {}",
                    self.uid, key, e
                ))
            })?;
            secure_json_data.insert(key.clone(), bytes);
        }

        let json_data = match &self.json_data {
            serde_json::Value::Null => serde_json::Value::Object(serde_json::Map::new()),
            other => other.clone(),
        };

        Ok(DataSource {
            id: self.id,
            uid: self.uid.clone(),
            org_id: self.org_id,
            name: if self.name.is_empty() { self.uid.clone() } else { self.name.clone() },
            ds_type: self.ds_type.clone(),
            url: self.url.clone(),
            user: self.user.clone(),
            database: self.database.clone(),
            basic_auth: self.basic_auth,
            basic_auth_user: self.basic_auth_user.clone(),
            json_data,
            secure_json_data,
            updated: self.updated.unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        })
    }
}
