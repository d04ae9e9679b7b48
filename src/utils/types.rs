use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use crate::utils::time_range::TimeRange;

/// Reserved uid of the expression engine pseudo data source
pub const EXPRESSION_DATASOURCE_UID: &str = "__expr__";
/// Uid the expression pseudo data source used before uids were introduced
pub const LEGACY_EXPRESSION_DATASOURCE_UID: &str = "-100";
/// Numeric id of the expression pseudo data source
pub const EXPRESSION_DATASOURCE_ID: i64 = -100;
/// Reserved uid of the built-in metrics data source
pub const METRICS_DATASOURCE_UID: &str = "grafana";
/// Numeric id of the built-in metrics data source
pub const METRICS_DATASOURCE_ID: i64 = -1;
/// Plugin type tag of the built-in metrics data source
pub const METRICS_DATASOURCE_TYPE: &str = "datasource";

/// Incoming batch of queries sharing one time range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryBatchRequest {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub queries: Vec<serde_json::Value>,
}

impl QueryBatchRequest {
    pub fn new(from: &str, to: &str) -> Self {
        Self {
            from: from.to_string(),
            to: to.to_string(),
            queries: Vec::new(),
        }
    }

    pub fn with_query(mut self, query: serde_json::Value) -> Self {
        self.queries.push(query);
        self
    }
}

/// Organisation role of a signed-in user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrgRole {
    Viewer,
    Editor,
    Admin,
}

impl std::fmt::Display for OrgRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrgRole::Viewer => write!(f, "Viewer"),
            OrgRole::Editor => write!(f, "Editor"),
            OrgRole::Admin => write!(f, "Admin"),
        }
    }
}

/// Identity on whose behalf a batch is executed
#[derive(Debug, Clone, PartialEq)]
pub struct SignedInUser {
    pub user_id: i64,
    pub org_id: i64,
    pub login: String,
    pub name: String,
    pub email: String,
    pub org_role: OrgRole,
}

impl SignedInUser {
    pub fn new(user_id: i64, org_id: i64, login: &str) -> Self {
        Self {
            user_id,
            org_id,
            login: login.to_string(),
            name: login.to_string(),
            email: String::new(),
            org_role: OrgRole::Viewer,
        }
    }

    pub fn with_role(mut self, role: OrgRole) -> Self {
        self.org_role = role;
        self
    }
}

/// A configured data source definition
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    pub id: i64,
    pub uid: String,
    pub org_id: i64,
    pub name: String,
    pub ds_type: String,
    pub url: String,
    pub user: String,
    pub database: String,
    pub basic_auth: bool,
    pub basic_auth_user: String,
    pub json_data: serde_json::Value,
    pub secure_json_data: HashMap<String, Vec<u8>>,
    pub updated: DateTime<Utc>,
}

impl DataSource {
    pub fn new(id: i64, uid: &str, ds_type: &str) -> Self {
        Self {
            id,
            uid: uid.to_string(),
            org_id: 1,
            name: uid.to_string(),
            ds_type: ds_type.to_string(),
            url: String::new(),
            user: String::new(),
            database: String::new(),
            basic_auth: false,
            basic_auth_user: String::new(),
            json_data: serde_json::Value::Object(serde_json::Map::new()),
            secure_json_data: HashMap::new(),
            updated: DateTime::<Utc>::UNIX_EPOCH,
        }
    }

    pub fn with_org(mut self, org_id: i64) -> Self {
        self.org_id = org_id;
        self
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = url.to_string();
        self
    }

    pub fn with_json_data(mut self, json_data: serde_json::Value) -> Self {
        self.json_data = json_data;
        self
    }

    pub fn with_secure_value(mut self, key: &str, value: &[u8]) -> Self {
        self.secure_json_data.insert(key.to_string(), value.to_vec());
        self
    }

    /// Synthetic model standing in for the expression engine
    pub fn expression_model() -> Self {
        let mut ds = Self::new(
            EXPRESSION_DATASOURCE_ID,
            EXPRESSION_DATASOURCE_UID,
            EXPRESSION_DATASOURCE_UID,
        );
        ds.name = "Expression".to_string();
        ds.org_id = 0;
        ds
    }

    /// Synthetic model of the built-in metrics source for one org
    pub fn metrics_model(org_id: i64) -> Self {
        let mut ds = Self::new(METRICS_DATASOURCE_ID, METRICS_DATASOURCE_UID, METRICS_DATASOURCE_TYPE);
        ds.name = "-- Grafana --".to_string();
        ds.org_id = org_id;
        ds
    }

    pub fn as_ref_tag(&self) -> DataSourceRef {
        DataSourceRef {
            ds_type: self.ds_type.clone(),
            uid: self.uid.clone(),
        }
    }
}

/// Whether a uid names the expression engine pseudo source
pub fn is_expression_uid(uid: &str) -> bool {
    uid.starts_with(EXPRESSION_DATASOURCE_UID) || uid == LEGACY_EXPRESSION_DATASOURCE_UID
}

/// `{type, uid}` tag attached to expression queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSourceRef {
    #[serde(rename = "type")]
    pub ds_type: String,
    pub uid: String,
}

/// What a raw query points at before resolution
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSourceReference {
    pub uid: Option<String>,
    pub id: Option<i64>,
}

impl DataSourceReference {
    pub fn by_uid(uid: &str) -> Self {
        Self {
            uid: Some(uid.to_string()),
            id: None,
        }
    }

    pub fn by_id(id: i64) -> Self {
        Self { uid: None, id: Some(id) }
    }

    pub fn uid(&self) -> &str {
        self.uid.as_deref().unwrap_or("")
    }

    pub fn id(&self) -> i64 {
        self.id.unwrap_or(0)
    }
}

/// A data source after resolution, tagged by kind
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    Real(Arc<DataSource>),
    Expression(Arc<DataSource>),
    Metrics(Arc<DataSource>),
}

impl ResolvedSource {
    pub fn expression() -> Self {
        ResolvedSource::Expression(Arc::new(DataSource::expression_model()))
    }

    pub fn metrics(org_id: i64) -> Self {
        ResolvedSource::Metrics(Arc::new(DataSource::metrics_model(org_id)))
    }

    pub fn data_source(&self) -> &Arc<DataSource> {
        match self {
            ResolvedSource::Real(ds) | ResolvedSource::Expression(ds) | ResolvedSource::Metrics(ds) => ds,
        }
    }

    pub fn uid(&self) -> &str {
        &self.data_source().uid
    }

    pub fn is_expression(&self) -> bool {
        matches!(self, ResolvedSource::Expression(_))
    }
}

/// One parsed query as handed to a backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataQuery {
    pub ref_id: String,
    pub query_type: String,
    pub max_data_points: i64,
    #[serde(rename = "intervalMs", with = "duration_ms")]
    pub interval: Duration,
    pub time_range: TimeRange,
    #[serde(with = "base64_bytes")]
    pub json: Vec<u8>,
}

/// Plugin-facing view of the signed-in user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginUser {
    pub login: String,
    pub name: String,
    pub email: String,
    pub role: String,
}

impl From<&SignedInUser> for PluginUser {
    fn from(user: &SignedInUser) -> Self {
        Self {
            login: user.login.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.org_role.to_string(),
        }
    }
}

/// Materialised, secret-decrypted configuration of one data source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSourceInstanceSettings {
    pub id: i64,
    pub uid: String,
    pub name: String,
    pub url: String,
    pub user: String,
    pub database: String,
    pub basic_auth_enabled: bool,
    pub basic_auth_user: String,
    #[serde(rename = "jsonData", with = "base64_bytes")]
    pub json_data: Vec<u8>,
    pub decrypted_secure_json_data: HashMap<String, String>,
    pub updated: DateTime<Utc>,
}

/// Context shared by every query of a plugin request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginContext {
    pub org_id: i64,
    pub plugin_id: String,
    pub user: Option<PluginUser>,
    pub data_source_instance_settings: Option<DataSourceInstanceSettings>,
}

/// Single execution request sent to a plugin client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginQueryRequest {
    pub plugin_context: PluginContext,
    pub headers: HashMap<String, String>,
    pub queries: Vec<DataQuery>,
}

/// One query as handed to the expression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionQuery {
    pub ref_id: String,
    #[serde(with = "base64_bytes")]
    pub json: Vec<u8>,
    #[serde(rename = "intervalMs", with = "duration_ms")]
    pub interval: Duration,
    pub max_data_points: i64,
    pub query_type: String,
    pub datasource: DataSourceRef,
    pub time_range: TimeRange,
}

/// Request evaluated by the expression engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpressionRequest {
    pub org_id: i64,
    pub queries: Vec<ExpressionQuery>,
}

/// A single column of a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub values: Vec<serde_json::Value>,
}

/// Columnar result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    pub name: String,
    pub fields: Vec<Field>,
}

impl Frame {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn with_field(mut self, name: &str, values: Vec<serde_json::Value>) -> Self {
        self.fields.push(Field {
            name: name.to_string(),
            labels: BTreeMap::new(),
            values,
        });
        self
    }

    pub fn row_count(&self) -> usize {
        self.fields.first().map(|f| f.values.len()).unwrap_or(0)
    }
}

/// Result of one query within a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataResponse {
    #[serde(default)]
    pub frames: Vec<Frame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Results of a whole batch keyed by reference id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryDataResponse {
    pub responses: BTreeMap<String, DataResponse>,
}

impl QueryDataResponse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, ref_id: &str, response: DataResponse) {
        self.responses.insert(ref_id.to_string(), response);
    }

    pub fn get(&self, ref_id: &str) -> Option<&DataResponse> {
        self.responses.get(ref_id)
    }

    pub fn len(&self) -> usize {
        self.responses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.is_empty()
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

mod base64_bytes {
    use base64::prelude::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_STANDARD.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        BASE64_STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expression_uid_detection() {
        assert!(is_expression_uid("__expr__"));
        assert!(is_expression_uid("__expr__math"));
        assert!(is_expression_uid("-100"));
        assert!(!is_expression_uid("grafana"));
        assert!(!is_expression_uid("expr"));
        assert!(!is_expression_uid(""));
    }

    #[test]
    fn test_metrics_model_is_org_scoped() {
        let ds = DataSource::metrics_model(7);
        assert_eq!(ds.org_id, 7);
        assert_eq!(ds.uid, METRICS_DATASOURCE_UID);
        assert_eq!(ds.ds_type, METRICS_DATASOURCE_TYPE);
    }

    #[test]
    fn test_resolved_source_tags() {
        let real = ResolvedSource::Real(Arc::new(DataSource::new(5, "prom", "prometheus")));
        assert!(!real.is_expression());
        assert_eq!(real.uid(), "prom");

        let expr = ResolvedSource::expression();
        assert!(expr.is_expression());
        assert_eq!(expr.data_source().ds_type, "__expr__");
    }

    #[test]
    fn test_plugin_user_from_signed_in_user() {
        let user = SignedInUser::new(3, 1, "alice").with_role(OrgRole::Editor);
        let plugin_user = PluginUser::from(&user);
        assert_eq!(plugin_user.login, "alice");
        assert_eq!(plugin_user.role, "Editor");
    }

    #[test]
    fn test_data_query_wire_format() {
        let query = DataQuery {
            ref_id: "A".to_string(),
            query_type: String::new(),
            max_data_points: 100,
            interval: Duration::from_millis(1500),
            time_range: TimeRange::new(DateTime::<Utc>::UNIX_EPOCH, DateTime::<Utc>::UNIX_EPOCH),
            json: b"{}".to_vec(),
        };

        let wire = serde_json::to_value(&query).unwrap();
        assert_eq!(wire["refId"], "A");
        assert_eq!(wire["intervalMs"], 1500);
        assert_eq!(wire["json"], "e30=");

        let back: DataQuery = serde_json::from_value(wire).unwrap();
        assert_eq!(back, query);
    }
}
