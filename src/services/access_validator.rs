use std::collections::HashMap;
use url::Url;

use crate::services::service_traits::AccessValidator;
use crate::utils::error::{GateError, GateResult};

/// Allows data source URLs whose host appears on an allow-list
#[derive(Debug, Clone, Default)]
pub struct HostAllowListValidator {
    allowed_hosts: Vec<String>,
}

impl HostAllowListValidator {
    /// An empty list allows every host
    pub fn new(allowed_hosts: Vec<String>) -> Self {
        Self {
            allowed_hosts: allowed_hosts
                .into_iter()
                .map(|h| h.trim().to_ascii_lowercase())
                .filter(|h| !h.is_empty())
                .collect(),
        }
    }

    pub fn allow_all() -> Self {
        Self::default()
    }

    fn is_allowed(&self, url: &Url) -> bool {
        let Some(host) = url.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        let host_port = url
            .port_or_known_default()
            .map(|port| format!("{}:{}", host, port));

        self.allowed_hosts
            .iter()
            .any(|entry| *entry == host || Some(entry) == host_port.as_ref())
    }
}

impl AccessValidator for HostAllowListValidator {
    fn validate(&self, url: &str, _headers: Option<&HashMap<String, String>>) -> GateResult<()> {
        if self.allowed_hosts.is_empty() {
            return Ok(());
        }

        let parsed = Url::parse(url).map_err(|_| GateError::AccessDenied)?;
        if self.is_allowed(&parsed) {
            Ok(())
        } else {
            Err(GateError::AccessDenied)
        }
    }
}
