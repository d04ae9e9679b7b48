use async_trait::async_trait;
use std::collections::HashMap;

use crate::services::service_traits::SecretsService;
use crate::utils::error::{GateError, GateResult};

/// Secrets service for deployments that store secure values unencrypted.
///
/// Every value must be valid UTF-8; anything else is reported as a
/// decryption failure.
#[derive(Debug, Clone, Default)]
pub struct PlaintextSecretsService;

impl PlaintextSecretsService {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SecretsService for PlaintextSecretsService {
    async fn decrypt_json_data(&self, secure: &HashMap<String, Vec<u8>>) -> GateResult<HashMap<String, String>> {
        secure
            .iter()
            .map(|(key, value)| {
                String::from_utf8(value.clone())
                    .map(|plain| (key.clone(), plain))
                    .map_err(|_| GateError::Internal(format!("secure field '{}' could not be decrypted", key)))
            })
            .collect()
    }
}
