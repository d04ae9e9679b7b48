use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::utils::{
    error::{DispatchError, GateError, GateResult},
    types::{PluginQueryRequest, QueryDataResponse},
};

/// Executes queries against one kind of data source backend
#[async_trait]
pub trait PluginClient: Send + Sync {
    async fn query_data(&self, request: PluginQueryRequest) -> GateResult<QueryDataResponse>;
}

/// Plugin clients keyed by data source type tag.
///
/// The registry is itself a `PluginClient` that forwards each request to the
/// client registered for `plugin_context.plugin_id`.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    clients: HashMap<String, Arc<dyn PluginClient>>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    /// Register a client for a type tag
    pub fn register(&mut self, plugin_id: &str, client: Arc<dyn PluginClient>) -> GateResult<()> {
        if self.clients.contains_key(plugin_id) {
            return Err(GateError::Configuration(format!(
                "plugin '{}' is already registered",
                plugin_id
            )));
        }

        self.clients.insert(plugin_id.to_string(), client);
        Ok(())
    }

    /// Builder-style registration
    pub fn with_plugin(mut self, plugin_id: &str, client: Arc<dyn PluginClient>) -> GateResult<Self> {
        self.register(plugin_id, client)?;
        Ok(self)
    }

    pub fn get(&self, plugin_id: &str) -> Option<&Arc<dyn PluginClient>> {
        self.clients.get(plugin_id)
    }

    pub fn contains(&self, plugin_id: &str) -> bool {
        self.clients.contains_key(plugin_id)
    }

    /// Registered type tags, sorted
    pub fn list_plugins(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.clients.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl PluginClient for PluginRegistry {
    async fn query_data(&self, request: PluginQueryRequest) -> GateResult<QueryDataResponse> {
        let plugin_id = request.plugin_context.plugin_id.clone();
        let client = self
            .clients
            .get(&plugin_id)
            .ok_or(DispatchError::UnknownPlugin(plugin_id))?;

        client.query_data(request).await
    }
}
