use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::services::service_traits::DataSourceCache;
use crate::utils::{
    config::ServiceConfig,
    error::{DataSourceError, GateResult},
    types::{DataSource, SignedInUser},
};

/// Cache entry for a resolved data source
#[derive(Debug, Clone)]
struct CacheEntry {
    data_source: Arc<DataSource>,
    timestamp: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn new(data_source: Arc<DataSource>, ttl: Duration) -> Self {
        Self {
            data_source,
            timestamp: Instant::now(),
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.timestamp.elapsed() > self.ttl
    }
}

/// In-memory data source store with a TTL cache in front of it
pub struct InMemoryDataSourceCache {
    definitions: DashMap<String, Arc<DataSource>>,
    cache: DashMap<String, CacheEntry>,
    ttl: Duration,
    lookups: AtomicUsize,
    store_reads: AtomicUsize,
}

impl InMemoryDataSourceCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            definitions: DashMap::new(),
            cache: DashMap::new(),
            ttl,
            lookups: AtomicUsize::new(0),
            store_reads: AtomicUsize::new(0),
        }
    }

    /// Build a cache holding every data source of the config
    pub fn from_config(config: &ServiceConfig) -> GateResult<Self> {
        let cache = Self::new(Duration::from_secs(config.cache.ttl_seconds));
        for ds in &config.data_sources {
            cache.upsert(ds.to_data_source()?);
        }
        Ok(cache)
    }

    pub fn with_data_source(self, ds: DataSource) -> Self {
        self.upsert(ds);
        self
    }

    /// Add or replace a definition; cached copies stay until they expire
    pub fn upsert(&self, ds: DataSource) {
        self.definitions.insert(ds.uid.clone(), Arc::new(ds));
    }

    pub fn remove(&self, uid: &str) -> Option<Arc<DataSource>> {
        self.definitions.remove(uid).map(|(_, ds)| ds)
    }

    /// All definitions, ordered by org then id
    pub fn list(&self) -> Vec<Arc<DataSource>> {
        let mut all: Vec<_> = self.definitions.iter().map(|e| e.value().clone()).collect();
        all.sort_by_key(|ds| (ds.org_id, ds.id));
        all
    }

    /// Number of `get_by_*` calls served
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Number of lookups that missed the cache
    pub fn store_read_count(&self) -> usize {
        self.store_reads.load(Ordering::SeqCst)
    }

    fn cached(&self, key: &str, skip_cache: bool) -> Option<Arc<DataSource>> {
        if skip_cache {
            return None;
        }
        let entry = self.cache.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.cache.remove(key);
            return None;
        }
        Some(entry.data_source.clone())
    }

    fn remember(&self, key: String, ds: &Arc<DataSource>) {
        self.cache.insert(key, CacheEntry::new(ds.clone(), self.ttl));
    }

    fn lookup<P>(&self, key: String, user: &SignedInUser, skip_cache: bool, describe: &str, matches: P) -> GateResult<Arc<DataSource>>
    where
        P: Fn(&DataSource) -> bool,
    {
        self.lookups.fetch_add(1, Ordering::SeqCst);

        if let Some(ds) = self.cached(&key, skip_cache) {
            return Ok(ds);
        }

        self.store_reads.fetch_add(1, Ordering::SeqCst);
        debug!(key = %key, skip_cache, "data source cache miss");

        let ds = self
            .definitions
            .iter()
            .find(|e| e.value().org_id == user.org_id && matches(e.value()))
            .map(|e| e.value().clone())
            .ok_or_else(|| DataSourceError::NotFound(describe.to_string()))?;

        self.remember(key, &ds);
        Ok(ds)
    }
}

impl Default for InMemoryDataSourceCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl DataSourceCache for InMemoryDataSourceCache {
    async fn get_by_id(&self, id: i64, user: &SignedInUser, skip_cache: bool) -> GateResult<Arc<DataSource>> {
        let key = format!("ds-{}-{}", user.org_id, id);
        self.lookup(key, user, skip_cache, &format!("id {}", id), |ds| ds.id == id)
    }

    async fn get_by_uid(&self, uid: &str, user: &SignedInUser, skip_cache: bool) -> GateResult<Arc<DataSource>> {
        let key = format!("ds-uid-{}-{}", user.org_id, uid);
        self.lookup(key, user, skip_cache, &format!("uid {}", uid), |ds| ds.uid == uid)
    }
}
