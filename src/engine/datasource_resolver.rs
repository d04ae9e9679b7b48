use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::services::DataSourceCache;
use crate::utils::{
    cancel::with_cancellation,
    error::{GateError, GateResult},
    types::{is_expression_uid, DataSourceReference, ResolvedSource, SignedInUser, METRICS_DATASOURCE_UID},
};

/// Maps data source references to concrete definitions
#[derive(Clone)]
pub struct DataSourceResolver {
    cache: Arc<dyn DataSourceCache>,
}

impl DataSourceResolver {
    pub fn new(cache: Arc<dyn DataSourceCache>) -> Self {
        Self { cache }
    }

    /// Start resolving the references of one batch
    pub fn for_batch<'a>(
        &'a self,
        user: &'a SignedInUser,
        skip_cache: bool,
        cancel: &'a CancellationToken,
    ) -> BatchResolution<'a> {
        BatchResolution {
            cache: self.cache.as_ref(),
            user,
            skip_cache,
            cancel,
            memo: HashMap::new(),
        }
    }
}

/// Resolution state scoped to a single batch.
///
/// Holds the memo of data sources already seen in the batch, keyed by uid.
pub struct BatchResolution<'a> {
    cache: &'a dyn DataSourceCache,
    user: &'a SignedInUser,
    skip_cache: bool,
    cancel: &'a CancellationToken,
    memo: HashMap<String, ResolvedSource>,
}

impl<'a> BatchResolution<'a> {
    pub async fn resolve(&mut self, reference: &DataSourceReference) -> GateResult<ResolvedSource> {
        let uid = reference.uid();

        if let Some(hit) = self.memo.get(uid) {
            return Ok(hit.clone());
        }

        let resolved = if is_expression_uid(uid) {
            ResolvedSource::expression()
        } else if uid == METRICS_DATASOURCE_UID {
            ResolvedSource::metrics(self.user.org_id)
        } else if reference.id() > 0 {
            let ds = with_cancellation(
                self.cancel,
                self.cache.get_by_id(reference.id(), self.user, self.skip_cache),
            )
            .await?;
            ResolvedSource::Real(ds)
        } else if !uid.is_empty() {
            let ds = with_cancellation(self.cancel, self.cache.get_by_uid(uid, self.user, self.skip_cache)).await?;
            ResolvedSource::Real(ds)
        } else {
            return Err(GateError::bad_query("missing data source ID/UID"));
        };

        self.memo.insert(resolved.uid().to_string(), resolved.clone());
        Ok(resolved)
    }

    /// Distinct uids resolved so far
    pub fn distinct_sources(&self) -> usize {
        self.memo.len()
    }
}
