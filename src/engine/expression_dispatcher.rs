use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::engine::batch_classifier::ParsedRequest;
use crate::services::ExpressionEngine;
use crate::utils::{
    cancel::with_cancellation,
    error::{DispatchError, GateError, GateResult},
    types::{ExpressionQuery, ExpressionRequest, QueryDataResponse, SignedInUser},
};

/// Hands batches containing expressions to the expression engine
#[derive(Clone)]
pub struct ExpressionDispatcher {
    engine: Arc<dyn ExpressionEngine>,
}

impl ExpressionDispatcher {
    pub fn new(engine: Arc<dyn ExpressionEngine>) -> Self {
        Self { engine }
    }

    /// Translate a parsed batch into an expression engine request
    pub fn build_request(user: &SignedInUser, parsed: &ParsedRequest) -> GateResult<ExpressionRequest> {
        let queries = parsed
            .queries()
            .iter()
            .map(|pq| {
                let source = pq.source.as_ref().ok_or_else(|| {
                    GateError::bad_query(format!("query missing datasource info: {}", pq.query.ref_id))
                })?;

                Ok(ExpressionQuery {
                    ref_id: pq.query.ref_id.clone(),
                    json: pq.query.json.clone(),
                    interval: pq.query.interval,
                    max_data_points: pq.query.max_data_points,
                    query_type: pq.query.query_type.clone(),
                    datasource: source.data_source().as_ref_tag(),
                    time_range: pq.query.time_range,
                })
            })
            .collect::<GateResult<Vec<_>>>()?;

        Ok(ExpressionRequest {
            org_id: user.org_id,
            queries,
        })
    }

    #[instrument(skip_all, fields(org_id = user.org_id, queries = parsed.len()))]
    pub async fn dispatch(
        &self,
        cancel: &CancellationToken,
        user: &SignedInUser,
        parsed: &ParsedRequest,
    ) -> GateResult<QueryDataResponse> {
        let request = Self::build_request(user, parsed)?;

        match with_cancellation(cancel, self.engine.transform(request)).await {
            Ok(response) => Ok(response),
            Err(GateError::Cancelled) => Err(GateError::Cancelled),
            Err(e) => Err(DispatchError::Expression(Box::new(e)).into()),
        }
    }
}
