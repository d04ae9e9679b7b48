use std::future::Future;
use tokio_util::sync::CancellationToken;

use crate::utils::error::{GateError, GateResult};

/// Race a collaborator call against the request's cancellation token.
///
/// Cancellation wins ties.
pub async fn with_cancellation<T, F>(cancel: &CancellationToken, call: F) -> GateResult<T>
where
    F: Future<Output = GateResult<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GateError::Cancelled),
        result = call => result,
    }
}
