//! Submission gateway: fire-and-forget transaction submission.
//!
//! Unlike interactive APIs where transient failures are retried with
//! backoff, construction submissions are never retried by this crate:
//! every consensus round re-evaluates from current state and resubmits
//! whatever is still missing, so a retry loop here would only duplicate
//! traffic. Failures are logged and dropped.

pub mod mock;
pub mod traits;

pub use mock::MockGateway;
pub use traits::{GatewayError, GatewayResult, SubmissionGateway};

use std::future::Future;
use tokio::task::JoinHandle;
use tracing::warn;

/// Spawn a submission without waiting for it. The returned handle lets
/// tests await the submission; production callers drop it.
pub fn spawn_submission<F>(label: &'static str, fut: F) -> JoinHandle<()>
where
    F: Future<Output = GatewayResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = fut.await {
            warn!(label, error = %err, "submission failed, will resubmit on a later round");
        }
    })
}
