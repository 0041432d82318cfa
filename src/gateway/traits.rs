//! Trait abstraction for network transaction submission.
//!
//! Enables mock implementations for unit testing; production nodes inject
//! their transaction pipeline.

use crate::proofs::ChainProof;
use crate::store::{ProofKeyPublication, SignaturePublication};
use async_trait::async_trait;
use thiserror::Error;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Submission errors. All transient from the protocol's point of view:
/// every consensus round re-evaluates what still needs submitting.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// The network layer rejected or dropped the submission.
    #[error("submission failed: {0}")]
    Network(String),
}

/// Fire-and-forget submission of construction transactions to the network.
///
/// Failures are logged with the failing message and a reason, never retried
/// automatically by this crate — a later round resubmits if the state still
/// calls for it.
#[async_trait]
pub trait SubmissionGateway: Send + Sync {
    /// Submit the local node's proof key publication.
    async fn submit_proof_key_publication(
        &self,
        publication: ProofKeyPublication,
    ) -> GatewayResult<()>;

    /// Submit the local node's signature over an assembly.
    async fn submit_assembly_signature(
        &self,
        construction_id: u64,
        publication: SignaturePublication,
    ) -> GatewayResult<()>;

    /// Submit the local node's vote for a candidate proof.
    async fn submit_proof_vote(&self, construction_id: u64, proof: ChainProof)
        -> GatewayResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_error_display() {
        let err = GatewayError::Network("connection reset".to_string());
        assert_eq!(format!("{}", err), "submission failed: connection reset");
    }
}
