//! Recording mock gateway for tests.

use super::traits::{GatewayError, GatewayResult, SubmissionGateway};
use crate::proofs::ChainProof;
use crate::store::{ProofKeyPublication, SignaturePublication};
use async_trait::async_trait;
use std::sync::Mutex;

/// Everything a test run submitted, in order.
#[derive(Debug, Default)]
pub struct SubmittedRecords {
    /// Key publications submitted.
    pub key_publications: Vec<ProofKeyPublication>,

    /// Assembly signatures submitted, with their construction id.
    pub signatures: Vec<(u64, SignaturePublication)>,

    /// Votes submitted, with their construction id.
    pub votes: Vec<(u64, ChainProof)>,
}

/// Mock gateway that records submissions; optionally fails everything.
#[derive(Debug, Default)]
pub struct MockGateway {
    records: Mutex<SubmittedRecords>,
    fail_all: bool,
}

impl MockGateway {
    /// Gateway that accepts and records every submission.
    pub fn new() -> Self {
        Self::default()
    }

    /// Gateway that fails every submission with a network error.
    pub fn failing() -> Self {
        Self {
            records: Mutex::new(SubmittedRecords::default()),
            fail_all: true,
        }
    }

    /// Run a closure over the recorded submissions.
    pub fn with_records<R>(&self, f: impl FnOnce(&SubmittedRecords) -> R) -> R {
        f(&self.records.lock().expect("records lock poisoned"))
    }

    fn check(&self) -> GatewayResult<()> {
        if self.fail_all {
            return Err(GatewayError::Network("mock gateway failing".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubmissionGateway for MockGateway {
    async fn submit_proof_key_publication(
        &self,
        publication: ProofKeyPublication,
    ) -> GatewayResult<()> {
        self.check()?;
        self.records
            .lock()
            .expect("records lock poisoned")
            .key_publications
            .push(publication);
        Ok(())
    }

    async fn submit_assembly_signature(
        &self,
        construction_id: u64,
        publication: SignaturePublication,
    ) -> GatewayResult<()> {
        self.check()?;
        self.records
            .lock()
            .expect("records lock poisoned")
            .signatures
            .push((construction_id, publication));
        Ok(())
    }

    async fn submit_proof_vote(
        &self,
        construction_id: u64,
        proof: ChainProof,
    ) -> GatewayResult<()> {
        self.check()?;
        self.records
            .lock()
            .expect("records lock poisoned")
            .votes
            .push((construction_id, proof));
        Ok(())
    }
}
