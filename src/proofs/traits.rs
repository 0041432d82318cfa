//! Trait abstraction for the chain-of-trust proof capability.
//!
//! Enables mock implementations for unit testing; production nodes inject a
//! real proof system at startup.

use crate::roster::{NodeId, Roster, RosterHash};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type for proof library operations.
pub type ProofResult<T> = Result<T, ProofError>;

/// Proof library errors.
///
/// The only recoverable condition at this layer is "library unavailable":
/// it aborts the current attempt and the controller retries on the next
/// round, since every round re-evaluates from current state.
#[derive(Debug, Clone, Error)]
pub enum ProofError {
    /// The underlying proof library could not service the request.
    #[error("proof library unavailable: {0}")]
    Unavailable(String),
}

/// A completed roster-transition proof.
///
/// The `body` is opaque to this crate; equality and vote aggregation go
/// through `digest`, which the library guarantees is a stable commitment to
/// the transition (source, target, metadata, and the chain of prior proofs).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainProof {
    /// Digest of the roster the proof transitions from.
    pub source_roster_hash: RosterHash,

    /// Digest of the roster the proof transitions to.
    pub target_roster_hash: RosterHash,

    /// Opaque metadata bound into the proof (e.g. a verification key).
    pub metadata: Vec<u8>,

    /// Stable commitment to the whole transition; votes group by this.
    pub digest: [u8; 32],

    /// Scheme-specific proof bytes.
    pub body: Vec<u8>,
}

impl fmt::Display for ChainProof {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "proof-{}", hex::encode(&self.digest[..8]))
    }
}

/// Capability interface for hashing rosters, signing, verification, and
/// transition-proof assembly.
///
/// `prove_transition` may be CPU-heavy (SNARK-like) and MUST only be invoked
/// off the consensus-critical thread; the controller runs it via
/// `tokio::task::spawn_blocking`.
pub trait ProofLibrary: Send + Sync {
    /// Digest a roster.
    fn hash_roster(&self, roster: &Roster) -> RosterHash;

    /// Sign a message with a private key.
    fn sign(&self, message: &[u8], private_key: &[u8]) -> ProofResult<Vec<u8>>;

    /// Verify a signature over a message with a public key.
    fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> bool;

    /// Build the transition proof binding `source_roster` to
    /// `target_roster_hash` with the given metadata, extending
    /// `source_proof` (None only for the genesis transition).
    fn prove_transition(
        &self,
        source_proof: Option<&ChainProof>,
        source_roster: &Roster,
        target_roster_hash: &RosterHash,
        metadata: &[u8],
        signatures: &BTreeMap<NodeId, Vec<u8>>,
    ) -> ProofResult<ChainProof>;
}
