//! The construction entity and its per-node publication records.

use crate::proofs::ChainProof;
use crate::roster::{NodeId, RosterHash};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One in-progress or completed roster-transition proof process.
///
/// Exactly two construction slots exist in the store at any time (`active`
/// and `next`); the empty sentinel (`id == 0`, zero hashes) represents
/// "none". A construction is complete once `target_proof` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Construction {
    /// Monotonically increasing identifier, unique across active/next.
    pub id: u64,

    /// Digest of the roster transitioning from (zero at genesis).
    pub source_roster_hash: RosterHash,

    /// Digest of the roster transitioning to.
    pub target_roster_hash: RosterHash,

    /// End of the window in which target nodes may still publish proof keys
    /// before assembly proceeds without them (Unix milliseconds).
    pub grace_period_end: u64,

    /// When the assembly contents were fixed and signature collection began.
    pub assembly_start_time: Option<u64>,

    /// The finalized transition proof; set exactly once.
    pub target_proof: Option<ChainProof>,
}

impl Construction {
    /// The empty sentinel: no construction.
    pub fn sentinel() -> Self {
        Self {
            id: 0,
            source_roster_hash: RosterHash::zero(),
            target_roster_hash: RosterHash::zero(),
            grace_period_end: 0,
            assembly_start_time: None,
            target_proof: None,
        }
    }

    /// Whether this is the empty sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.id == 0
    }

    /// Whether the finalized proof has been recorded.
    pub fn is_complete(&self) -> bool {
        self.target_proof.is_some()
    }

    /// Whether this construction is for the given roster pair.
    pub fn matches_pair(&self, source: &RosterHash, target: &RosterHash) -> bool {
        !self.is_sentinel()
            && self.source_roster_hash == *source
            && self.target_roster_hash == *target
    }

    /// The finalized proof.
    ///
    /// # Panics
    ///
    /// Panics if the construction is not complete; callers reach here only
    /// after observing completion, so a missing proof is state corruption.
    pub fn expect_target_proof(&self) -> &ChainProof {
        self.target_proof
            .as_ref()
            .unwrap_or_else(|| panic!("construction {} has no target proof", self.id))
    }
}

impl fmt::Display for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_sentinel() {
            write!(f, "construction-none")
        } else {
            write!(f, "construction-{}", self.id)
        }
    }
}

/// A node's proof key publication as seen by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofKeyPublication {
    /// Publishing node.
    pub node_id: NodeId,

    /// The published public proof key.
    pub key: Vec<u8>,

    /// When the key was adopted (Unix milliseconds).
    pub published_at: u64,
}

/// A node's signature over an assembly, one per node per construction
/// (first write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignaturePublication {
    /// Signing node.
    pub node_id: NodeId,

    /// Signature bytes over the assembly digest the signer saw.
    pub signature: Vec<u8>,

    /// When the node signed (Unix milliseconds).
    pub signing_time: u64,
}

/// A node's vote for a candidate proof, one per node per construction
/// (last write wins).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofVote {
    /// Voting node.
    pub node_id: NodeId,

    /// The candidate proof this node supports.
    pub proof: ChainProof,
}
