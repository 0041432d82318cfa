//! Assemblies and the time-ordered signature verification log.
//!
//! An assembly is the exact bundle of (target roster hash, metadata, proof
//! keys) a signature attests to. While proof keys are still arriving,
//! different nodes can sign different assemblies, so verified signatures
//! are grouped by the digest of the assembly each one was checked against.
//!
//! Verification results are keyed by the moment verification *completed*
//! (plus a per-node sequence number for same-millisecond ties). The
//! sufficiency scan walks that order and picks the first assembly whose
//! accumulated valid weight crosses the source quorum threshold. Completion
//! order is node-local: two nodes can pick different assemblies here. That
//! makes this a liveness heuristic deciding *when* to start assembling a
//! candidate proof — final agreement comes only from vote aggregation.

use crate::roster::{NodeId, RosterHash, RosterWeights};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Digest identifying one exact assembly content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssemblyDigest([u8; 32]);

impl AssemblyDigest {
    /// Get bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for AssemblyDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "assembly-{}", hex::encode(&self.0[..8]))
    }
}

/// The content signatures attest to: the target roster, the transition
/// metadata, and the proof keys published so far (in node-id order).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Digest of the roster being transitioned to.
    pub target_roster_hash: RosterHash,

    /// Opaque transition metadata.
    pub metadata: Vec<u8>,

    /// Adopted proof keys of target-roster nodes, in node-id order.
    pub keys: BTreeMap<NodeId, Vec<u8>>,
}

impl Assembly {
    /// Digest of the assembly contents; this is the message nodes sign.
    pub fn digest(&self) -> AssemblyDigest {
        let mut hasher = Sha256::new();
        hasher.update(b"succession-assembly-v1");
        hasher.update(self.target_roster_hash.as_bytes());
        hasher.update((self.metadata.len() as u64).to_be_bytes());
        hasher.update(&self.metadata);
        for (node_id, key) in &self.keys {
            hasher.update(node_id.0.to_be_bytes());
            hasher.update((key.len() as u64).to_be_bytes());
            hasher.update(key);
        }
        AssemblyDigest(hasher.finalize().into())
    }
}

/// Result of asynchronously checking one signature publication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// The node whose signature was checked.
    pub node_id: NodeId,

    /// The checked signature bytes.
    pub signature: Vec<u8>,

    /// Which assembly content the signature was checked against.
    pub assembly: AssemblyDigest,

    /// Whether the signature verified.
    pub is_valid: bool,
}

/// The chosen assembly once sufficient weight supports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SufficientAssembly {
    /// Digest of the winning assembly.
    pub assembly: AssemblyDigest,

    /// Completion timestamp at which the threshold was first crossed.
    pub crossed_at: u64,

    /// Valid signatures over the winning assembly, by node.
    pub signatures: BTreeMap<NodeId, Vec<u8>>,
}

/// Verification results in completion order.
///
/// Transient scratch state, rebuilt whenever a fresh controller replaces an
/// old one; never persisted.
#[derive(Debug, Clone, Default)]
pub struct VerificationLog {
    entries: BTreeMap<(u64, u64), Verification>,
    seen_nodes: HashSet<NodeId>,
    next_seq: u64,
}

impl VerificationLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed verification. Results for a node already in the
    /// log are dropped: one signature per node per construction, so a
    /// second result can only be a stale duplicate.
    pub fn record(&mut self, completed_at: u64, verification: Verification) {
        if !self.seen_nodes.insert(verification.node_id) {
            return;
        }
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert((completed_at, seq), verification);
    }

    /// Whether a node's verification has been recorded.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.seen_nodes.contains(&node_id)
    }

    /// Number of recorded verifications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Scan in completion order, accumulating valid signature weight per
    /// assembly, and return the first assembly to reach the source quorum
    /// threshold, with the valid signatures supporting it.
    ///
    /// Deterministic for a fixed completion order; completion order itself
    /// is node-local (see module docs).
    pub fn first_sufficient(&self, weights: &RosterWeights) -> Option<SufficientAssembly> {
        let threshold = weights.source_weight_threshold();
        let mut accumulated: HashMap<AssemblyDigest, u64> = HashMap::new();

        for (&(completed_at, _), verification) in &self.entries {
            if !verification.is_valid {
                continue;
            }
            let weight = weights.source_weight_of(verification.node_id);
            if weight == 0 {
                continue;
            }
            let total = accumulated.entry(verification.assembly).or_insert(0);
            *total += weight;
            if *total >= threshold {
                let assembly = verification.assembly;
                return Some(SufficientAssembly {
                    assembly,
                    crossed_at: completed_at,
                    signatures: self.valid_signatures_for(assembly),
                });
            }
        }
        None
    }

    /// All valid signatures recorded for one assembly, by node.
    fn valid_signatures_for(&self, assembly: AssemblyDigest) -> BTreeMap<NodeId, Vec<u8>> {
        self.entries
            .values()
            .filter(|v| v.is_valid && v.assembly == assembly)
            .map(|v| (v.node_id, v.signature.clone()))
            .collect()
    }
}
