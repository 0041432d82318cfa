//! Roster types for weighted committee transitions.
//!
//! A roster is the weighted set of nodes participating in one network epoch.
//! Every proof construction binds a source roster (the committee handing
//! off) to a target roster (the committee taking over). `RosterWeights` is
//! the immutable per-transition view the controller consults for quorum
//! arithmetic.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Node identifier, unique across the network.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Roster digest (32 bytes), produced by the proof library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct RosterHash([u8; 32]);

impl RosterHash {
    /// Create from bytes. Panics if fewer than 32 bytes are supplied.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes[..32]);
        Self(hash)
    }

    /// Get bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The all-zero hash used by the sentinel construction.
    pub fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Whether this is the all-zero sentinel hash.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl fmt::Display for RosterHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// One weighted roster member.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RosterEntry {
    /// Node identifier.
    pub node_id: NodeId,

    /// Consensus weight of this node (stake-derived, opaque to this crate).
    pub weight: u64,
}

/// A weighted set of participating nodes for one epoch.
///
/// Entries are kept sorted by node id so that iteration order, hashing, and
/// weight scans are deterministic across nodes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Roster {
    entries: Vec<RosterEntry>,
}

impl Roster {
    /// Build a roster from entries. Entries are sorted by node id and
    /// duplicate node ids keep the last weight supplied.
    pub fn new(mut entries: Vec<RosterEntry>) -> Self {
        entries.sort_by_key(|e| e.node_id);
        entries.dedup_by_key(|e| e.node_id);
        Self { entries }
    }

    /// An empty roster (used for the genesis transition's source side).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the roster has no members.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate entries in node-id order.
    pub fn entries(&self) -> impl Iterator<Item = &RosterEntry> {
        self.entries.iter()
    }

    /// All node ids, in node-id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.entries.iter().map(|e| e.node_id).collect()
    }

    /// Weight of a member, or None if the node is not in the roster.
    pub fn weight_of(&self, node_id: NodeId) -> Option<u64> {
        self.entries
            .binary_search_by_key(&node_id, |e| e.node_id)
            .ok()
            .map(|i| self.entries[i].weight)
    }

    /// Whether the node is a member.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.weight_of(node_id).is_some()
    }

    /// Sum of all member weights.
    pub fn total_weight(&self) -> u64 {
        self.entries.iter().map(|e| e.weight).sum()
    }
}

/// Immutable weight view over one (source roster, target roster) transition.
///
/// Owned by the controller for its lifetime. All quorum checks in the
/// construction protocol go through this type so the threshold arithmetic
/// lives in exactly one place.
#[derive(Debug, Clone)]
pub struct RosterWeights {
    source: BTreeMap<NodeId, u64>,
    target: BTreeMap<NodeId, u64>,
    total_source_weight: u64,
    total_target_weight: u64,
}

impl RosterWeights {
    /// Build the weight view for a transition.
    pub fn new(source: &Roster, target: &Roster) -> Self {
        let source_map: BTreeMap<NodeId, u64> =
            source.entries().map(|e| (e.node_id, e.weight)).collect();
        let target_map: BTreeMap<NodeId, u64> =
            target.entries().map(|e| (e.node_id, e.weight)).collect();
        let total_source_weight = source_map.values().sum();
        let total_target_weight = target_map.values().sum();
        Self {
            source: source_map,
            target: target_map,
            total_source_weight,
            total_target_weight,
        }
    }

    /// Weight of a node in the source roster (0 if absent).
    pub fn source_weight_of(&self, node_id: NodeId) -> u64 {
        self.source.get(&node_id).copied().unwrap_or(0)
    }

    /// Weight of a node in the target roster (0 if absent).
    pub fn target_weight_of(&self, node_id: NodeId) -> u64 {
        self.target.get(&node_id).copied().unwrap_or(0)
    }

    /// Total source roster weight.
    pub fn total_source_weight(&self) -> u64 {
        self.total_source_weight
    }

    /// Total target roster weight.
    pub fn total_target_weight(&self) -> u64 {
        self.total_target_weight
    }

    /// Source node ids in node-id order.
    pub fn source_node_ids(&self) -> Vec<NodeId> {
        self.source.keys().copied().collect()
    }

    /// Target node ids in node-id order.
    pub fn target_node_ids(&self) -> Vec<NodeId> {
        self.target.keys().copied().collect()
    }

    /// Smallest weight sum strictly exceeding 1/3 of total source weight.
    ///
    /// With at most 1/3 of weight Byzantine, two conflicting values cannot
    /// both gather this much honest support, so at most one candidate proof
    /// can ever be selected.
    pub fn source_weight_threshold(&self) -> u64 {
        self.total_source_weight / 3 + 1
    }

    /// Smallest weight sum strictly exceeding 1/3 of total target weight.
    pub fn target_weight_threshold(&self) -> u64 {
        self.total_target_weight / 3 + 1
    }

    /// Smallest weight sum strictly exceeding 2/3 of total source weight.
    pub fn source_strong_threshold(&self) -> u64 {
        self.total_source_weight * 2 / 3 + 1
    }
}

/// Roster lifecycle phase driving store and registry behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RosterPhase {
    /// Network start: no previous roster exists yet.
    Bootstrap,

    /// A target roster has been announced; the transition proof is being built.
    Transition,

    /// The target roster is becoming the current one; stale state is purged.
    Handoff,
}

/// One roster lifecycle event: the phase plus the rosters it concerns.
///
/// Hashes are computed once, at construction, so the store and controller
/// never need the proof library for lookups.
#[derive(Debug, Clone)]
pub struct RosterTransition {
    /// Current lifecycle phase.
    pub phase: RosterPhase,

    /// The committee transitioning from (empty at genesis).
    pub source: Roster,

    /// The committee transitioning to.
    pub target: Roster,

    /// Digest of the source roster.
    pub source_hash: RosterHash,

    /// Digest of the target roster.
    pub target_hash: RosterHash,
}

impl RosterTransition {
    /// Build a transition event, hashing both rosters with the given library.
    pub fn new(
        phase: RosterPhase,
        source: Roster,
        target: Roster,
        library: &dyn crate::proofs::ProofLibrary,
    ) -> Self {
        let source_hash = if source.is_empty() {
            RosterHash::zero()
        } else {
            library.hash_roster(&source)
        };
        let target_hash = library.hash_roster(&target);
        Self {
            phase,
            source,
            target,
            source_hash,
            target_hash,
        }
    }
}
