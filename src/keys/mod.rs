//! Proof key registry with construction-boundary rotation.
//!
//! Each node owns at most one `ProofKeySet`: the currently-adopted public
//! proof key plus an optional staged replacement. A staged key only becomes
//! the adopted key when a construction boundary is crossed, so an assembly
//! in flight never sees a key change under it.
//!
//! Rotation is applied eagerly by the store when a new construction is
//! created (`rotate_pending`), and lazily on read (`get_or_rotate`) for
//! nodes that were not part of that boundary's target roster.

use crate::roster::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// A node's proof key material as tracked by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofKeySet {
    /// Currently usable public proof key.
    pub key: Vec<u8>,

    /// When `key` was adopted (Unix milliseconds).
    pub adoption_time: u64,

    /// Replacement key staged for the next construction boundary.
    pub next_key: Option<Vec<u8>>,

    /// When `next_key` was staged (Unix milliseconds).
    pub staged_at: u64,
}

impl ProofKeySet {
    fn adopted_now(key: Vec<u8>, now: u64) -> Self {
        Self {
            key,
            adoption_time: now,
            next_key: None,
            staged_at: now,
        }
    }

    fn rotate(&mut self, boundary_at: u64) {
        if let Some(next) = self.next_key.take() {
            self.key = next;
            self.adoption_time = boundary_at;
        }
    }
}

/// Tracks every node's adopted and staged proof keys.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeyRegistry {
    sets: BTreeMap<NodeId, ProofKeySet>,

    /// Timestamp of the most recent construction boundary. Staged keys older
    /// than this are due for rotation on the next read.
    last_boundary_at: u64,
}

impl KeyRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the node's key set, first applying any rotation that became
    /// due at a construction boundary since the key was staged.
    pub fn get_or_rotate(&mut self, node_id: NodeId, _now: u64) -> Option<ProofKeySet> {
        let boundary = self.last_boundary_at;
        let set = self.sets.get_mut(&node_id)?;
        if set.next_key.is_some() && set.staged_at < boundary {
            set.rotate(boundary);
            debug!(%node_id, "rotated staged proof key at read");
        }
        Some(set.clone())
    }

    /// Record a key publication.
    ///
    /// A node's first-ever key is adopted immediately; later publications
    /// are staged as `next_key` and wait for a construction boundary.
    /// Returns whether this was the node's first key.
    pub fn set_key(&mut self, node_id: NodeId, new_key: Vec<u8>, now: u64) -> bool {
        match self.sets.get_mut(&node_id) {
            None => {
                self.sets
                    .insert(node_id, ProofKeySet::adopted_now(new_key, now));
                true
            }
            Some(set) => {
                set.next_key = Some(new_key);
                set.staged_at = now;
                false
            }
        }
    }

    /// Apply the construction boundary: stage-rotate every listed node's
    /// pending key and record the boundary for lazy rotation of the rest.
    pub fn rotate_pending(&mut self, node_ids: &[NodeId], now: u64) {
        self.last_boundary_at = now;
        for node_id in node_ids {
            if let Some(set) = self.sets.get_mut(node_id) {
                if set.next_key.is_some() && set.staged_at < now {
                    set.rotate(now);
                    debug!(node_id = %node_id, "rotated staged proof key at boundary");
                }
            }
        }
    }

    /// Delete a node's key set. Only called when a node has left every
    /// active roster.
    pub fn remove(&mut self, node_id: NodeId) {
        self.sets.remove(&node_id);
    }

    /// Whether the node has any key set at all.
    pub fn contains(&self, node_id: NodeId) -> bool {
        self.sets.contains_key(&node_id)
    }

    /// Node ids with a registered key set, in id order.
    pub fn node_ids(&self) -> Vec<NodeId> {
        self.sets.keys().copied().collect()
    }

    pub(crate) fn snapshot_parts(&self) -> (BTreeMap<NodeId, ProofKeySet>, u64) {
        (self.sets.clone(), self.last_boundary_at)
    }

    pub(crate) fn from_snapshot_parts(
        sets: BTreeMap<NodeId, ProofKeySet>,
        last_boundary_at: u64,
    ) -> Self {
        Self {
            sets,
            last_boundary_at,
        }
    }
}
