//! Construction store: the single source of truth for proof construction
//! state.
//!
//! Exactly two construction slots exist (`active` and `next`) plus three
//! keyed collections: proof key sets by node, signature publications by
//! (construction, node), and votes by (construction, node). A separate
//! singleton holds the network-wide ledger id, written once at genesis.
//!
//! The store is the only component permitted to mutate persisted state.
//! Controllers hold working copies and scratch state; they write back
//! through the operations here. All writes are driven by the single
//! consensus-round thread, so no internal locking is needed.
//!
//! Updates addressed at a construction id matching neither slot are
//! programming errors upstream and panic rather than being retried.

pub mod construction;
pub mod snapshot;

#[cfg(test)]
mod proptests;

pub use construction::{Construction, ProofKeyPublication, ProofVote, SignaturePublication};
pub use snapshot::StoreSnapshot;

use crate::config::ProtocolConfig;
use crate::keys::KeyRegistry;
use crate::proofs::ChainProof;
use crate::roster::{NodeId, RosterHash, RosterPhase, RosterTransition};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, info};

/// Result type for store accessors.
pub type StoreResult<T> = Result<T, StoreError>;

/// Store accessor errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The active construction has no completed proof yet.
    #[error("active construction has no completed proof")]
    NotComplete,

    /// Caller-supplied metadata does not match the completed proof.
    #[error("metadata mismatch: completed proof was built over different metadata")]
    MetadataMismatch,
}

/// Durable construction state: two slots, three keyed collections, and the
/// ledger id singleton.
#[derive(Debug, Clone)]
pub struct ConstructionStore {
    active: Construction,
    next: Construction,
    keys: KeyRegistry,
    signatures: BTreeMap<u64, BTreeMap<NodeId, SignaturePublication>>,
    votes: BTreeMap<u64, BTreeMap<NodeId, ProofVote>>,
    ledger_id: Option<Vec<u8>>,
}

impl Default for ConstructionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConstructionStore {
    /// Create an empty store: both slots hold the sentinel.
    pub fn new() -> Self {
        Self {
            active: Construction::sentinel(),
            next: Construction::sentinel(),
            keys: KeyRegistry::new(),
            signatures: BTreeMap::new(),
            votes: BTreeMap::new(),
            ledger_id: None,
        }
    }

    // ── Read side ──────────────────────────────────────────────────────────

    /// The active construction (sentinel if none).
    pub fn get_active(&self) -> &Construction {
        &self.active
    }

    /// The next construction (sentinel if none).
    pub fn get_next(&self) -> &Construction {
        &self.next
    }

    /// The construction for a roster pair, if either slot matches.
    pub fn get_for_roster_pair(
        &self,
        source: &RosterHash,
        target: &RosterHash,
    ) -> Option<&Construction> {
        if self.active.matches_pair(source, target) {
            Some(&self.active)
        } else if self.next.matches_pair(source, target) {
            Some(&self.next)
        } else {
            None
        }
    }

    /// Votes recorded for a construction, restricted to the given nodes.
    pub fn get_votes(&self, construction_id: u64, node_ids: &[NodeId]) -> BTreeMap<NodeId, ProofVote> {
        let Some(by_node) = self.votes.get(&construction_id) else {
            return BTreeMap::new();
        };
        node_ids
            .iter()
            .filter_map(|id| by_node.get(id).map(|vote| (*id, vote.clone())))
            .collect()
    }

    /// Current adopted proof keys for the given nodes, applying any pending
    /// rotation that became due at a construction boundary.
    pub fn get_key_publications(
        &mut self,
        node_ids: &[NodeId],
        now: u64,
    ) -> Vec<ProofKeyPublication> {
        node_ids
            .iter()
            .filter_map(|&node_id| {
                self.keys.get_or_rotate(node_id, now).map(|set| ProofKeyPublication {
                    node_id,
                    key: set.key,
                    published_at: set.adoption_time,
                })
            })
            .collect()
    }

    /// Signature publications recorded for a construction, restricted to
    /// the given nodes, in node-id order.
    pub fn get_signature_publications(
        &self,
        construction_id: u64,
        node_ids: &[NodeId],
    ) -> Vec<SignaturePublication> {
        let Some(by_node) = self.signatures.get(&construction_id) else {
            return Vec::new();
        };
        node_ids
            .iter()
            .filter_map(|id| by_node.get(id).cloned())
            .collect()
    }

    /// The ledger id, if genesis has completed.
    pub fn ledger_id(&self) -> Option<&[u8]> {
        self.ledger_id.as_deref()
    }

    /// The active construction's completed proof, checked against the
    /// caller's expected metadata.
    pub fn current_proof(&self, metadata: &[u8]) -> StoreResult<&ChainProof> {
        let proof = self.active.target_proof.as_ref().ok_or(StoreError::NotComplete)?;
        if proof.metadata != metadata {
            return Err(StoreError::MetadataMismatch);
        }
        Ok(proof)
    }

    // ── Write side ─────────────────────────────────────────────────────────

    /// The construction for the transition's roster pair, creating one if
    /// neither slot matches.
    ///
    /// A new construction gets id `max(active.id, next.id) + 1` and a key
    /// grace window from `config`. It lands in `active` when that slot is
    /// empty; otherwise it replaces `next` (purging the superseded
    /// construction's votes and signatures first). Creating a construction
    /// is a boundary: staged proof keys for target-roster nodes rotate.
    ///
    /// # Panics
    ///
    /// Panics if called during the handoff phase — constructions are only
    /// created while a transition is announced, never mid-handoff.
    pub fn get_or_create_construction(
        &mut self,
        transition: &RosterTransition,
        now: u64,
        config: &ProtocolConfig,
    ) -> Construction {
        assert!(
            transition.phase != RosterPhase::Handoff,
            "cannot create a construction during roster handoff"
        );

        if let Some(existing) =
            self.get_for_roster_pair(&transition.source_hash, &transition.target_hash)
        {
            return existing.clone();
        }

        let construction = Construction {
            id: self.active.id.max(self.next.id) + 1,
            source_roster_hash: transition.source_hash,
            target_roster_hash: transition.target_hash,
            grace_period_end: now + config.proof_key_grace_ms(),
            assembly_start_time: None,
            target_proof: None,
        };

        if self.active.is_sentinel() {
            info!(construction = %construction, "installing active construction");
            self.active = construction.clone();
        } else {
            if !self.next.is_sentinel() {
                let superseded = self.next.id;
                self.signatures.remove(&superseded);
                self.votes.remove(&superseded);
                debug!(construction_id = superseded, "purged superseded next construction");
            }
            info!(construction = %construction, "staging next construction");
            self.next = construction.clone();
        }

        self.keys.rotate_pending(&transition.target.node_ids(), now);
        construction
    }

    /// Record a node's proof key. Returns whether this was the node's
    /// first-ever key (immediately adopted, no rotation needed).
    pub fn set_proof_key(&mut self, node_id: NodeId, key: Vec<u8>, now: u64) -> bool {
        self.keys.set_key(node_id, key, now)
    }

    /// Fix the assembly start time for a construction, if not already set.
    pub fn set_assembly_time(&mut self, construction_id: u64, now: u64) -> Construction {
        let slot = self.slot_mut(construction_id);
        if slot.assembly_start_time.is_none() {
            slot.assembly_start_time = Some(now);
        }
        slot.clone()
    }

    /// Record a node's signature publication for a construction.
    pub fn add_signature(&mut self, construction_id: u64, publication: SignaturePublication) {
        // Validate the id before touching the collection.
        let _ = self.slot_mut(construction_id);
        self.signatures
            .entry(construction_id)
            .or_default()
            .insert(publication.node_id, publication);
    }

    /// Record a node's vote for a construction (last vote wins).
    pub fn add_vote(&mut self, node_id: NodeId, construction_id: u64, vote: ProofVote) {
        let _ = self.slot_mut(construction_id);
        self.votes
            .entry(construction_id)
            .or_default()
            .insert(node_id, vote);
    }

    /// Record the finalized proof for a construction.
    ///
    /// Idempotent for the same proof; a conflicting second completion is an
    /// upstream quorum-safety violation and panics.
    pub fn complete_proof(&mut self, construction_id: u64, proof: ChainProof) -> Construction {
        let slot = self.slot_mut(construction_id);
        match &slot.target_proof {
            None => {
                info!(construction_id, proof = %proof, "construction complete");
                slot.target_proof = Some(proof);
            }
            Some(existing) if existing.digest == proof.digest => {}
            Some(existing) => panic!(
                "construction {} already completed with {}, refusing conflicting {}",
                construction_id, existing, proof
            ),
        }
        slot.clone()
    }

    /// Record the network-wide ledger id. Written once, at genesis proof
    /// completion; rewriting the same value is a no-op.
    ///
    /// # Panics
    ///
    /// Panics on a conflicting second write.
    pub fn set_ledger_id(&mut self, bytes: Vec<u8>) {
        match &self.ledger_id {
            None => {
                info!(ledger_id = %hex::encode(&bytes), "ledger id set");
                self.ledger_id = Some(bytes);
            }
            Some(existing) if *existing == bytes => {}
            Some(_) => panic!("ledger id already set to a different value"),
        }
    }

    /// Apply a roster handoff: if `next` targets the new current roster,
    /// purge the outgoing construction's votes and signatures, drop proof
    /// keys of nodes that left the network entirely, promote `next` into
    /// `active`, and reset `next` to the sentinel.
    ///
    /// Returns whether a promotion occurred; when true the caller emits the
    /// promoted construction's proof to the finalized-proof consumer.
    pub fn purge_after_handoff(&mut self, transition: &RosterTransition) -> bool {
        if transition.phase != RosterPhase::Handoff {
            return false;
        }
        if self.next.is_sentinel() || self.next.target_roster_hash != transition.target_hash {
            debug!("handoff without a matching next construction, nothing to purge");
            return false;
        }

        let outgoing = std::mem::replace(&mut self.next, Construction::sentinel());
        let retired = std::mem::replace(&mut self.active, outgoing);

        self.signatures.remove(&retired.id);
        self.votes.remove(&retired.id);

        for node_id in self.keys.node_ids() {
            if !transition.source.contains(node_id) && !transition.target.contains(node_id) {
                self.keys.remove(node_id);
                debug!(%node_id, "removed proof keys for departed node");
            }
        }

        info!(
            promoted = %self.active,
            retired = %retired,
            "roster handoff: promoted next construction"
        );
        true
    }

    // ── Persistence ────────────────────────────────────────────────────────

    /// Capture the full persisted layout.
    pub fn snapshot(&self) -> StoreSnapshot {
        let (key_sets, last_boundary_at) = self.keys.snapshot_parts();
        StoreSnapshot {
            active: self.active.clone(),
            next: self.next.clone(),
            key_sets,
            last_boundary_at,
            signatures: self.signatures.clone(),
            votes: self.votes.clone(),
            ledger_id: self.ledger_id.clone(),
        }
    }

    /// Rebuild a store from a snapshot.
    pub fn restore(snapshot: StoreSnapshot) -> Self {
        Self {
            active: snapshot.active,
            next: snapshot.next,
            keys: KeyRegistry::from_snapshot_parts(snapshot.key_sets, snapshot.last_boundary_at),
            signatures: snapshot.signatures,
            votes: snapshot.votes,
            ledger_id: snapshot.ledger_id,
        }
    }

    /// Mutable access to the slot holding `construction_id`.
    ///
    /// # Panics
    ///
    /// Panics when the id matches neither slot (or the sentinel): the
    /// caller is operating on state that no longer exists, which is an
    /// invariant violation, not a recoverable condition.
    fn slot_mut(&mut self, construction_id: u64) -> &mut Construction {
        if construction_id != 0 && self.active.id == construction_id {
            &mut self.active
        } else if construction_id != 0 && self.next.id == construction_id {
            &mut self.next
        } else {
            panic!("no construction with id {}", construction_id)
        }
    }
}
