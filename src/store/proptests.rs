//! Property-based tests for the construction store and vote aggregation.
//!
//! Tests for:
//! - Quorum safety: no two conflicting proofs can both complete
//! - Construction ids: strictly increasing, never reused
//! - Snapshot: encode/decode roundtrip over arbitrary contents

use super::{Construction, ConstructionStore, ProofVote, SignaturePublication};
use crate::config::ProtocolConfig;
use crate::controller::{ControllerState, NodeContext, NodeSigner};
use crate::gateway::MockGateway;
use crate::proofs::{ChainProof, HmacProofLibrary};
use crate::roster::{NodeId, Roster, RosterEntry, RosterHash, RosterPhase, RosterTransition};
use crate::store::StoreSnapshot;
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

fn roster_from_weights(weights: &[u64]) -> Roster {
    Roster::new(
        weights
            .iter()
            .enumerate()
            .map(|(i, &weight)| RosterEntry {
                node_id: NodeId(i as u64 + 1),
                weight,
            })
            .collect(),
    )
}

fn candidate(tag: u8, target: RosterHash) -> ChainProof {
    ChainProof {
        source_roster_hash: RosterHash::from_bytes(&[1u8; 32]),
        target_roster_hash: target,
        metadata: vec![],
        digest: [tag; 32],
        body: vec![],
    }
}

/// Context for a node outside every roster: it observes votes but never
/// signs or submits anything itself.
fn observer_context() -> Arc<NodeContext> {
    let library = Arc::new(HmacProofLibrary::new([5u8; 32]));
    let key = library.node_key(NodeId(999));
    Arc::new(NodeContext {
        signer: NodeSigner::new(NodeId(999), key.clone(), key),
        library,
        gateway: Arc::new(MockGateway::new()),
        config: ProtocolConfig::default(),
    })
}

fn controller_over(
    store: &mut ConstructionStore,
    source: Roster,
    target: Roster,
) -> (ControllerState, Construction) {
    let library = HmacProofLibrary::new([5u8; 32]);
    let transition = RosterTransition::new(RosterPhase::Transition, source, target, &library);
    let construction =
        store.get_or_create_construction(&transition, 1_000, &ProtocolConfig::default());
    let controller = ControllerState::new(
        observer_context(),
        construction.clone(),
        transition.source.clone(),
        transition.target.clone(),
        None,
        Vec::new(),
        Vec::new(),
        BTreeMap::new(),
    );
    (controller, construction)
}

proptest! {
    /// Property: quorum safety. For any weights and any vote order
    /// (revotes included), at most one distinct proof completes, and a
    /// completed proof held at least the source quorum threshold when it
    /// completed.
    #[test]
    fn quorum_safety_at_most_one_proof_completes(
        weights in prop::collection::vec(1u64..100, 3..8),
        votes in prop::collection::vec((0usize..8, prop::bool::ANY), 1..40),
    ) {
        let source = roster_from_weights(&weights);
        let target = roster_from_weights(&weights);
        let node_ids = source.node_ids();

        let mut store = ConstructionStore::new();
        let (mut controller, construction) =
            controller_over(&mut store, source.clone(), target);
        let target_hash = construction.target_roster_hash;

        // `complete_proof` panics on a conflicting second completion, so a
        // safety violation fails this test by itself.
        for (node_index, prefer_a) in votes {
            let node_id = node_ids[node_index % node_ids.len()];
            let tag = if prefer_a { 0xaa } else { 0xbb };
            let vote = ProofVote {
                node_id,
                proof: candidate(tag, target_hash),
            };
            controller.add_proof_vote(node_id, vote, &mut store);
        }

        let threshold = source.total_weight() / 3 + 1;
        let recorded = store.get_votes(construction.id, &node_ids);
        let mut tallies: BTreeMap<[u8; 32], u64> = BTreeMap::new();
        for (voter, vote) in &recorded {
            if let Some(weight) = source.weight_of(*voter) {
                *tallies.entry(vote.proof.digest).or_insert(0) += weight;
            }
        }

        match &store.get_active().target_proof {
            Some(proof) => {
                // Votes stop being recorded at completion, so the recorded
                // tally is the tally that crossed the threshold.
                let winner_tally = tallies.get(&proof.digest).copied().unwrap_or(0);
                prop_assert!(
                    winner_tally >= threshold,
                    "completed with tally {} < threshold {}",
                    winner_tally,
                    threshold
                );
            }
            None => {
                // Not complete: then no candidate may hold the threshold.
                for (digest, tally) in &tallies {
                    prop_assert!(
                        *tally < threshold,
                        "digest {:02x?} holds {} >= {} without completing",
                        &digest[..2],
                        tally,
                        threshold
                    );
                }
            }
        }
    }

    /// Property: construction ids are strictly increasing and never
    /// reused across any sequence of get-or-create calls.
    #[test]
    fn construction_ids_strictly_increase(
        pairs in prop::collection::vec((0u64..4, 4u64..8), 1..20),
    ) {
        let library = HmacProofLibrary::new([5u8; 32]);
        let mut store = ConstructionStore::new();
        let mut seen = std::collections::BTreeSet::new();
        let mut highest = 0u64;

        for (source_tag, target_tag) in pairs {
            let source = roster_from_weights(&[10 + source_tag, 20]);
            let target = roster_from_weights(&[10 + target_tag, 20, 30]);
            let transition =
                RosterTransition::new(RosterPhase::Transition, source, target, &library);
            let construction =
                store.get_or_create_construction(&transition, 1_000, &ProtocolConfig::default());

            if seen.insert(construction.id) {
                prop_assert!(
                    construction.id > highest,
                    "fresh id {} not above previous maximum {}",
                    construction.id,
                    highest
                );
                highest = construction.id;
            }
        }
    }

    /// Property: snapshot encode/decode preserves arbitrary store contents.
    #[test]
    fn snapshot_roundtrip_preserves_state(
        keys in prop::collection::btree_map(1u64..50, prop::collection::vec(any::<u8>(), 1..16), 0..6),
        signatures in prop::collection::btree_map(1u64..50, prop::collection::vec(any::<u8>(), 1..16), 0..6),
    ) {
        let library = HmacProofLibrary::new([5u8; 32]);
        let source = roster_from_weights(&[10, 20]);
        let target = roster_from_weights(&[10, 20, 30]);
        let transition = RosterTransition::new(RosterPhase::Transition, source, target, &library);

        let mut store = ConstructionStore::new();
        let construction =
            store.get_or_create_construction(&transition, 1_000, &ProtocolConfig::default());
        for (node, key) in keys {
            store.set_proof_key(NodeId(node), key, 1_500);
        }
        for (node, signature) in signatures {
            store.add_signature(construction.id, SignaturePublication {
                node_id: NodeId(node),
                signature,
                signing_time: 2_000,
            });
        }

        let snapshot = store.snapshot();
        let bytes = snapshot.encode().unwrap();
        let decoded = StoreSnapshot::decode(&bytes).unwrap();
        prop_assert_eq!(snapshot, decoded);
    }
}
