//! The proof construction state machine for one roster transition.
//!
//! Driven by a single-threaded consensus round loop: `advance_construction`
//! and the `add_*` handlers are called serially and never block. Signature
//! verification and transition-proof assembly are the only operations that
//! leave this thread; they run on the blocking pool and report back over
//! channels drained on the next round, so controller state has exactly one
//! writer.
//!
//! Phase progression per construction:
//!
//! ```text
//! CollectingKeys -> AwaitingSignatures -> AssemblingProof -> Voting -> Complete
//! ```
//!
//! Safety does not depend on the signature-sufficiency step (node-local
//! completion order): only the weighted vote aggregation in
//! `add_proof_vote` finalizes a proof.

use super::verification::{Assembly, Verification, VerificationLog};
use super::NodeContext;
use crate::gateway::spawn_submission;
use crate::proofs::{ChainProof, ProofError};
use crate::roster::{NodeId, Roster, RosterWeights};
use crate::store::{
    Construction, ConstructionStore, ProofKeyPublication, ProofVote, SignaturePublication,
};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Lifecycle phase of one construction, as seen by this node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstructionPhase {
    /// Waiting for proof-key publications from target-roster nodes.
    CollectingKeys,

    /// Assembly fixed; collecting weighted valid signatures.
    AwaitingSignatures,

    /// Sufficient signatures found; the transition proof is being built.
    AssemblingProof,

    /// This node has voted; waiting for network-wide vote weight.
    Voting,

    /// The finalized proof is recorded. Terminal.
    Complete,
}

/// Outstanding async work: result channels plus task handles.
///
/// Cancellation replaces the channels wholesale, so results from aborted
/// tasks can never be merged afterwards.
struct PendingWork {
    verifications_tx: mpsc::UnboundedSender<(u64, Verification)>,
    verifications_rx: mpsc::UnboundedReceiver<(u64, Verification)>,
    proofs_tx: mpsc::UnboundedSender<Result<ChainProof, ProofError>>,
    proofs_rx: mpsc::UnboundedReceiver<Result<ChainProof, ProofError>>,
    handles: Vec<JoinHandle<()>>,
}

impl PendingWork {
    fn new() -> Self {
        let (verifications_tx, verifications_rx) = mpsc::unbounded_channel();
        let (proofs_tx, proofs_rx) = mpsc::unbounded_channel();
        Self {
            verifications_tx,
            verifications_rx,
            proofs_tx,
            proofs_rx,
            handles: Vec::new(),
        }
    }

    fn cancel(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        *self = Self::new();
    }

    fn reap_finished(&mut self) {
        self.handles.retain(|handle| !handle.is_finished());
    }
}

/// State machine for one (source roster, target roster) construction.
pub struct ControllerState {
    ctx: Arc<NodeContext>,
    construction: Construction,
    source_roster: Roster,
    weights: RosterWeights,
    source_proof: Option<ChainProof>,

    phase: ConstructionPhase,

    /// Adopted proof keys observed so far, by node.
    key_publications: BTreeMap<NodeId, ProofKeyPublication>,

    /// Signature publications observed so far; first write per node wins.
    signatures: BTreeMap<NodeId, SignaturePublication>,

    /// Votes observed so far; last write per node wins.
    votes: BTreeMap<NodeId, ProofVote>,

    /// Completed verifications in completion order.
    verifications: VerificationLog,

    /// Nodes whose signature publication has already been handed to the
    /// verification pool.
    dispatched: HashSet<NodeId>,

    pending: PendingWork,

    published_key: bool,
    signed_assembly: bool,
    assembling: bool,
    voted: bool,
}

impl ControllerState {
    /// Build a controller seeded from persisted state.
    ///
    /// For the genesis transition (empty source roster) the target roster
    /// carries the voting and signing weight — there is no previous
    /// committee to attest.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: Arc<NodeContext>,
        construction: Construction,
        source_roster: Roster,
        target_roster: Roster,
        source_proof: Option<ChainProof>,
        key_publications: Vec<ProofKeyPublication>,
        signature_publications: Vec<SignaturePublication>,
        votes: BTreeMap<NodeId, ProofVote>,
    ) -> Self {
        let weights = if source_roster.is_empty() {
            RosterWeights::new(&target_roster, &target_roster)
        } else {
            RosterWeights::new(&source_roster, &target_roster)
        };

        let local = ctx.signer.node_id();
        let key_publications: BTreeMap<NodeId, ProofKeyPublication> = key_publications
            .into_iter()
            .map(|p| (p.node_id, p))
            .collect();
        let signatures: BTreeMap<NodeId, SignaturePublication> = signature_publications
            .into_iter()
            .map(|p| (p.node_id, p))
            .collect();

        let phase = if construction.is_complete() {
            ConstructionPhase::Complete
        } else if votes.contains_key(&local) {
            ConstructionPhase::Voting
        } else if construction.assembly_start_time.is_some() {
            ConstructionPhase::AwaitingSignatures
        } else {
            ConstructionPhase::CollectingKeys
        };

        Self {
            construction,
            source_roster,
            weights,
            source_proof,
            phase,
            published_key: key_publications.contains_key(&local),
            signed_assembly: signatures.contains_key(&local),
            voted: votes.contains_key(&local),
            key_publications,
            signatures,
            votes,
            verifications: VerificationLog::new(),
            dispatched: HashSet::new(),
            pending: PendingWork::new(),
            assembling: false,
            ctx,
        }
    }

    /// Construction id this controller drives.
    pub fn construction_id(&self) -> u64 {
        self.construction.id
    }

    /// Current phase.
    pub fn phase(&self) -> ConstructionPhase {
        self.phase
    }

    /// Whether work remains for this construction.
    pub fn is_still_in_progress(&self) -> bool {
        !self.construction.is_complete()
    }

    /// Drive the state machine one consensus round forward.
    ///
    /// Never blocks: completed async results are merged, due transitions
    /// applied, and new async work dispatched. Returns whether anything
    /// changed; with no new publications and an unchanged `now`, repeat
    /// calls settle into no-ops.
    pub fn advance_construction(
        &mut self,
        now: u64,
        metadata: &[u8],
        store: &mut ConstructionStore,
    ) -> bool {
        if self.construction.is_complete() {
            self.phase = ConstructionPhase::Complete;
            return false;
        }

        let mut changed = false;
        self.pending.reap_finished();
        changed |= self.drain_verifications();
        changed |= self.drain_proofs(store);
        if self.construction.is_complete() {
            return changed;
        }

        changed |= self.maybe_publish_own_key(now);
        changed |= self.maybe_fix_assembly(now, store);

        if self.construction.assembly_start_time.is_some() {
            changed |= self.maybe_sign_assembly(now, metadata);
            changed |= self.dispatch_verifications(metadata);
            changed |= self.maybe_start_assembling(metadata);
        }

        changed
    }

    /// Record a proof-key publication. No-op once complete. Returns whether
    /// the observed key changed.
    pub fn add_proof_key_publication(
        &mut self,
        publication: ProofKeyPublication,
        store: &mut ConstructionStore,
    ) -> bool {
        if self.construction.is_complete() {
            return false;
        }
        if self
            .key_publications
            .get(&publication.node_id)
            .is_some_and(|existing| existing.key == publication.key)
        {
            return false;
        }

        let first = store.set_proof_key(
            publication.node_id,
            publication.key.clone(),
            publication.published_at,
        );
        debug!(
            node_id = %publication.node_id,
            first_key = first,
            "recorded proof key publication"
        );
        self.key_publications.insert(publication.node_id, publication);
        true
    }

    /// Record a signature publication. First write per node wins; rejected
    /// once complete. Returns whether it was accepted.
    pub fn add_signature_publication(
        &mut self,
        publication: SignaturePublication,
        store: &mut ConstructionStore,
    ) -> bool {
        if self.construction.is_complete() {
            return false;
        }
        if self.signatures.contains_key(&publication.node_id) {
            return false;
        }

        store.add_signature(self.construction.id, publication.clone());
        debug!(node_id = %publication.node_id, "recorded signature publication");
        self.signatures.insert(publication.node_id, publication);
        true
    }

    /// Record a vote (last vote per node wins) and finalize the proof if a
    /// candidate reaches the vote quorum. Returns whether state changed.
    pub fn add_proof_vote(
        &mut self,
        node_id: NodeId,
        vote: ProofVote,
        store: &mut ConstructionStore,
    ) -> bool {
        if self.construction.is_complete() {
            return false;
        }
        if self.votes.get(&node_id).is_some_and(|v| *v == vote) {
            return false;
        }
        self.apply_vote(node_id, vote, store);
        true
    }

    /// Cancel outstanding verification and proof-assembly work.
    ///
    /// Idempotent and safe with nothing outstanding. Tasks already running
    /// on the blocking pool may finish, but their results can no longer be
    /// merged: the result channels are replaced.
    pub fn cancel_pending_work(&mut self) {
        self.pending.cancel();
        self.assembling = false;
    }

    // ── Round steps ────────────────────────────────────────────────────────

    fn drain_verifications(&mut self) -> bool {
        let mut changed = false;
        while let Ok((completed_at, verification)) = self.pending.verifications_rx.try_recv() {
            debug!(
                node_id = %verification.node_id,
                assembly = %verification.assembly,
                is_valid = verification.is_valid,
                "merged verification result"
            );
            self.verifications.record(completed_at, verification);
            changed = true;
        }
        changed
    }

    fn drain_proofs(&mut self, store: &mut ConstructionStore) -> bool {
        let mut changed = false;
        while let Ok(result) = self.pending.proofs_rx.try_recv() {
            self.assembling = false;
            match result {
                Ok(proof) => {
                    changed |= self.vote_for(proof, store);
                }
                Err(err) => {
                    // Transient: the next round re-detects sufficiency and
                    // spawns a fresh attempt.
                    warn!(error = %err, "transition proof assembly failed, retrying next round");
                    changed = true;
                }
            }
        }
        changed
    }

    fn maybe_publish_own_key(&mut self, now: u64) -> bool {
        let local = self.ctx.signer.node_id();
        if self.published_key || self.key_publications.contains_key(&local) {
            return false;
        }
        if self.weights.target_weight_of(local) == 0 {
            return false;
        }

        let publication = ProofKeyPublication {
            node_id: local,
            key: self.ctx.signer.proof_key().to_vec(),
            published_at: now,
        };
        info!(node_id = %local, "publishing local proof key");
        let gateway = Arc::clone(&self.ctx.gateway);
        spawn_submission("proof-key-publication", async move {
            gateway.submit_proof_key_publication(publication).await
        });
        self.published_key = true;
        true
    }

    fn maybe_fix_assembly(&mut self, now: u64, store: &mut ConstructionStore) -> bool {
        if self.construction.assembly_start_time.is_some() {
            return false;
        }

        let all_keys_published = self
            .weights
            .target_node_ids()
            .iter()
            .all(|id| self.key_publications.contains_key(id));
        let grace_elapsed = now >= self.construction.grace_period_end;
        if !all_keys_published && !grace_elapsed {
            return false;
        }

        self.construction = store.set_assembly_time(self.construction.id, now);
        self.phase = ConstructionPhase::AwaitingSignatures;
        info!(
            construction = %self.construction,
            all_keys_published,
            "assembly time fixed, awaiting signatures"
        );
        true
    }

    fn maybe_sign_assembly(&mut self, now: u64, metadata: &[u8]) -> bool {
        if self.signed_assembly {
            return false;
        }
        let local = self.ctx.signer.node_id();
        if self.weights.source_weight_of(local) == 0 {
            return false;
        }

        let assembly = self.current_assembly(metadata);
        let digest = assembly.digest();
        let signature = match self.ctx.signer.sign(&*self.ctx.library, digest.as_bytes()) {
            Ok(signature) => signature,
            Err(err) => {
                warn!(error = %err, "could not sign assembly, retrying next round");
                return false;
            }
        };

        let publication = SignaturePublication {
            node_id: local,
            signature,
            signing_time: now,
        };
        info!(node_id = %local, assembly = %digest, "submitting assembly signature");
        let gateway = Arc::clone(&self.ctx.gateway);
        let construction_id = self.construction.id;
        spawn_submission("assembly-signature", async move {
            gateway
                .submit_assembly_signature(construction_id, publication)
                .await
        });
        self.signed_assembly = true;
        true
    }

    /// Hand every not-yet-dispatched signature publication to the blocking
    /// pool for verification against the assembly as currently known.
    ///
    /// Nodes whose proof key has not arrived stay undispatched; they are
    /// retried once the key publication shows up.
    fn dispatch_verifications(&mut self, metadata: &[u8]) -> bool {
        let assembly = self.current_assembly(metadata);
        let digest = assembly.digest();
        let message: Vec<u8> = digest.as_bytes().to_vec();
        let mut changed = false;

        let undispatched: Vec<SignaturePublication> = self
            .signatures
            .values()
            .filter(|p| !self.dispatched.contains(&p.node_id))
            .cloned()
            .collect();

        for publication in undispatched {
            let Some(key_publication) = self.key_publications.get(&publication.node_id) else {
                continue;
            };

            let library = Arc::clone(&self.ctx.library);
            let tx = self.pending.verifications_tx.clone();
            let node_id = publication.node_id;
            let signature = publication.signature;
            let public_key = key_publication.key.clone();
            let message = message.clone();

            let handle = tokio::spawn(async move {
                let verified = tokio::task::spawn_blocking(move || {
                    let is_valid = library.verify(&signature, &message, &public_key);
                    (signature, is_valid)
                })
                .await;
                if let Ok((signature, is_valid)) = verified {
                    let _ = tx.send((
                        unix_now_ms(),
                        Verification {
                            node_id,
                            signature,
                            assembly: digest,
                            is_valid,
                        },
                    ));
                }
            });
            self.pending.handles.push(handle);
            self.dispatched.insert(node_id);
            changed = true;
        }
        changed
    }

    fn maybe_start_assembling(&mut self, metadata: &[u8]) -> bool {
        if self.assembling || self.voted {
            return false;
        }
        let Some(sufficient) = self.verifications.first_sufficient(&self.weights) else {
            return false;
        };

        info!(
            assembly = %sufficient.assembly,
            crossed_at = sufficient.crossed_at,
            signers = sufficient.signatures.len(),
            "sufficient signature weight, assembling transition proof"
        );

        let library = Arc::clone(&self.ctx.library);
        let tx = self.pending.proofs_tx.clone();
        let source_proof = self.source_proof.clone();
        let source_roster = self.source_roster.clone();
        let target_hash = self.construction.target_roster_hash;
        let metadata = metadata.to_vec();
        let signatures = sufficient.signatures;

        let handle = tokio::spawn(async move {
            let result = tokio::task::spawn_blocking(move || {
                library.prove_transition(
                    source_proof.as_ref(),
                    &source_roster,
                    &target_hash,
                    &metadata,
                    &signatures,
                )
            })
            .await;
            match result {
                Ok(proof_result) => {
                    let _ = tx.send(proof_result);
                }
                Err(join_err) => {
                    let _ = tx.send(Err(ProofError::Unavailable(join_err.to_string())));
                }
            }
        });
        self.pending.handles.push(handle);
        self.assembling = true;
        self.phase = ConstructionPhase::AssemblingProof;
        true
    }

    /// Record and submit this node's own vote for a freshly assembled proof.
    fn vote_for(&mut self, proof: ChainProof, store: &mut ConstructionStore) -> bool {
        if self.voted {
            return false;
        }
        let local = self.ctx.signer.node_id();
        info!(node_id = %local, proof = %proof, "voting for assembled proof");

        // The submission stays out of `pending`: completing the quorum right
        // below cancels pending work, and the vote broadcast must survive it.
        let gateway = Arc::clone(&self.ctx.gateway);
        let construction_id = self.construction.id;
        let submitted = proof.clone();
        spawn_submission("proof-vote", async move {
            gateway.submit_proof_vote(construction_id, submitted).await
        });

        self.voted = true;
        self.apply_vote(
            local,
            ProofVote {
                node_id: local,
                proof,
            },
            store,
        );
        if !self.construction.is_complete() {
            self.phase = ConstructionPhase::Voting;
        }
        true
    }

    /// Record a vote and finalize if any candidate crosses the quorum.
    fn apply_vote(&mut self, node_id: NodeId, vote: ProofVote, store: &mut ConstructionStore) {
        store.add_vote(node_id, self.construction.id, vote.clone());
        self.votes.insert(node_id, vote);

        let threshold = self.weights.source_weight_threshold();
        let mut tallies: HashMap<[u8; 32], u64> = HashMap::new();
        for (voter, recorded) in &self.votes {
            let weight = self.weights.source_weight_of(*voter);
            if weight == 0 {
                continue;
            }
            *tallies.entry(recorded.proof.digest).or_insert(0) += weight;
        }

        let winner = self
            .votes
            .values()
            .find(|v| tallies.get(&v.proof.digest).copied().unwrap_or(0) >= threshold)
            .map(|v| v.proof.clone());

        if let Some(proof) = winner {
            self.construction = store.complete_proof(self.construction.id, proof.clone());
            if self.construction.source_roster_hash.is_zero() {
                store.set_ledger_id(proof.digest.to_vec());
            }
            self.phase = ConstructionPhase::Complete;
            self.cancel_pending_work();
            info!(construction = %self.construction, proof = %proof, "vote quorum reached");
        }
    }

    fn current_assembly(&self, metadata: &[u8]) -> Assembly {
        let assembly_start = self.construction.assembly_start_time.unwrap_or(u64::MAX);
        let adoption_grace = self.ctx.config.adoption_grace_ms();
        let keys = self
            .weights
            .target_node_ids()
            .iter()
            .filter_map(|id| self.key_publications.get(id))
            .filter(|p| p.published_at.saturating_add(adoption_grace) <= assembly_start)
            .map(|p| (p.node_id, p.key.clone()))
            .collect();
        Assembly {
            target_roster_hash: self.construction.target_roster_hash,
            metadata: metadata.to_vec(),
            keys,
        }
    }
}

pub(crate) fn unix_now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProtocolConfig;
    use crate::controller::NodeSigner;
    use crate::gateway::MockGateway;
    use crate::proofs::{HmacProofLibrary, ProofLibrary};
    use crate::roster::{RosterEntry, RosterPhase, RosterTransition};
    use std::time::Duration;

    const SEED: [u8; 32] = [11u8; 32];
    const META: &[u8] = b"epoch-metadata";

    fn roster(ids: &[u64]) -> Roster {
        Roster::new(
            ids.iter()
                .map(|&id| RosterEntry {
                    node_id: NodeId(id),
                    weight: 25,
                })
                .collect(),
        )
    }

    struct Harness {
        store: ConstructionStore,
        controller: ControllerState,
        gateway: Arc<MockGateway>,
        library: Arc<HmacProofLibrary>,
        transition: RosterTransition,
    }

    /// Genesis harness: node `local` drives a bootstrap construction over
    /// four 25-weight nodes (threshold 34, since the target roster carries
    /// the weight at genesis).
    fn genesis_harness(local: u64) -> Harness {
        let library = Arc::new(HmacProofLibrary::new(SEED));
        let gateway = Arc::new(MockGateway::new());
        let key = library.node_key(NodeId(local));

        let mut config = ProtocolConfig::default();
        config.proof_key_grace = Duration::from_millis(5_000);

        let ctx = Arc::new(NodeContext {
            signer: NodeSigner::new(NodeId(local), key.clone(), key),
            library: library.clone(),
            gateway: gateway.clone(),
            config,
        });

        let transition = RosterTransition::new(
            RosterPhase::Bootstrap,
            Roster::empty(),
            roster(&[1, 2, 3, 4]),
            &*library,
        );

        let mut store = ConstructionStore::new();
        let construction =
            store.get_or_create_construction(&transition, 1_000, &ctx.config);

        let controller = ControllerState::new(
            ctx,
            construction,
            transition.source.clone(),
            transition.target.clone(),
            None,
            Vec::new(),
            Vec::new(),
            BTreeMap::new(),
        );

        Harness {
            store,
            controller,
            gateway,
            library,
            transition,
        }
    }

    fn key_publication(harness: &Harness, node: u64, at: u64) -> ProofKeyPublication {
        ProofKeyPublication {
            node_id: NodeId(node),
            key: harness.library.node_key(NodeId(node)),
            published_at: at,
        }
    }

    /// Sign the assembly the harness controller would build at `metadata`
    /// with all four node keys published.
    fn signature_over_full_assembly(
        harness: &Harness,
        node: u64,
        at: u64,
    ) -> SignaturePublication {
        let keys: BTreeMap<NodeId, Vec<u8>> = [1u64, 2, 3, 4]
            .iter()
            .map(|&id| (NodeId(id), harness.library.node_key(NodeId(id))))
            .collect();
        let assembly = Assembly {
            target_roster_hash: harness.transition.target_hash,
            metadata: META.to_vec(),
            keys,
        };
        let signature = harness
            .library
            .sign(assembly.digest().as_bytes(), &harness.library.node_key(NodeId(node)))
            .expect("mock library signs");
        SignaturePublication {
            node_id: NodeId(node),
            signature,
            signing_time: at,
        }
    }

    /// Advance repeatedly (yielding to the worker pool) until `done` or the
    /// round budget runs out.
    async fn drive_until(
        harness: &mut Harness,
        now: u64,
        mut done: impl FnMut(&ControllerState) -> bool,
    ) {
        for _ in 0..200 {
            harness
                .controller
                .advance_construction(now, META, &mut harness.store);
            if done(&harness.controller) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        panic!("round budget exhausted before condition held");
    }

    #[tokio::test]
    async fn test_assembly_waits_for_keys_until_grace_end() {
        let mut harness = genesis_harness(1);

        // Within the grace window, keys missing: no assembly time yet.
        harness
            .controller
            .advance_construction(2_000, META, &mut harness.store);
        assert!(harness.store.get_active().assembly_start_time.is_none());
        assert_eq!(harness.controller.phase(), ConstructionPhase::CollectingKeys);

        // Grace expired: assembly proceeds without the stragglers.
        harness
            .controller
            .advance_construction(7_000, META, &mut harness.store);
        assert_eq!(
            harness.store.get_active().assembly_start_time,
            Some(7_000)
        );
        assert_eq!(
            harness.controller.phase(),
            ConstructionPhase::AwaitingSignatures
        );
    }

    #[tokio::test]
    async fn test_assembly_starts_early_once_all_keys_published() {
        let mut harness = genesis_harness(1);

        for node in 1..=4 {
            let publication = key_publication(&harness, node, 1_500);
            assert!(harness
                .controller
                .add_proof_key_publication(publication, &mut harness.store));
        }

        harness
            .controller
            .advance_construction(2_000, META, &mut harness.store);
        assert_eq!(
            harness.store.get_active().assembly_start_time,
            Some(2_000),
            "all keys published: no need to wait for the grace window"
        );
    }

    #[tokio::test]
    async fn test_own_key_published_through_gateway_once() {
        let mut harness = genesis_harness(1);

        harness
            .controller
            .advance_construction(2_000, META, &mut harness.store);
        harness
            .controller
            .advance_construction(2_000, META, &mut harness.store);

        // Give the spawned submission a moment to land.
        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.gateway.with_records(|records| {
            assert_eq!(records.key_publications.len(), 1);
            assert_eq!(records.key_publications[0].node_id, NodeId(1));
        });
    }

    #[tokio::test]
    async fn test_signature_publications_first_write_wins() {
        let mut harness = genesis_harness(1);
        for node in 1..=4 {
            let publication = key_publication(&harness, node, 1_500);
            harness
                .controller
                .add_proof_key_publication(publication, &mut harness.store);
        }
        harness
            .controller
            .advance_construction(2_000, META, &mut harness.store);

        let first = signature_over_full_assembly(&harness, 2, 2_100);
        let mut second = first.clone();
        second.signature = vec![0xff];

        assert!(harness
            .controller
            .add_signature_publication(first, &mut harness.store));
        assert!(
            !harness
                .controller
                .add_signature_publication(second, &mut harness.store),
            "a node's second signature publication must be rejected"
        );
    }

    #[tokio::test]
    async fn test_key_publications_ignored_after_completion() {
        let mut harness = genesis_harness(1);
        let proof = harness
            .library
            .prove_transition(
                None,
                &Roster::empty(),
                &harness.transition.target_hash,
                META,
                &BTreeMap::new(),
            )
            .unwrap();

        // Two 25-weight votes reach the threshold 34.
        for node in [2u64, 3] {
            harness.controller.add_proof_vote(
                NodeId(node),
                ProofVote {
                    node_id: NodeId(node),
                    proof: proof.clone(),
                },
                &mut harness.store,
            );
        }
        assert!(harness.store.get_active().is_complete());
        assert_eq!(harness.controller.phase(), ConstructionPhase::Complete);

        let publication = key_publication(&harness, 4, 9_000);
        assert!(!harness
            .controller
            .add_proof_key_publication(publication, &mut harness.store));
    }

    #[tokio::test]
    async fn test_vote_quorum_completes_and_sets_genesis_ledger_id() {
        let mut harness = genesis_harness(1);
        let proof = harness
            .library
            .prove_transition(
                None,
                &Roster::empty(),
                &harness.transition.target_hash,
                META,
                &BTreeMap::new(),
            )
            .unwrap();

        let vote = |node: u64| ProofVote {
            node_id: NodeId(node),
            proof: proof.clone(),
        };

        assert!(harness
            .controller
            .add_proof_vote(NodeId(2), vote(2), &mut harness.store));
        assert!(!harness.store.get_active().is_complete(), "25 < 34");

        assert!(harness
            .controller
            .add_proof_vote(NodeId(3), vote(3), &mut harness.store));
        assert!(harness.store.get_active().is_complete(), "50 >= 34");
        assert_eq!(
            harness.store.ledger_id(),
            Some(&proof.digest[..]),
            "genesis completion records the ledger id"
        );

        // Further votes are no-ops on a complete construction.
        assert!(!harness
            .controller
            .add_proof_vote(NodeId(4), vote(4), &mut harness.store));
    }

    #[tokio::test]
    async fn test_full_flow_assembles_proof_and_votes() {
        let mut harness = genesis_harness(1);

        // Everyone publishes keys; assembly gets fixed.
        for node in 1..=4 {
            let publication = key_publication(&harness, node, 1_500);
            harness
                .controller
                .add_proof_key_publication(publication, &mut harness.store);
        }
        harness
            .controller
            .advance_construction(2_000, META, &mut harness.store);

        // Nodes 2 and 3 publish valid signatures (25 + 25 >= 34).
        for node in [2u64, 3] {
            let publication = signature_over_full_assembly(&harness, node, 2_100);
            harness
                .controller
                .add_signature_publication(publication, &mut harness.store);
        }

        // Drive until verification lands, the proof is assembled, and this
        // node's own vote is recorded.
        drive_until(&mut harness, 2_200, |controller| {
            controller.phase() == ConstructionPhase::Voting
                || controller.phase() == ConstructionPhase::Complete
        })
        .await;

        let votes = harness.store.get_votes(
            harness.store.get_active().id,
            &[NodeId(1)],
        );
        assert_eq!(votes.len(), 1, "own vote recorded in the store");

        tokio::time::sleep(Duration::from_millis(20)).await;
        harness.gateway.with_records(|records| {
            assert_eq!(records.votes.len(), 1, "own vote submitted to the network");
            assert_eq!(records.signatures.len(), 1, "own signature submitted");
        });

        // Votes from nodes 2 and 3 finalize the same proof.
        let own_vote = votes[&NodeId(1)].clone();
        for node in [2u64, 3] {
            harness.controller.add_proof_vote(
                NodeId(node),
                ProofVote {
                    node_id: NodeId(node),
                    proof: own_vote.proof.clone(),
                },
                &mut harness.store,
            );
        }
        assert!(harness.store.get_active().is_complete());
    }

    #[tokio::test]
    async fn test_advance_is_idempotent_without_new_input() {
        let mut harness = genesis_harness(1);

        // Settle the round: key publication + assembly fixing happen once.
        harness
            .controller
            .advance_construction(7_000, META, &mut harness.store);
        drive_until(&mut harness, 7_000, |controller| {
            controller.phase() == ConstructionPhase::AwaitingSignatures
        })
        .await;

        let before = harness.store.snapshot();
        let changed = harness
            .controller
            .advance_construction(7_000, META, &mut harness.store);
        assert!(!changed, "no new input: advance must be a no-op");
        assert_eq!(harness.store.snapshot(), before);
    }

    #[tokio::test]
    async fn test_cancel_pending_work_is_idempotent() {
        let mut harness = genesis_harness(1);
        harness.controller.cancel_pending_work();
        harness.controller.cancel_pending_work();

        // Still functional afterwards.
        harness
            .controller
            .advance_construction(7_000, META, &mut harness.store);
        assert_eq!(
            harness.controller.phase(),
            ConstructionPhase::AwaitingSignatures
        );
    }
}
