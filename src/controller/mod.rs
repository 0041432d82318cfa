//! Proof construction controllers.
//!
//! One controller drives one (source roster, target roster) construction.
//! The `Controller` enum has two variants: `Active` wraps the real state
//! machine, `Inert` stands in when there is nothing to do (construction
//! already complete, or handoff in progress) so call sites never branch.
//!
//! All dependencies are explicit: a `NodeContext` built once at node
//! startup is threaded through the registry into every controller. There
//! is no process-wide state, so multiple independent instances can live in
//! one process (and in one test).

pub mod registry;
pub mod state;
pub mod verification;

pub use registry::ControllerRegistry;
pub use state::{ConstructionPhase, ControllerState};
pub use verification::{Assembly, AssemblyDigest, SufficientAssembly, Verification, VerificationLog};

use crate::config::ProtocolConfig;
use crate::gateway::SubmissionGateway;
use crate::proofs::{ProofLibrary, ProofResult};
use crate::roster::NodeId;
use crate::store::{ConstructionStore, ProofKeyPublication, ProofVote, SignaturePublication};
use std::sync::Arc;
use zeroize::Zeroize;

/// The local node's signing identity: its id, its published proof key, and
/// the private half used to sign assemblies.
pub struct NodeSigner {
    node_id: NodeId,
    proof_key: Vec<u8>,
    private_key: Vec<u8>,
}

impl Drop for NodeSigner {
    fn drop(&mut self) {
        self.private_key.zeroize();
    }
}

impl NodeSigner {
    /// Create a signer from key material supplied by the node runtime.
    pub fn new(node_id: NodeId, proof_key: Vec<u8>, private_key: Vec<u8>) -> Self {
        Self {
            node_id,
            proof_key,
            private_key,
        }
    }

    /// This node's id.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The public proof key to publish.
    pub fn proof_key(&self) -> &[u8] {
        &self.proof_key
    }

    /// Sign a message with the private key through the proof library.
    pub fn sign(&self, library: &dyn ProofLibrary, message: &[u8]) -> ProofResult<Vec<u8>> {
        library.sign(message, &self.private_key)
    }
}

/// Everything a controller needs, owned explicitly and built once at node
/// startup.
pub struct NodeContext {
    /// Local signing identity.
    pub signer: NodeSigner,

    /// Proof capability.
    pub library: Arc<dyn ProofLibrary>,

    /// Network submission.
    pub gateway: Arc<dyn SubmissionGateway>,

    /// Protocol configuration.
    pub config: ProtocolConfig,
}

/// A controller for one construction: active, or inert when there is
/// nothing to drive.
pub enum Controller {
    /// The real state machine.
    Active(Box<ControllerState>),

    /// Nothing to do for this construction id; every mutation is a no-op.
    Inert(u64),
}

impl Controller {
    /// Construction id this controller is bound to.
    pub fn construction_id(&self) -> u64 {
        match self {
            Controller::Active(state) => state.construction_id(),
            Controller::Inert(id) => *id,
        }
    }

    /// Whether work remains. Always false for the inert variant.
    pub fn is_still_in_progress(&self) -> bool {
        match self {
            Controller::Active(state) => state.is_still_in_progress(),
            Controller::Inert(_) => false,
        }
    }

    /// Drive one consensus round. Returns whether anything changed.
    pub fn advance_construction(
        &mut self,
        now: u64,
        metadata: &[u8],
        store: &mut ConstructionStore,
    ) -> bool {
        match self {
            Controller::Active(state) => state.advance_construction(now, metadata, store),
            Controller::Inert(_) => false,
        }
    }

    /// Record a proof-key publication.
    pub fn add_proof_key_publication(
        &mut self,
        publication: ProofKeyPublication,
        store: &mut ConstructionStore,
    ) -> bool {
        match self {
            Controller::Active(state) => state.add_proof_key_publication(publication, store),
            Controller::Inert(_) => false,
        }
    }

    /// Record a signature publication (first write per node wins).
    pub fn add_signature_publication(
        &mut self,
        publication: SignaturePublication,
        store: &mut ConstructionStore,
    ) -> bool {
        match self {
            Controller::Active(state) => state.add_signature_publication(publication, store),
            Controller::Inert(_) => false,
        }
    }

    /// Record a vote (last vote per node wins).
    pub fn add_proof_vote(
        &mut self,
        node_id: NodeId,
        vote: ProofVote,
        store: &mut ConstructionStore,
    ) -> bool {
        match self {
            Controller::Active(state) => state.add_proof_vote(node_id, vote, store),
            Controller::Inert(_) => false,
        }
    }

    /// Cancel outstanding async work. Idempotent; no-op when inert.
    pub fn cancel_pending_work(&mut self) {
        if let Controller::Active(state) = self {
            state.cancel_pending_work();
        }
    }
}
