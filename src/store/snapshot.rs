//! Persisted layout of the construction store.
//!
//! Two named singleton slots (`active`, `next`), the proof key sets by
//! node, signature publications and votes by (construction, node), and the
//! ledger id singleton. Encoded as CBOR through the serialization helpers;
//! the surrounding runtime decides where the bytes live.

use super::construction::{Construction, ProofVote, SignaturePublication};
use crate::keys::ProofKeySet;
use crate::roster::NodeId;
use crate::serialization::{self, SerializationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete persisted store state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// The active construction slot.
    pub active: Construction,

    /// The next construction slot.
    pub next: Construction,

    /// Proof key sets by node.
    pub key_sets: BTreeMap<NodeId, ProofKeySet>,

    /// Most recent construction boundary seen by the key registry.
    pub last_boundary_at: u64,

    /// Signature publications by construction, then node.
    pub signatures: BTreeMap<u64, BTreeMap<NodeId, SignaturePublication>>,

    /// Votes by construction, then node.
    pub votes: BTreeMap<u64, BTreeMap<NodeId, ProofVote>>,

    /// Network-wide ledger id, set once at genesis completion.
    #[serde(default)]
    pub ledger_id: Option<Vec<u8>>,
}

impl StoreSnapshot {
    /// Encode to CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, SerializationError> {
        serialization::to_cbor(self)
    }

    /// Decode from CBOR bytes.
    pub fn decode(bytes: &[u8]) -> Result<Self, SerializationError> {
        serialization::from_cbor(bytes)
    }
}
