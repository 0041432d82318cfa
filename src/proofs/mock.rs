//! Deterministic HMAC-based proof library for tests.
//!
//! Signatures are HMAC-SHA256 over the message, so "private" and "public"
//! key material are the same bytes (a symmetric test double, like an
//! identity key). Transition proofs are hash chains: each proof digest
//! commits to the previous digest, the roster pair, and the metadata, so a
//! sequence of proofs forms a verifiable lineage without any real SNARK
//! machinery.
//!
//! Node key material is derived with HKDF-SHA256 from a library seed with
//! per-node domain separation, so every test run produces the same keys.

use super::traits::{ChainProof, ProofError, ProofLibrary, ProofResult};
use crate::roster::{NodeId, Roster, RosterHash};
use hkdf::Hkdf;
use ring::hmac;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Domain separation salt for node key derivation.
const KEY_SALT: &[u8] = b"succession-test-keys-v1";

/// Domain prefix for proof digests.
const PROOF_DOMAIN: &[u8] = b"succession-chain-proof-v1";

/// Deterministic test proof library.
#[derive(Debug, Clone)]
pub struct HmacProofLibrary {
    seed: [u8; 32],
    /// When true, every operation fails with `ProofError::Unavailable`.
    /// Lets tests exercise the retry-next-round path.
    unavailable: bool,
}

impl HmacProofLibrary {
    /// Create a library from a 32-byte seed.
    pub fn new(seed: [u8; 32]) -> Self {
        Self {
            seed,
            unavailable: false,
        }
    }

    /// Library that fails every signing/proving call.
    pub fn unavailable(seed: [u8; 32]) -> Self {
        Self {
            seed,
            unavailable: true,
        }
    }

    /// Derive the key material for a node. Returned bytes serve as both the
    /// private and the public half (HMAC is symmetric).
    pub fn node_key(&self, node_id: NodeId) -> Vec<u8> {
        let hkdf = Hkdf::<Sha256>::new(Some(KEY_SALT), &self.seed);
        let info = format!("node-key-{}", node_id.0);
        let mut key = [0u8; 32];
        hkdf.expand(info.as_bytes(), &mut key)
            .expect("32 bytes is a valid HKDF output length");
        key.to_vec()
    }

    fn check_available(&self) -> ProofResult<()> {
        if self.unavailable {
            return Err(ProofError::Unavailable("mock library offline".to_string()));
        }
        Ok(())
    }
}

impl ProofLibrary for HmacProofLibrary {
    fn hash_roster(&self, roster: &Roster) -> RosterHash {
        let mut hasher = Sha256::new();
        hasher.update(b"succession-roster-v1");
        for entry in roster.entries() {
            hasher.update(entry.node_id.0.to_be_bytes());
            hasher.update(entry.weight.to_be_bytes());
        }
        RosterHash::from_bytes(&hasher.finalize())
    }

    fn sign(&self, message: &[u8], private_key: &[u8]) -> ProofResult<Vec<u8>> {
        self.check_available()?;
        let key = hmac::Key::new(hmac::HMAC_SHA256, private_key);
        Ok(hmac::sign(&key, message).as_ref().to_vec())
    }

    fn verify(&self, signature: &[u8], message: &[u8], public_key: &[u8]) -> bool {
        if self.unavailable {
            return false;
        }
        let key = hmac::Key::new(hmac::HMAC_SHA256, public_key);
        hmac::verify(&key, message, signature).is_ok()
    }

    fn prove_transition(
        &self,
        source_proof: Option<&ChainProof>,
        source_roster: &Roster,
        target_roster_hash: &RosterHash,
        metadata: &[u8],
        signatures: &BTreeMap<NodeId, Vec<u8>>,
    ) -> ProofResult<ChainProof> {
        self.check_available()?;

        let source_roster_hash = if source_roster.is_empty() {
            RosterHash::zero()
        } else {
            self.hash_roster(source_roster)
        };

        // The digest deliberately excludes the signature set: any sufficient
        // quorum over the same transition yields the same proof identity, so
        // votes from nodes that saw different quorums still converge.
        let mut hasher = Sha256::new();
        hasher.update(PROOF_DOMAIN);
        match source_proof {
            Some(prev) => hasher.update(prev.digest),
            None => hasher.update([0u8; 32]),
        }
        hasher.update(source_roster_hash.as_bytes());
        hasher.update(target_roster_hash.as_bytes());
        hasher.update(metadata);
        let digest: [u8; 32] = hasher.finalize().into();

        let mut body = Vec::new();
        for (node_id, signature) in signatures {
            body.extend_from_slice(&node_id.0.to_be_bytes());
            body.extend_from_slice(&(signature.len() as u32).to_be_bytes());
            body.extend_from_slice(signature);
        }

        Ok(ChainProof {
            source_roster_hash,
            target_roster_hash: *target_roster_hash,
            metadata: metadata.to_vec(),
            digest,
            body,
        })
    }
}
