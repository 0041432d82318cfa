//! Chain-of-trust proof capability.
//!
//! The proof system itself (key generation, signing, SNARK-style transition
//! proofs) is a pluggable capability consumed through the `ProofLibrary`
//! trait. The construction protocol never depends on a concrete scheme; it
//! only orchestrates when signing, verification, and proof assembly happen.

pub mod mock;
pub mod traits;

pub use mock::HmacProofLibrary;
pub use traits::{ChainProof, ProofError, ProofLibrary, ProofResult};
