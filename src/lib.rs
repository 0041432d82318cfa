//! Succession - Rolling Proof-of-History Construction
//!
//! A library for building chain-of-trust proofs over committee roster
//! transitions. A weighted committee (the source roster) collectively
//! attests to its successor (the target roster): nodes publish proof keys,
//! sign the resulting assembly, and vote on candidate transition proofs
//! until a weighted quorum settles on one.
//!
//! Key principles:
//! - Single-writer state machine; heavy crypto runs off the round thread
//! - The construction store is the only mutator of persisted state
//! - Safety comes from the >1/3-weight vote quorum, not from mutual
//!   exclusion or from signature-arrival order
//!
//! This crate is invoked by a surrounding node runtime; it defines no
//! network wire format and no CLI.

pub mod config;
pub mod controller;
pub mod gateway;
pub mod keys;
pub mod proofs;
pub mod roster;
pub mod serialization;
pub mod store;
