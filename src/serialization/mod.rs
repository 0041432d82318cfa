//! CBOR serialization for persisted construction state.
//!
//! The store's snapshot layout is encoded as CBOR via `ciborium` (NOT JSON
//! or bincode): deterministic bytes for digesting, compact on disk, and
//! schema evolution through `#[serde(default)]` on added fields.

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Serialization errors.
#[derive(Debug, Error)]
pub enum SerializationError {
    /// CBOR encoding failed.
    #[error("CBOR encoding failed: {0}")]
    Encode(String),

    /// CBOR decoding failed.
    #[error("CBOR decoding failed: {0}")]
    Decode(String),
}

/// Serialize to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, SerializationError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes)
        .map_err(|e| SerializationError::Encode(format!("{:?}", e)))?;
    Ok(bytes)
}

/// Deserialize from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, SerializationError> {
    ciborium::from_reader(bytes).map_err(|e| SerializationError::Decode(format!("{:?}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roster::{NodeId, RosterHash};
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Record {
        node_id: NodeId,
        hash: RosterHash,
        payload: Vec<u8>,
    }

    #[test]
    fn test_cbor_roundtrip_with_domain_types() {
        let original = Record {
            node_id: NodeId(42),
            hash: RosterHash::from_bytes(&[9u8; 32]),
            payload: vec![1, 2, 3],
        };
        let bytes = to_cbor(&original).unwrap();
        let recovered: Record = from_cbor(&bytes).unwrap();
        assert_eq!(original, recovered);
    }

    #[test]
    fn test_cbor_deterministic() {
        let record = Record {
            node_id: NodeId(7),
            hash: RosterHash::zero(),
            payload: vec![0xff],
        };
        assert_eq!(to_cbor(&record).unwrap(), to_cbor(&record).unwrap());
    }

    #[test]
    fn test_cbor_schema_evolution_with_defaults() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct V1 {
            id: u64,
        }

        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct V2 {
            id: u64,
            #[serde(default)]
            ledger_id: Option<Vec<u8>>,
        }

        let bytes = to_cbor(&V1 { id: 3 }).unwrap();
        let upgraded: V2 = from_cbor(&bytes).unwrap();
        assert_eq!(upgraded.id, 3);
        assert_eq!(upgraded.ledger_id, None);
    }

    #[test]
    fn test_cbor_decode_error_on_garbage() {
        let result: Result<Record, _> = from_cbor(&[0xde, 0xad, 0xbe, 0xef]);
        assert!(result.is_err());
    }
}
