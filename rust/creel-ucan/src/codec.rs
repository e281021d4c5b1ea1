//! DAG-CBOR encoding helpers and content-derived links.

use ipld_core::cid::{Cid, multihash::Multihash};
use serde::{Serialize, de::DeserializeOwned};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Multicodec code for DAG-CBOR.
pub const DAG_CBOR_CODE: u64 = 0x71;

/// Multicodec code for raw bytes.
pub const RAW_CODE: u64 = 0x55;

/// Multihash code for SHA-256.
pub const SHA2_256_CODE: u64 = 0x12;

/// Encode a value to DAG-CBOR bytes.
///
/// # Errors
///
/// Returns a [`CodecError`] if encoding fails.
pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    serde_ipld_dagcbor::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decode a value from DAG-CBOR bytes.
///
/// # Errors
///
/// Returns a [`CodecError`] if decoding fails.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    serde_ipld_dagcbor::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

/// The CID (v1, DAG-CBOR, SHA-256) of an encoded token.
#[must_use]
pub fn link_of(bytes: &[u8]) -> Cid {
    Cid::new_v1(DAG_CBOR_CODE, sha2_256_multihash(bytes))
}

/// The CID (v1, raw, SHA-256) naming a plain byte payload by content.
#[must_use]
pub fn raw_link_of_digest(digest: &[u8; 32]) -> Cid {
    let hash = Multihash::wrap(SHA2_256_CODE, digest).expect("SHA-256 digest fits a multihash");
    Cid::new_v1(RAW_CODE, hash)
}

fn sha2_256_multihash(bytes: &[u8]) -> Multihash<64> {
    let digest = Sha256::digest(bytes);
    Multihash::wrap(SHA2_256_CODE, &digest).expect("SHA-256 digest fits a multihash")
}

/// The common error type for token encoding and decoding.
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    /// An error that occurs while encoding a token
    #[error("failed to encode a token: {0}")]
    Encode(String),

    /// An error that occurs while decoding a token
    #[error("failed to decode a token: {0}")]
    Decode(String),
}
