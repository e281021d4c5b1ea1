//! Decentralized identifiers.

use base58::{FromBase58, ToBase58};
use ed25519_dalek::VerifyingKey;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

/// Multicodec prefix for an ed25519 public key.
const ED25519_MULTICODEC: [u8; 2] = [0xed, 0x01];

/// A decentralized identifier naming a principal.
///
/// Two methods are understood: `did:key`, whose method-specific part is
/// the multibase (base58btc, `z` prefix) encoding of the
/// multicodec-prefixed ed25519 public key, and `did:web`, which names a
/// principal (typically a service) by host. Only `did:key` identifiers
/// carry a verifying key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Did(String);

impl Did {
    /// Parse a DID from its string form.
    ///
    /// # Errors
    ///
    /// Returns a [`DidError`] if the string is not a well-formed
    /// `did:key` or `did:web` identifier.
    pub fn parse(s: &str) -> Result<Self, DidError> {
        if let Some(host) = s.strip_prefix("did:web:") {
            if host.is_empty() || host.contains('/') {
                return Err(DidError::InvalidEncoding(s.to_string()));
            }
            return Ok(Did(s.to_string()));
        }
        decode_key(s)?;
        Ok(Did(s.to_string()))
    }

    /// The DID in string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The host named by a `did:web` identifier, when this is one.
    #[must_use]
    pub fn web_host(&self) -> Option<&str> {
        self.0.strip_prefix("did:web:")
    }

    /// Recover the ed25519 verifying key embedded in this DID.
    ///
    /// # Errors
    ///
    /// Returns a [`DidError`] if this is not a `did:key` identifier or
    /// the embedded bytes are not a valid curve point.
    pub fn verifying_key(&self) -> Result<VerifyingKey, DidError> {
        decode_key(&self.0)
    }
}

impl From<&VerifyingKey> for Did {
    fn from(key: &VerifyingKey) -> Self {
        let mut bytes = Vec::with_capacity(2 + 32);
        bytes.extend_from_slice(&ED25519_MULTICODEC);
        bytes.extend_from_slice(key.as_bytes());
        Did(format!("did:key:z{}", bytes.to_base58()))
    }
}

fn decode_key(s: &str) -> Result<VerifyingKey, DidError> {
    let encoded = s
        .strip_prefix("did:key:z")
        .ok_or_else(|| DidError::UnsupportedMethod(s.to_string()))?;
    let bytes = encoded
        .from_base58()
        .map_err(|_| DidError::InvalidEncoding(s.to_string()))?;
    let key_bytes = bytes
        .strip_prefix(&ED25519_MULTICODEC)
        .ok_or_else(|| DidError::UnsupportedKeyType(s.to_string()))?;
    let key_bytes: &[u8; 32] = key_bytes
        .try_into()
        .map_err(|_| DidError::InvalidEncoding(s.to_string()))?;
    VerifyingKey::from_bytes(key_bytes).map_err(|_| DidError::InvalidKey(s.to_string()))
}

impl Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for Did {
    type Err = DidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Did::parse(s)
    }
}

impl Serialize for Did {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Did {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Did::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Errors produced when parsing or using a [`Did`].
#[derive(Debug, Clone, Error)]
pub enum DidError {
    /// The DID does not use the `did:key` method with a base58btc key.
    #[error("unsupported DID method: {0}")]
    UnsupportedMethod(String),

    /// The multibase payload could not be decoded.
    #[error("invalid DID encoding: {0}")]
    InvalidEncoding(String),

    /// The embedded key is not an ed25519 key.
    #[error("unsupported key type in DID: {0}")]
    UnsupportedKeyType(String),

    /// The embedded bytes are not a valid ed25519 public key.
    #[error("invalid ed25519 public key in DID: {0}")]
    InvalidKey(String),
}
