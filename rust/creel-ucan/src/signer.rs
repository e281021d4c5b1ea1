//! Ed25519 signing identities.

use crate::did::Did;
use ed25519_dalek::{Signature, SigningKey};
use signature::Signer as _;
use thiserror::Error;

/// An entity identified by a [`Did`].
///
/// Implemented by anything that has a DID — bare DIDs, signers, etc.
/// Does not imply any cryptographic capability.
pub trait Principal {
    /// Returns this entity's DID.
    fn did(&self) -> &Did;
}

impl Principal for Did {
    fn did(&self) -> &Did {
        self
    }
}

/// An ed25519 `did:key` signer.
///
/// Wraps an [`ed25519_dalek::SigningKey`] together with its derived DID.
#[derive(Debug, Clone)]
pub struct Ed25519Signer {
    did: Did,
    key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a new keypair from the system RNG.
    ///
    /// # Errors
    ///
    /// Returns a [`SignerError`] if the RNG fails.
    pub fn generate() -> Result<Self, SignerError> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed).map_err(|e| SignerError::Rng(e.to_string()))?;
        Ok(Self::from_seed(&seed))
    }

    /// Construct a signer from a 32-byte seed.
    #[must_use]
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        SigningKey::from_bytes(seed).into()
    }

    /// Import a signer from exported seed bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`SignerError`] if the seed is not exactly 32 bytes.
    pub fn import(seed: &[u8]) -> Result<Self, SignerError> {
        let seed: &[u8; 32] = seed
            .try_into()
            .map_err(|_| SignerError::InvalidSeed(seed.len()))?;
        Ok(Self::from_seed(seed))
    }

    /// Export the seed bytes of this signer.
    #[must_use]
    pub fn export(&self) -> [u8; 32] {
        self.key.to_bytes()
    }

    /// Sign a message with this key.
    #[must_use]
    pub fn sign(&self, msg: &[u8]) -> Signature {
        self.key.sign(msg)
    }
}

impl From<SigningKey> for Ed25519Signer {
    fn from(key: SigningKey) -> Self {
        let did = Did::from(&key.verifying_key());
        Self { did, key }
    }
}

impl Principal for Ed25519Signer {
    fn did(&self) -> &Did {
        &self.did
    }
}

impl std::fmt::Display for Ed25519Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.did)
    }
}

/// Errors produced when creating an [`Ed25519Signer`].
#[derive(Debug, Clone, Error)]
pub enum SignerError {
    /// The system RNG failed.
    #[error("random number generation failed: {0}")]
    Rng(String),

    /// The provided seed has the wrong length.
    #[error("invalid seed length: expected 32 bytes, got {0}")]
    InvalidSeed(usize),
}

#[cfg(test)]
mod tests {
    use super::*;
    use signature::Verifier as _;
    use testresult::TestResult;

    #[test]
    fn it_signs_verifiably() -> TestResult {
        let signer = Ed25519Signer::from_seed(&[42; 32]);
        let msg = b"a message worth signing";
        let sig = signer.sign(msg);
        let key = signer.did().verifying_key()?;
        key.verify(msg, &sig)?;
        assert!(key.verify(b"a different message", &sig).is_err());
        Ok(())
    }

    #[test]
    fn export_import_round_trip_preserves_did() -> TestResult {
        let signer = Ed25519Signer::generate()?;
        let restored = Ed25519Signer::import(&signer.export())?;
        assert_eq!(signer.did(), restored.did());
        Ok(())
    }

    #[test]
    fn it_rejects_short_seeds() {
        assert!(Ed25519Signer::import(&[1, 2, 3]).is_err());
    }
}
