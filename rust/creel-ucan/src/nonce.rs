//! Token nonces.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A random nonce distinguishing otherwise-identical tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nonce(#[serde(with = "serde_bytes")] Vec<u8>);

impl Nonce {
    /// Generate a 16-byte nonce from the system RNG.
    ///
    /// # Errors
    ///
    /// Returns a [`NonceError`] if the RNG fails.
    pub fn generate() -> Result<Self, NonceError> {
        let mut bytes = [0u8; 16];
        getrandom::getrandom(&mut bytes)?;
        Ok(Nonce(bytes.to_vec()))
    }

    /// The raw nonce bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Nonce {
    fn from(bytes: Vec<u8>) -> Self {
        Nonce(bytes)
    }
}

/// Error produced when nonce generation fails.
#[derive(Debug, Error)]
#[error("nonce generation failed: {0}")]
pub struct NonceError(#[from] getrandom::Error);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_nonces_differ() {
        let a = Nonce::generate().unwrap();
        let b = Nonce::generate().unwrap();
        assert_eq!(a.as_bytes().len(), 16);
        assert_ne!(a, b);
    }
}
