//! UCAN Container format utilities.
//!
//! A container is the wire unit for exchanging token bundles:
//!
//! ```text
//! { "ctn-v1": [token_bytes_0, token_bytes_1, ..., token_bytes_n] }
//! ```
//!
//! Tokens are DAG-CBOR serialized UCANs. Their envelope payload tag
//! makes each token's kind self-describing, so a container can mix
//! delegations, invocations and receipts.

use crate::{
    codec::{self, CodecError},
    delegation::Delegation,
    invocation::Invocation,
    receipt::Receipt,
};
use ipld_core::ipld::Ipld;
use std::collections::BTreeMap;

/// UCAN Container version key
pub const CONTAINER_VERSION: &str = "ctn-v1";

/// A UCAN container holding a sequence of DAG-CBOR encoded tokens.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Container {
    tokens: Vec<Vec<u8>>,
}

impl Container {
    /// Create a new container with the given token bytes.
    #[must_use]
    pub fn new(tokens: Vec<Vec<u8>>) -> Self {
        Self { tokens }
    }

    /// Append an encoded token.
    pub fn push(&mut self, token: Vec<u8>) {
        self.tokens.push(token);
    }

    /// Get the tokens in this container.
    #[must_use]
    pub fn tokens(&self) -> &[Vec<u8>] {
        &self.tokens
    }

    /// Consume the container and return the tokens.
    #[must_use]
    pub fn into_tokens(self) -> Vec<Vec<u8>> {
        self.tokens
    }

    /// Get the number of tokens in the container.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Check if the container is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Parse a container from DAG-CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the bytes are not a map carrying a
    /// byte-string list under [`CONTAINER_VERSION`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let map: BTreeMap<String, Ipld> = codec::decode(bytes)?;
        let tokens_ipld = map.get(CONTAINER_VERSION).ok_or_else(|| {
            CodecError::Decode(format!("container is missing the {CONTAINER_VERSION:?} key"))
        })?;
        let Ipld::List(tokens) = tokens_ipld else {
            return Err(CodecError::Decode(
                "container tokens must be a list".to_string(),
            ));
        };
        let mut token_bytes = Vec::with_capacity(tokens.len());
        for (i, token) in tokens.iter().enumerate() {
            let Ipld::Bytes(bytes) = token else {
                return Err(CodecError::Decode(format!("token {i} must be bytes")));
            };
            token_bytes.push(bytes.clone());
        }
        Ok(Self {
            tokens: token_bytes,
        })
    }

    /// Serialize the container to DAG-CBOR bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let tokens: Vec<Ipld> = self.tokens.iter().cloned().map(Ipld::Bytes).collect();
        let mut map: BTreeMap<String, Ipld> = BTreeMap::new();
        map.insert(CONTAINER_VERSION.to_string(), Ipld::List(tokens));
        codec::encode(&map)
    }

    /// Decode every token in the container, dispatching on payload tags.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if any token fails to decode.
    pub fn decode_tokens(&self) -> Result<Vec<Token>, CodecError> {
        self.tokens.iter().map(|t| Token::decode(t)).collect()
    }
}

/// Any token kind a container may carry.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A delegation token.
    Delegation(Delegation),

    /// An invocation token.
    Invocation(Invocation),

    /// A receipt token.
    Receipt(Receipt),
}

impl Token {
    /// Decode a token from envelope bytes, dispatching on its payload tag.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] when the bytes are not a tagged envelope
    /// or carry an unknown tag.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let kind = sniff_tag(bytes)?;
        match kind.as_str() {
            "dlg" => Ok(Token::Delegation(codec::decode(bytes)?)),
            "inv" => Ok(Token::Invocation(codec::decode(bytes)?)),
            "rcpt" => Ok(Token::Receipt(codec::decode(bytes)?)),
            _ => Err(CodecError::Decode(format!("unknown token kind {kind:?}"))),
        }
    }
}

/// Extract the token kind from an envelope's payload tag without fully
/// decoding the payload.
fn sniff_tag(bytes: &[u8]) -> Result<String, CodecError> {
    let ipld: Ipld = codec::decode(bytes)?;
    let Ipld::List(elements) = ipld else {
        return Err(CodecError::Decode("token must be a 2-element list".into()));
    };
    let Some(Ipld::Map(inner)) = elements.get(1) else {
        return Err(CodecError::Decode("token payload must be a map".into()));
    };
    let tag = inner
        .keys()
        .find_map(|key| key.strip_prefix("ucan/"))
        .ok_or_else(|| CodecError::Decode("token payload carries no tag".into()))?;
    let kind = tag.split('@').next().unwrap_or_default();
    Ok(kind.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        command::Command,
        receipt::Outcome,
        signer::{Ed25519Signer, Principal},
        subject::Subject,
    };
    use testresult::TestResult;

    #[test]
    fn it_round_trips_through_bytes() -> TestResult {
        let original = vec![vec![1, 2, 3], vec![4, 5, 6], vec![7, 8, 9]];
        let container = Container::new(original.clone());
        let parsed = Container::from_bytes(&container.to_bytes()?)?;
        assert_eq!(parsed.tokens(), &original[..]);
        Ok(())
    }

    #[test]
    fn it_fails_on_missing_version_key() -> TestResult {
        let mut map: BTreeMap<String, Ipld> = BTreeMap::new();
        map.insert("wrong-key".to_string(), Ipld::List(vec![]));
        let bytes = codec::encode(&map)?;
        let result = Container::from_bytes(&bytes);
        assert!(result.is_err_and(|e| e.to_string().contains(CONTAINER_VERSION)));
        Ok(())
    }

    #[test]
    fn mixed_tokens_decode_to_their_kinds() -> TestResult {
        let signer = Ed25519Signer::from_seed(&[40; 32]);
        let delegation = Delegation::builder()
            .issuer(signer.clone())
            .audience(signer.did().clone())
            .subject(Subject::Any)
            .command(Command::top())
            .try_build()?;
        let invocation = Invocation::builder()
            .issuer(signer.clone())
            .subject(signer.did().clone())
            .command(Command::try_from("/blob/add")?)
            .try_build()?;
        let receipt = Receipt::issue(&signer, invocation.to_link()?, Outcome::ok_empty())?;

        let container = Container::new(vec![
            invocation.to_bytes()?,
            delegation.to_bytes()?,
            receipt.to_bytes()?,
        ]);
        let tokens = Container::from_bytes(&container.to_bytes()?)?.decode_tokens()?;
        assert!(matches!(tokens[0], Token::Invocation(_)));
        assert!(matches!(tokens[1], Token::Delegation(_)));
        assert!(matches!(tokens[2], Token::Receipt(_)));
        Ok(())
    }

    #[test]
    fn garbage_tokens_are_rejected() {
        assert!(Token::decode(&[1, 2, 3, 4]).is_err());
    }
}
