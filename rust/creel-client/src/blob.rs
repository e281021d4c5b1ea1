//! The blob capability vocabulary.
//!
//! Commands, argument shapes and outcome shapes exchanged with the
//! upload service, plus the content digest type that names blobs.

use base58::ToBase58;
use creel_ucan::{Command, codec};
use ipld_core::cid::Cid;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use url::Url;

/// Multihash code for SHA-256.
const SHA256_CODE: u8 = 0x12;
/// SHA-256 digest length (32 bytes).
const SHA256_LEN: u8 = 0x20;

/// The command that starts an upload.
#[must_use]
pub fn add_command() -> Command {
    Command::from_static(&["blob", "add"])
}

/// The derived command the service uses to allocate space for a blob.
#[must_use]
pub fn allocate_command() -> Command {
    Command::from_static(&["blob", "allocate"])
}

/// The derived command the service uses to accept a transferred blob.
#[must_use]
pub fn accept_command() -> Command {
    Command::from_static(&["blob", "accept"])
}

/// The sub-invocation describing the physical transfer.
#[must_use]
pub fn http_put_command() -> Command {
    Command::from_static(&["http", "put"])
}

/// A SHA-256 content digest, serialized in multihash framing:
/// `<code><length><digest>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "MultihashBytes", try_from = "MultihashBytes")]
pub struct BlobDigest([u8; 32]);

/// Wrapper for multihash byte serialization.
#[derive(Serialize, Deserialize)]
#[serde(transparent)]
struct MultihashBytes(#[serde(with = "serde_bytes")] Vec<u8>);

impl BlobDigest {
    /// Digest a byte payload.
    #[must_use]
    pub fn digest(data: &[u8]) -> Self {
        BlobDigest(Sha256::digest(data).into())
    }

    /// The raw 32-byte digest.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// The multihash framing of the digest, as carried on the wire and
    /// inside policy predicates.
    #[must_use]
    pub fn to_multihash_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(2 + self.0.len());
        bytes.push(SHA256_CODE);
        bytes.push(SHA256_LEN);
        bytes.extend_from_slice(&self.0);
        bytes
    }

    /// The CID (v1, raw codec) naming the blob content.
    #[must_use]
    pub fn content_link(&self) -> Cid {
        codec::raw_link_of_digest(&self.0)
    }
}

impl From<BlobDigest> for MultihashBytes {
    fn from(digest: BlobDigest) -> Self {
        MultihashBytes(digest.to_multihash_bytes())
    }
}

impl TryFrom<MultihashBytes> for BlobDigest {
    type Error = String;

    fn try_from(bytes: MultihashBytes) -> Result<Self, Self::Error> {
        let bytes = bytes.0;
        if bytes.len() < 2 {
            return Err(format!(
                "multihash too short: expected at least 2 bytes, got {}",
                bytes.len()
            ));
        }
        if bytes[0] != SHA256_CODE {
            return Err(format!("unsupported multihash code: 0x{:02x}", bytes[0]));
        }
        if bytes[1] != SHA256_LEN || bytes.len() != 2 + SHA256_LEN as usize {
            return Err(format!(
                "SHA-256 digest must be {SHA256_LEN} bytes, got {}",
                bytes.len() - 2
            ));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes[2..]);
        Ok(BlobDigest(digest))
    }
}

impl std::fmt::Display for BlobDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Multibase base58btc of the multihash bytes.
        write!(f, "z{}", self.to_multihash_bytes().to_base58())
    }
}

/// A blob named by digest and size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    /// The blob's content digest.
    pub digest: BlobDigest,

    /// The blob's size in bytes.
    pub size: u64,
}

/// Arguments of a `/blob/add` invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddArguments {
    /// The blob being added.
    pub blob: Blob,
}

/// Successful outcome of a `/blob/add` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddOk {
    /// Reference to the asynchronous `/blob/accept` task whose receipt
    /// will carry the location commitment.
    pub site: TaskRef,
}

/// A reference to a task another receipt will complete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRef {
    /// The link of the referenced task.
    pub task: Cid,
}

/// Successful outcome of a `/blob/allocate` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocateOk {
    /// Where to PUT the bytes. Absent when the provider already holds
    /// the content and no transfer is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<BlobAddress>,
}

/// A write address for a physical transfer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlobAddress {
    /// The URL to PUT the bytes to.
    pub url: Url,

    /// Headers the provider requires on the PUT, verbatim.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Successful outcome of a `/blob/accept` task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptOk {
    /// Link of the location-commitment invocation delivered alongside
    /// the receipt.
    pub site: Cid,
}

/// Arguments of a location-commitment invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationArguments {
    /// The physical URLs the content is retrievable from.
    pub location: Vec<Url>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ipld_core::ipld::Ipld;
    use testresult::TestResult;

    #[test]
    fn digests_are_deterministic() {
        let a = BlobDigest::digest(b"hello world");
        let b = BlobDigest::digest(b"hello world");
        assert_eq!(a, b);
        assert_ne!(a, BlobDigest::digest(b"hello worlds"));
    }

    #[test]
    fn the_multihash_framing_round_trips() -> TestResult {
        let digest = BlobDigest::digest(b"hello world");
        let bytes = digest.to_multihash_bytes();
        assert_eq!(bytes[0], SHA256_CODE);
        assert_eq!(bytes[1], SHA256_LEN);
        assert_eq!(bytes.len(), 34);

        let ipld = ipld_core::serde::to_ipld(&digest)?;
        assert!(matches!(ipld, Ipld::Bytes(_)));
        let decoded: BlobDigest = ipld_core::serde::from_ipld(ipld)?;
        assert_eq!(decoded, digest);
        Ok(())
    }

    #[test]
    fn truncated_multihashes_are_rejected() {
        let short = MultihashBytes(vec![SHA256_CODE]);
        assert!(BlobDigest::try_from(short).is_err());

        let mut wrong_code = vec![0x99, SHA256_LEN];
        wrong_code.extend_from_slice(&[0u8; 32]);
        assert!(BlobDigest::try_from(MultihashBytes(wrong_code)).is_err());
    }

    #[test]
    fn the_content_link_uses_the_raw_codec() {
        let digest = BlobDigest::digest(b"some bytes");
        assert_eq!(digest.content_link().codec(), codec::RAW_CODE);
    }

    #[test]
    fn allocate_outcomes_tolerate_a_missing_address() -> TestResult {
        let ok: AllocateOk = ipld_core::serde::from_ipld(Ipld::Map(Default::default()))?;
        assert!(ok.address.is_none());
        Ok(())
    }
}
