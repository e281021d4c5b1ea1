//! UCAN Receipt.
//!
//! A receipt is a signed attestation that a task — named by the link of
//! its invocation — completed with a given outcome.

use crate::{
    codec::CodecError,
    did::Did,
    envelope::{BuildError, Envelope, PayloadTag, SignatureVerificationError},
    nonce::Nonce,
    signer::{Ed25519Signer, Principal},
};
use ed25519_dalek::Signature;
use ipld_core::{cid::Cid, ipld::Ipld};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The result a task completed with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// The task succeeded with the given value.
    Ok(Ipld),

    /// The task failed with the given value.
    Err(Ipld),
}

impl Outcome {
    /// An empty successful outcome.
    #[must_use]
    pub fn ok_empty() -> Self {
        Outcome::Ok(Ipld::Map(BTreeMap::new()))
    }

    /// The success value, when there is one.
    #[must_use]
    pub const fn as_ok(&self) -> Option<&Ipld> {
        match self {
            Outcome::Ok(value) => Some(value),
            Outcome::Err(_) => None,
        }
    }
}

/// Signed attestation of a task's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Receipt(Envelope<ReceiptPayload>);

impl Receipt {
    /// Issue a receipt for the task named by `ran`, signed by `issuer`.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] if nonce generation or payload encoding
    /// fails.
    pub fn issue(issuer: &Ed25519Signer, ran: Cid, out: Outcome) -> Result<Self, BuildError> {
        let payload = ReceiptPayload {
            issuer: issuer.did().clone(),
            ran,
            out,
            meta: None,
            nonce: Nonce::generate()?,
        };
        Ok(Receipt(Envelope::sign(payload, issuer)?))
    }

    /// Getter for the `issuer` field.
    #[must_use]
    pub const fn issuer(&self) -> &Did {
        &self.payload().issuer
    }

    /// The link of the task this receipt completes.
    #[must_use]
    pub const fn ran(&self) -> &Cid {
        &self.payload().ran
    }

    /// Getter for the `out` field.
    #[must_use]
    pub const fn out(&self) -> &Outcome {
        &self.payload().out
    }

    /// Getter for the `meta` field. Returns an empty map when meta is absent.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, Ipld> {
        static EMPTY: BTreeMap<String, Ipld> = BTreeMap::new();
        self.payload().meta.as_ref().unwrap_or(&EMPTY)
    }

    /// The envelope signature.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        self.0.signature()
    }

    /// Encode to DAG-CBOR wire bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        self.0.to_bytes()
    }

    /// Compute the content-derived link for this receipt.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding fails.
    pub fn to_link(&self) -> Result<Cid, CodecError> {
        self.0.to_link()
    }

    /// Verify the issuer's signature.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureVerificationError`] if verification fails.
    pub fn verify_signature(&self) -> Result<(), SignatureVerificationError> {
        self.0.verify_signature(self.issuer())
    }

    const fn payload(&self) -> &ReceiptPayload {
        self.0.payload()
    }
}

/// The unsigned content of a [`Receipt`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptPayload {
    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    pub(crate) ran: Cid,

    pub(crate) out: Outcome,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<BTreeMap<String, Ipld>>,

    pub(crate) nonce: Nonce,
}

impl PayloadTag for ReceiptPayload {
    fn spec_id() -> &'static str {
        "rcpt"
    }
}
