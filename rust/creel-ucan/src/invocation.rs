//! UCAN Invocation.
//!
//! A signed request to execute a capability, referencing the delegation
//! proofs that authorize it.

pub mod builder;

use crate::{
    codec::CodecError,
    command::Command,
    did::Did,
    envelope::{Envelope, PayloadTag, SignatureVerificationError},
    nonce::Nonce,
    time::Timestamp,
};
use ed25519_dalek::Signature;
use ipld_core::{cid::Cid, ipld::Ipld};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Request to perform a UCAN-authorized action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Invocation(Envelope<InvocationPayload>);

impl Invocation {
    /// Creates a blank [`InvocationBuilder`][builder::InvocationBuilder].
    #[must_use]
    pub fn builder() -> builder::InvocationBuilder {
        builder::InvocationBuilder::new()
    }

    /// Getter for the `issuer` field.
    #[must_use]
    pub const fn issuer(&self) -> &Did {
        &self.payload().issuer
    }

    /// Getter for the `audience` field.
    /// Returns the subject if no explicit audience was set.
    #[must_use]
    pub fn audience(&self) -> &Did {
        self.payload().audience.as_ref().unwrap_or(self.subject())
    }

    /// Getter for the `subject` field.
    #[must_use]
    pub const fn subject(&self) -> &Did {
        &self.payload().subject
    }

    /// Getter for the `command` field.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.payload().command
    }

    /// Getter for the `arguments` field.
    #[must_use]
    pub const fn arguments(&self) -> &BTreeMap<String, Ipld> {
        &self.payload().arguments
    }

    /// The arguments as a single IPLD map value, for policy evaluation
    /// and typed decoding.
    #[must_use]
    pub fn arguments_ipld(&self) -> Ipld {
        Ipld::Map(self.payload().arguments.clone())
    }

    /// Getter for the `proofs` field.
    #[must_use]
    pub const fn proofs(&self) -> &Vec<Cid> {
        &self.payload().proofs
    }

    /// Getter for the `expiration` field.
    #[must_use]
    pub const fn expiration(&self) -> Option<Timestamp> {
        self.payload().expiration
    }

    /// Getter for the `meta` field. Returns an empty map when meta is absent.
    #[must_use]
    pub fn meta(&self) -> &BTreeMap<String, Ipld> {
        static EMPTY: BTreeMap<String, Ipld> = BTreeMap::new();
        self.payload().meta.as_ref().unwrap_or(&EMPTY)
    }

    /// Getter for the `nonce` field.
    #[must_use]
    pub const fn nonce(&self) -> &Nonce {
        &self.payload().nonce
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

    /// Compute the content-derived link for this invocation. This link
    /// also names the task the invocation requests.
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

    const fn payload(&self) -> &InvocationPayload {
        self.0.payload()
    }
}

/// The unsigned content of an [`Invocation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvocationPayload {
    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub(crate) audience: Option<Did>,

    #[serde(rename = "sub")]
    pub(crate) subject: Did,

    #[serde(rename = "cmd")]
    pub(crate) command: Command,

    #[serde(rename = "args")]
    pub(crate) arguments: BTreeMap<String, Ipld>,

    #[serde(rename = "prf")]
    pub(crate) proofs: Vec<Cid>,

    #[serde(rename = "exp", default)]
    pub(crate) expiration: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<BTreeMap<String, Ipld>>,

    pub(crate) nonce: Nonce,
}

impl PayloadTag for InvocationPayload {
    fn spec_id() -> &'static str {
        "inv"
    }
}
