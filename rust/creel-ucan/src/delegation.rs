//! UCAN Delegation.
//!
//! A delegation grants a command over a subject from an issuer to an
//! audience, optionally bounded by policy predicates and a validity
//! window. Delegations are immutable once signed.

pub mod builder;

use crate::{
    codec::CodecError,
    command::Command,
    did::Did,
    envelope::{Envelope, PayloadTag, SignatureVerificationError},
    nonce::Nonce,
    policy::Predicate,
    subject::Subject,
    time::Timestamp,
};
use ed25519_dalek::Signature;
use ipld_core::{cid::Cid, ipld::Ipld};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Grant or delegate a UCAN capability to another principal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Delegation(Envelope<DelegationPayload>);

impl Delegation {
    /// Creates a blank [`DelegationBuilder`][builder::DelegationBuilder].
    #[must_use]
    pub fn builder() -> builder::DelegationBuilder {
        builder::DelegationBuilder::new()
    }

    /// Getter for the `issuer` field.
    #[must_use]
    pub const fn issuer(&self) -> &Did {
        &self.payload().issuer
    }

    /// Getter for the `audience` field.
    #[must_use]
    pub const fn audience(&self) -> &Did {
        &self.payload().audience
    }

    /// Getter for the `subject` field.
    #[must_use]
    pub const fn subject(&self) -> &Subject {
        &self.payload().subject
    }

    /// Getter for the `command` field.
    #[must_use]
    pub const fn command(&self) -> &Command {
        &self.payload().command
    }

    /// Getter for the `policy` field.
    #[must_use]
    pub const fn policy(&self) -> &Vec<Predicate> {
        &self.payload().policy
    }

    /// Getter for the `expiration` field. `None` means the delegation
    /// never expires.
    #[must_use]
    pub const fn expiration(&self) -> Option<Timestamp> {
        self.payload().expiration
    }

    /// Getter for the `not_before` field.
    #[must_use]
    pub const fn not_before(&self) -> Option<Timestamp> {
        self.payload().not_before
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

    /// Whether the delegation's validity window has already closed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expiration().is_some_and(Timestamp::is_past)
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

    /// Compute the content-derived link for this delegation.
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

    const fn payload(&self) -> &DelegationPayload {
        self.0.payload()
    }
}

/// The unsigned content of a [`Delegation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationPayload {
    #[serde(rename = "iss")]
    pub(crate) issuer: Did,

    #[serde(rename = "aud")]
    pub(crate) audience: Did,

    #[serde(rename = "sub")]
    pub(crate) subject: Subject,

    #[serde(rename = "cmd")]
    pub(crate) command: Command,

    #[serde(rename = "pol")]
    pub(crate) policy: Vec<Predicate>,

    #[serde(rename = "exp", default)]
    pub(crate) expiration: Option<Timestamp>,

    #[serde(rename = "nbf", default, skip_serializing_if = "Option::is_none")]
    pub(crate) not_before: Option<Timestamp>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) meta: Option<BTreeMap<String, Ipld>>,

    pub(crate) nonce: Nonce,
}

impl PayloadTag for DelegationPayload {
    fn spec_id() -> &'static str {
        "dlg"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signer::{Ed25519Signer, Principal};
    use pretty_assertions::assert_eq;
    use testresult::TestResult;

    fn test_signer(seed: u8) -> Ed25519Signer {
        Ed25519Signer::from_seed(&[seed; 32])
    }

    #[test]
    fn it_builds_with_the_requested_fields() -> TestResult {
        let iss = test_signer(1);
        let aud = test_signer(2).did().clone();
        let sub = test_signer(3).did().clone();

        let delegation = Delegation::builder()
            .issuer(iss.clone())
            .audience(aud.clone())
            .subject(Subject::Specific(sub.clone()))
            .command(Command::try_from("/blob/add")?)
            .try_build()?;

        assert_eq!(delegation.issuer(), iss.did());
        assert_eq!(delegation.audience(), &aud);
        assert_eq!(delegation.subject(), &Subject::Specific(sub));
        assert_eq!(delegation.command().to_string(), "/blob/add");
        assert_eq!(delegation.expiration(), None);
        assert!(delegation.meta().is_empty());
        Ok(())
    }

    #[test]
    fn it_round_trips_through_dagcbor() -> TestResult {
        let iss = test_signer(4);
        let delegation = Delegation::builder()
            .issuer(iss)
            .audience(test_signer(5).did().clone())
            .subject(Subject::Any)
            .command(Command::top())
            .meta([("name".to_string(), Ipld::String("homework".into()))].into())
            .try_build()?;

        let bytes = delegation.to_bytes()?;
        let decoded: Delegation = crate::codec::decode(&bytes)?;
        assert_eq!(decoded, delegation);
        assert_eq!(decoded.to_link()?, delegation.to_link()?);
        assert_eq!(decoded.meta().get("name"), Some(&Ipld::String("homework".into())));
        Ok(())
    }

    #[test]
    fn the_signature_verifies_and_binds_the_payload() -> TestResult {
        let iss = test_signer(6);
        let delegation = Delegation::builder()
            .issuer(iss)
            .audience(test_signer(7).did().clone())
            .subject(Subject::Any)
            .command(Command::try_from("/blob")?)
            .try_build()?;

        delegation.verify_signature()?;
        Ok(())
    }

    #[test]
    fn distinct_nonces_give_distinct_links() -> TestResult {
        let iss = test_signer(8);
        let build = || {
            Delegation::builder()
                .issuer(iss.clone())
                .audience(test_signer(9).did().clone())
                .subject(Subject::Any)
                .command(Command::top())
                .try_build()
        };
        assert_ne!(build()?.to_link()?, build()?.to_link()?);
        Ok(())
    }
}
