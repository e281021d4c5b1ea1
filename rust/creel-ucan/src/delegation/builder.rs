//! Builder for [`Delegation`]s.

use super::{Delegation, DelegationPayload};
use crate::{
    command::Command,
    did::Did,
    envelope::{BuildError, Envelope},
    nonce::Nonce,
    policy::Predicate,
    signer::{Ed25519Signer, Principal},
    subject::Subject,
    time::Timestamp,
};
use ipld_core::ipld::Ipld;
use std::collections::BTreeMap;

/// Incrementally assembles and signs a [`Delegation`].
///
/// `issuer`, `audience`, `subject` and `command` are required; the
/// delegation defaults to an empty policy and no expiration.
#[derive(Debug, Clone, Default)]
pub struct DelegationBuilder {
    issuer: Option<Ed25519Signer>,
    audience: Option<Did>,
    subject: Option<Subject>,
    command: Option<Command>,
    policy: Vec<Predicate>,
    expiration: Option<Timestamp>,
    not_before: Option<Timestamp>,
    meta: Option<BTreeMap<String, Ipld>>,
    nonce: Option<Nonce>,
}

impl DelegationBuilder {
    /// Creates a blank builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The signer issuing (and signing) the delegation.
    #[must_use]
    pub fn issuer(mut self, issuer: Ed25519Signer) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// The principal the capability is granted to.
    #[must_use]
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    /// The subject the capability is scoped to.
    #[must_use]
    pub fn subject(mut self, subject: Subject) -> Self {
        self.subject = Some(subject);
        self
    }

    /// The granted command.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// Policy predicates constraining eventual invocations.
    #[must_use]
    pub fn policy(mut self, policy: Vec<Predicate>) -> Self {
        self.policy = policy;
        self
    }

    /// When the delegation expires. Unset means it never expires.
    #[must_use]
    pub fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// When the delegation becomes valid.
    #[must_use]
    pub fn not_before(mut self, not_before: Timestamp) -> Self {
        self.not_before = Some(not_before);
        self
    }

    /// Attach free-form metadata.
    #[must_use]
    pub fn meta(mut self, meta: BTreeMap<String, Ipld>) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Use an explicit nonce instead of a generated one.
    #[must_use]
    pub fn nonce(mut self, nonce: Nonce) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// Sign and produce the delegation.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when a required field is missing, nonce
    /// generation fails, or the payload cannot be encoded for signing.
    pub fn try_build(self) -> Result<Delegation, BuildError> {
        let issuer = self.issuer.ok_or(BuildError::MissingField("issuer"))?;
        let payload = DelegationPayload {
            issuer: issuer.did().clone(),
            audience: self.audience.ok_or(BuildError::MissingField("audience"))?,
            subject: self.subject.ok_or(BuildError::MissingField("subject"))?,
            command: self.command.ok_or(BuildError::MissingField("command"))?,
            policy: self.policy,
            expiration: self.expiration,
            not_before: self.not_before,
            meta: self.meta,
            nonce: match self.nonce {
                Some(nonce) => nonce,
                None => Nonce::generate()?,
            },
        };
        Ok(Delegation(Envelope::sign(payload, &issuer)?))
    }
}
