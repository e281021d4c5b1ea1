//! Builder for [`Invocation`]s.

use super::{Invocation, InvocationPayload};
use crate::{
    command::Command,
    did::Did,
    envelope::{BuildError, Envelope},
    nonce::Nonce,
    signer::{Ed25519Signer, Principal},
    time::Timestamp,
};
use ipld_core::{cid::Cid, ipld::Ipld};
use std::collections::BTreeMap;

/// Incrementally assembles and signs an [`Invocation`].
///
/// `issuer`, `subject` and `command` are required.
#[derive(Debug, Clone, Default)]
pub struct InvocationBuilder {
    issuer: Option<Ed25519Signer>,
    audience: Option<Did>,
    subject: Option<Did>,
    command: Option<Command>,
    arguments: BTreeMap<String, Ipld>,
    proofs: Vec<Cid>,
    expiration: Option<Timestamp>,
    meta: Option<BTreeMap<String, Ipld>>,
    nonce: Option<Nonce>,
}

impl InvocationBuilder {
    /// Creates a blank builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The signer issuing (and signing) the invocation.
    #[must_use]
    pub fn issuer(mut self, issuer: Ed25519Signer) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// The principal the invocation is addressed to, when it differs
    /// from the subject.
    #[must_use]
    pub fn audience(mut self, audience: Did) -> Self {
        self.audience = Some(audience);
        self
    }

    /// The subject the command operates on.
    #[must_use]
    pub fn subject(mut self, subject: Did) -> Self {
        self.subject = Some(subject);
        self
    }

    /// The invoked command.
    #[must_use]
    pub fn command(mut self, command: Command) -> Self {
        self.command = Some(command);
        self
    }

    /// The command arguments.
    #[must_use]
    pub fn arguments(mut self, arguments: BTreeMap<String, Ipld>) -> Self {
        self.arguments = arguments;
        self
    }

    /// Links to the delegation proofs authorizing this invocation.
    #[must_use]
    pub fn proofs(mut self, proofs: Vec<Cid>) -> Self {
        self.proofs = proofs;
        self
    }

    /// When the invocation expires.
    #[must_use]
    pub fn expiration(mut self, expiration: Timestamp) -> Self {
        self.expiration = Some(expiration);
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

    /// Sign and produce the invocation.
    ///
    /// # Errors
    ///
    /// Returns a [`BuildError`] when a required field is missing, nonce
    /// generation fails, or the payload cannot be encoded for signing.
    pub fn try_build(self) -> Result<Invocation, BuildError> {
        let issuer = self.issuer.ok_or(BuildError::MissingField("issuer"))?;
        let payload = InvocationPayload {
            issuer: issuer.did().clone(),
            audience: self.audience,
            subject: self.subject.ok_or(BuildError::MissingField("subject"))?,
            command: self.command.ok_or(BuildError::MissingField("command"))?,
            arguments: self.arguments,
            proofs: self.proofs,
            expiration: self.expiration,
            meta: self.meta,
            nonce: match self.nonce {
                Some(nonce) => nonce,
                None => Nonce::generate()?,
            },
        };
        Ok(Invocation(Envelope::sign(payload, &issuer)?))
    }
}
