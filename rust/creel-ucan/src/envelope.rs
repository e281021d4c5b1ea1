//! Signed token envelopes.
//!
//! Every token kind shares one wire shape: a DAG-CBOR 2-tuple of the
//! issuer's signature and a tagged payload map,
//! `[signature, {"h": varsig-header, "<tag>": payload}]`. The tag makes
//! token kinds self-describing inside containers.

use crate::{
    codec::{self, CodecError},
    did::{Did, DidError},
    signer::Ed25519Signer,
};
use ed25519_dalek::Signature;
use ipld_core::{cid::Cid, ipld::Ipld};
use serde::{
    Deserialize, Serialize,
    de::{self, MapAccess, SeqAccess, Visitor},
    ser::{SerializeMap, SerializeTuple},
};
use signature::Verifier as _;
use std::{fmt, marker::PhantomData};
use thiserror::Error;

/// Varsig header for ed25519 signatures over DAG-CBOR payloads.
const VARSIG_HEADER: [u8; 3] = [0x34, 0xed, 0x71];

/// Identifies a payload kind on the wire.
pub trait PayloadTag {
    /// Short identifier of the token kind, e.g. `dlg`.
    fn spec_id() -> &'static str;

    /// Version of the payload layout.
    fn version() -> &'static str {
        "1.0.0"
    }

    /// The tag key under which the payload appears in the envelope.
    #[must_use]
    fn tag() -> String {
        format!("ucan/{}@{}", Self::spec_id(), Self::version())
    }
}

/// A signed envelope around a tagged payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    signature: Signature,
    payload: T,
}

impl<T: PayloadTag + Serialize> Envelope<T> {
    /// Sign a payload, producing an envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if the payload cannot be encoded for
    /// signing.
    pub fn sign(payload: T, issuer: &Ed25519Signer) -> Result<Self, CodecError> {
        let bytes = codec::encode(&TaggedPayload(&payload))?;
        let signature = issuer.sign(&bytes);
        Ok(Envelope { signature, payload })
    }

    /// The envelope signature.
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// The enclosed payload.
    #[must_use]
    pub const fn payload(&self) -> &T {
        &self.payload
    }

    /// Encode the whole envelope to its DAG-CBOR wire form.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        codec::encode(self)
    }

    /// Compute the content-derived link for this envelope.
    ///
    /// # Errors
    ///
    /// Returns a [`CodecError`] if encoding fails.
    pub fn to_link(&self) -> Result<Cid, CodecError> {
        Ok(codec::link_of(&self.to_bytes()?))
    }

    /// Verify the envelope signature against the given issuer DID.
    ///
    /// # Errors
    ///
    /// Returns a [`SignatureVerificationError`] if the payload cannot be
    /// re-encoded, the DID does not carry a usable key, or the signature
    /// does not verify.
    pub fn verify_signature(&self, issuer: &Did) -> Result<(), SignatureVerificationError> {
        let bytes = codec::encode(&TaggedPayload(&self.payload))
            .map_err(SignatureVerificationError::Encoding)?;
        let key = issuer
            .verifying_key()
            .map_err(SignatureVerificationError::Resolution)?;
        key.verify(&bytes, &self.signature)
            .map_err(SignatureVerificationError::Verification)
    }
}

/// The signed portion of an envelope: `{"h": header, "<tag>": payload}`.
struct TaggedPayload<'a, T>(&'a T);

impl<T: PayloadTag + Serialize> Serialize for TaggedPayload<'_, T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("h", serde_bytes::Bytes::new(&VARSIG_HEADER))?;
        map.serialize_entry(&T::tag(), self.0)?;
        map.end()
    }
}

impl<T: PayloadTag + Serialize> Serialize for Envelope<T> {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_tuple(2)?;
        seq.serialize_element(serde_bytes::Bytes::new(&self.signature.to_bytes()))?;
        seq.serialize_element(&TaggedPayload(&self.payload))?;
        seq.end()
    }
}

impl<'de, T: PayloadTag + Deserialize<'de>> Deserialize<'de> for Envelope<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EnvelopeVisitor<T>(PhantomData<T>);

        impl<'de, T: PayloadTag + Deserialize<'de>> Visitor<'de> for EnvelopeVisitor<T> {
            type Value = (Signature, T);

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a 2-element sequence [signature, payload]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let sig_ipld: Ipld = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let Ipld::Bytes(sig_bytes) = sig_ipld else {
                    return Err(de::Error::custom("expected signature to be bytes"));
                };
                let signature = Signature::from_slice(&sig_bytes)
                    .map_err(|_| de::Error::custom("invalid signature bytes"))?;

                let inner: InnerPayload<T> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;

                Ok((signature, inner.0))
            }
        }

        let (signature, payload) =
            deserializer.deserialize_tuple(2, EnvelopeVisitor::<T>(PhantomData))?;
        Ok(Envelope { signature, payload })
    }
}

/// Deserialization helper for the tagged payload map.
struct InnerPayload<T>(T);

impl<'de, T: PayloadTag + Deserialize<'de>> Deserialize<'de> for InnerPayload<T> {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct InnerVisitor<T>(PhantomData<T>);

        impl<'de, T: PayloadTag + Deserialize<'de>> Visitor<'de> for InnerVisitor<T> {
            type Value = InnerPayload<T>;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(r#"a map with "h" and a payload tag"#)
            }

            fn visit_map<M: MapAccess<'de>>(self, mut map: M) -> Result<Self::Value, M::Error> {
                let expected_tag = T::tag();
                let mut header_seen = false;
                let mut payload: Option<T> = None;

                while let Some(key) = map.next_key::<String>()? {
                    if key == "h" {
                        if header_seen {
                            return Err(de::Error::duplicate_field("h"));
                        }
                        let Ipld::Bytes(_) = map.next_value::<Ipld>()? else {
                            return Err(de::Error::custom("expected varsig header to be bytes"));
                        };
                        header_seen = true;
                    } else if key == expected_tag {
                        if payload.is_some() {
                            return Err(de::Error::custom("multiple payload fields"));
                        }
                        payload = Some(map.next_value()?);
                    } else {
                        return Err(de::Error::custom(format!(
                            "unexpected payload tag {key:?}, expected {expected_tag:?}"
                        )));
                    }
                }

                if !header_seen {
                    return Err(de::Error::missing_field("h"));
                }
                let payload = payload.ok_or_else(|| de::Error::custom("missing payload"))?;
                Ok(InnerPayload(payload))
            }
        }

        deserializer.deserialize_map(InnerVisitor::<T>(PhantomData))
    }
}

/// Error type for token builders.
#[derive(Debug, Error)]
pub enum BuildError {
    /// A required field was never set.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// Nonce generation failed.
    #[error(transparent)]
    Nonce(#[from] crate::nonce::NonceError),

    /// The payload could not be encoded for signing.
    #[error(transparent)]
    Encoding(#[from] CodecError),
}

/// Error type for envelope signature verification.
#[derive(Debug, Error)]
pub enum SignatureVerificationError {
    /// Payload encoding failed.
    #[error("encoding error: {0}")]
    Encoding(CodecError),

    /// The issuer DID does not carry a usable verifying key.
    #[error("resolution error: {0}")]
    Resolution(DidError),

    /// Cryptographic verification failed.
    #[error("verification error: {0}")]
    Verification(signature::Error),
}
