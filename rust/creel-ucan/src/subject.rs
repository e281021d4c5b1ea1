//! UCAN Subject type.

use crate::did::Did;
use serde::{Deserialize, Serialize, ser::Serializer};
use std::fmt::Display;

/// The Subject of a delegation.
///
/// This represents the authority a delegation is scoped to. To allow for
/// powerline delegation (a node in the auth graph that is a mere proxy
/// for ANY capability), the wildcard `Any` may be used.
///
/// Since it is so powerful, only use `Any` directly if you know what
/// you're doing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subject {
    /// A specific subject (recommended)
    Specific(Did),

    /// A wildcard subject (specialized use case)
    Any,
}

impl Subject {
    /// Check that the [`Subject`] either matches the given DID, or is `Any`.
    #[must_use]
    pub fn allows(&self, subject: &Did) -> bool {
        match self {
            Subject::Specific(did) => did == subject,
            Subject::Any => true,
        }
    }

    /// The specific DID, when there is one.
    #[must_use]
    pub const fn as_specific(&self) -> Option<&Did> {
        match self {
            Subject::Specific(did) => Some(did),
            Subject::Any => None,
        }
    }
}

impl From<Did> for Subject {
    fn from(subject: Did) -> Self {
        Subject::Specific(subject)
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Subject::Specific(did) => Display::fmt(did, f),
            Subject::Any => "null".fmt(f),
        }
    }
}

impl Serialize for Subject {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Subject::Specific(did) => did.serialize(serializer),
            Subject::Any => serializer.serialize_none(),
        }
    }
}

impl<'de> Deserialize<'de> for Subject {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<Did>::deserialize(deserializer)? {
            Some(did) => Subject::Specific(did),
            None => Subject::Any,
        })
    }
}
