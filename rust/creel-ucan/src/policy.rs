//! Delegation policy predicates.
//!
//! A policy is a list of predicates over the arguments of an eventual
//! invocation. The client only ever constructs equality predicates
//! (optionally grouped under `and`), which is also all the remote
//! services are expected to evaluate for the upload protocol.
//!
//! Wire form is an IPLD list: `["==", <selector>, <value>]` and
//! `["and", [<predicate>, ...]]`.

use ipld_core::ipld::Ipld;
use serde::{Deserialize, Serialize, ser::SerializeSeq};
use std::fmt::{self, Display};
use thiserror::Error;

/// A policy predicate over invocation arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// The selected argument must equal the given value exactly.
    Equal(Selector, Ipld),

    /// Every inner predicate must hold.
    And(Vec<Predicate>),
}

impl Predicate {
    /// Convenience constructor for an equality predicate.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] when the selector is malformed.
    pub fn equal(selector: &str, value: impl Into<Ipld>) -> Result<Self, PolicyError> {
        Ok(Predicate::Equal(Selector::parse(selector)?, value.into()))
    }

    /// Evaluate this predicate against invocation arguments.
    ///
    /// A selector that resolves to nothing fails the predicate.
    #[must_use]
    pub fn run(&self, args: &Ipld) -> bool {
        match self {
            Predicate::Equal(selector, value) => selector.select(args) == Some(value),
            Predicate::And(predicates) => predicates.iter().all(|p| p.run(args)),
        }
    }
}

impl Serialize for Predicate {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Predicate::Equal(selector, value) => {
                let mut seq = serializer.serialize_seq(Some(3))?;
                seq.serialize_element("==")?;
                seq.serialize_element(&selector.to_string())?;
                seq.serialize_element(value)?;
                seq.end()
            }
            Predicate::And(predicates) => {
                let mut seq = serializer.serialize_seq(Some(2))?;
                seq.serialize_element("and")?;
                seq.serialize_element(predicates)?;
                seq.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for Predicate {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ipld = Ipld::deserialize(deserializer)?;
        Predicate::try_from(&ipld).map_err(serde::de::Error::custom)
    }
}

impl TryFrom<&Ipld> for Predicate {
    type Error = PolicyError;

    fn try_from(ipld: &Ipld) -> Result<Self, Self::Error> {
        let Ipld::List(items) = ipld else {
            return Err(PolicyError::NotAList);
        };
        let Some(Ipld::String(op)) = items.first() else {
            return Err(PolicyError::MissingOperator);
        };
        match (op.as_str(), &items[1..]) {
            ("==", [Ipld::String(selector), value]) => Ok(Predicate::Equal(
                Selector::parse(selector)?,
                value.clone(),
            )),
            ("and", [Ipld::List(inner)]) => Ok(Predicate::And(
                inner
                    .iter()
                    .map(Predicate::try_from)
                    .collect::<Result<_, _>>()?,
            )),
            (op, _) => Err(PolicyError::UnknownOperator(op.to_string())),
        }
    }
}

/// A dotted path into invocation arguments, e.g. `.blob.digest`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector(Vec<String>);

impl Selector {
    /// Parse a selector from its dotted string form.
    ///
    /// `.` alone selects the whole argument map.
    ///
    /// # Errors
    ///
    /// Returns a [`PolicyError`] when the selector does not start with a
    /// dot or contains an empty path segment.
    pub fn parse(s: &str) -> Result<Self, PolicyError> {
        let rest = s
            .strip_prefix('.')
            .ok_or_else(|| PolicyError::InvalidSelector(s.to_string()))?;
        if rest.is_empty() {
            return Ok(Selector(Vec::new()));
        }
        let segments: Vec<String> = rest.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(PolicyError::InvalidSelector(s.to_string()));
        }
        Ok(Selector(segments))
    }

    /// Resolve this selector against a value, if the path exists.
    #[must_use]
    pub fn select<'a>(&self, value: &'a Ipld) -> Option<&'a Ipld> {
        let mut current = value;
        for segment in &self.0 {
            match current {
                Ipld::Map(map) => current = map.get(segment)?,
                _ => return None,
            }
        }
        Some(current)
    }
}

impl Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for segment in &self.0 {
            write!(f, ".{segment}")?;
        }
        Ok(())
    }
}

/// Errors produced when parsing or constructing policy predicates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// A predicate was not encoded as a list.
    #[error("predicate must be a list")]
    NotAList,

    /// A predicate list did not start with an operator string.
    #[error("predicate is missing its operator")]
    MissingOperator,

    /// The operator is not one this client understands.
    #[error("unknown predicate operator: {0:?}")]
    UnknownOperator(String),

    /// A selector string was malformed.
    #[error("invalid selector: {0:?}")]
    InvalidSelector(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_ipld_dagcbor::{from_slice, to_vec};
    use std::collections::BTreeMap;
    use testresult::TestResult;

    fn args() -> Ipld {
        let mut blob = BTreeMap::new();
        blob.insert("digest".to_string(), Ipld::Bytes(vec![0x12, 0x20, 0xaa]));
        blob.insert("size".to_string(), Ipld::Integer(3));
        let mut map = BTreeMap::new();
        map.insert("blob".to_string(), Ipld::Map(blob));
        Ipld::Map(map)
    }

    #[test]
    fn equality_over_nested_fields() -> TestResult {
        let digest = Predicate::equal(".blob.digest", Ipld::Bytes(vec![0x12, 0x20, 0xaa]))?;
        let size = Predicate::equal(".blob.size", 3)?;
        let both = Predicate::And(vec![digest.clone(), size]);
        assert!(digest.run(&args()));
        assert!(both.run(&args()));

        let wrong = Predicate::equal(".blob.size", 4)?;
        assert!(!wrong.run(&args()));
        assert!(!Predicate::And(vec![digest, wrong]).run(&args()));
        Ok(())
    }

    #[test]
    fn missing_paths_fail_the_predicate() -> TestResult {
        let p = Predicate::equal(".blob.owner", Ipld::String("nobody".into()))?;
        assert!(!p.run(&args()));
        Ok(())
    }

    #[test]
    fn it_round_trips_through_dagcbor() -> TestResult {
        let p = Predicate::And(vec![
            Predicate::equal(".blob.digest", Ipld::Bytes(vec![1, 2, 3]))?,
            Predicate::equal(".blob.size", 3)?,
        ]);
        let bytes = to_vec(&p)?;
        let decoded: Predicate = from_slice(&bytes)?;
        assert_eq!(decoded, p);
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_operators() {
        let ipld = Ipld::List(vec![
            Ipld::String(">=".into()),
            Ipld::String(".size".into()),
            Ipld::Integer(1),
        ]);
        assert_eq!(
            Predicate::try_from(&ipld),
            Err(PolicyError::UnknownOperator(">=".into()))
        );
    }

    #[test]
    fn selectors_parse_and_display() -> TestResult {
        assert_eq!(Selector::parse(".")?.to_string(), ".");
        assert_eq!(Selector::parse(".blob.digest")?.to_string(), ".blob.digest");
        assert!(Selector::parse("blob").is_err());
        assert!(Selector::parse("..blob").is_err());
        Ok(())
    }
}
