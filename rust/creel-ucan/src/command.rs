//! Hierarchical command names.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use thiserror::Error;

/// A hierarchical command name such as `/blob/add`.
///
/// Commands are stored as validated segments and rendered with `/`
/// separators; the empty segment list renders as `/`, the top command
/// that subsumes every other.
///
/// Segments may not contain `/` (the segment separator) or `~` (the
/// substitute the delegation index uses for `/` inside derived keys).
/// Closing the vocabulary here is what keeps distinct commands from
/// colliding after index-key sanitization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Command(Vec<String>);

impl Command {
    /// Construct a command from segments.
    ///
    /// # Errors
    ///
    /// Returns a [`CommandError`] when a segment is empty or contains a
    /// reserved character.
    pub fn new<I, S>(segments: I) -> Result<Self, CommandError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        for segment in &segments {
            if segment.is_empty() {
                return Err(CommandError::EmptySegment);
            }
            if let Some(c) = segment.chars().find(|c| matches!(c, '/' | '~')) {
                return Err(CommandError::ReservedCharacter(c));
            }
        }
        Ok(Command(segments))
    }

    /// Construct a command from segments known to be valid at compile time.
    ///
    /// # Panics
    ///
    /// Panics when a segment is invalid; only use with literal segments.
    #[must_use]
    pub fn from_static(segments: &[&str]) -> Self {
        Self::new(segments.iter().copied()).expect("static command segments are valid")
    }

    /// The top command `/`, which subsumes every other command.
    #[must_use]
    pub const fn top() -> Self {
        Command(Vec::new())
    }

    /// Whether this is the top command.
    #[must_use]
    pub fn is_top(&self) -> bool {
        self.0.is_empty()
    }

    /// The command segments.
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// This command followed by each of its parents, ending at the top
    /// command: `/blob/add` yields `/blob/add`, `/blob`, `/`.
    pub fn ancestors(&self) -> impl Iterator<Item = Command> + '_ {
        (0..=self.0.len())
            .rev()
            .map(|n| Command(self.0[..n].to_vec()))
    }

    /// Whether a delegation for this command grants `other`: equal to it
    /// or an ancestor of it.
    #[must_use]
    pub fn subsumes(&self, other: &Command) -> bool {
        other.0.len() >= self.0.len() && other.0[..self.0.len()] == self.0[..]
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("/");
        }
        for segment in &self.0 {
            write!(f, "/{segment}")?;
        }
        Ok(())
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        let rest = s.strip_prefix('/').ok_or(CommandError::MissingSlash)?;
        if rest.is_empty() {
            return Ok(Command::top());
        }
        Command::new(rest.split('/'))
    }
}

impl Serialize for Command {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Command {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Command::try_from(s.as_str()).map_err(serde::de::Error::custom)
    }
}

/// Errors produced when constructing a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CommandError {
    /// The string form did not start with `/`.
    #[error("command must start with '/'")]
    MissingSlash,

    /// A segment was empty.
    #[error("command segments may not be empty")]
    EmptySegment,

    /// A segment contained a reserved character.
    #[error("command segments may not contain {0:?}")]
    ReservedCharacter(char),
}

#[cfg(test)]
mod tests {
    use super::*;
    use testresult::TestResult;

    #[test]
    fn it_parses_and_displays() -> TestResult {
        let cmd = Command::try_from("/blob/add")?;
        assert_eq!(cmd.segments(), ["blob", "add"]);
        assert_eq!(cmd.to_string(), "/blob/add");
        assert_eq!(Command::try_from("/")?, Command::top());
        assert_eq!(Command::top().to_string(), "/");
        Ok(())
    }

    #[test]
    fn it_rejects_reserved_characters() {
        assert_eq!(
            Command::new(["blob~add"]),
            Err(CommandError::ReservedCharacter('~'))
        );
        assert!(Command::try_from("/blob~add").is_err());
        assert_eq!(Command::try_from("//add"), Err(CommandError::EmptySegment));
        assert_eq!(Command::try_from("blob"), Err(CommandError::MissingSlash));
    }

    #[test]
    fn ancestors_end_at_the_top() -> TestResult {
        let cmd = Command::try_from("/blob/add")?;
        let ancestors: Vec<String> = cmd.ancestors().map(|c| c.to_string()).collect();
        assert_eq!(ancestors, ["/blob/add", "/blob", "/"]);

        let top: Vec<String> = Command::top().ancestors().map(|c| c.to_string()).collect();
        assert_eq!(top, ["/"]);
        Ok(())
    }

    #[test]
    fn subsumption_follows_the_hierarchy() -> TestResult {
        let top = Command::top();
        let blob = Command::try_from("/blob")?;
        let add = Command::try_from("/blob/add")?;
        assert!(top.subsumes(&add));
        assert!(blob.subsumes(&add));
        assert!(add.subsumes(&add));
        assert!(!add.subsumes(&blob));
        Ok(())
    }
}
