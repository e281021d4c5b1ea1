//! Time utilities.
//!
//! The [`Timestamp`] struct is the main type for representing time in a
//! UCAN token: whole seconds since the unix epoch.

use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The current time.
    #[must_use]
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Timestamp(elapsed.as_secs())
    }

    /// A timestamp `duration` from now, saturating on overflow.
    #[must_use]
    pub fn from_now(duration: Duration) -> Self {
        Timestamp(Self::now().0.saturating_add(duration.as_secs()))
    }

    /// Construct from unix seconds.
    #[must_use]
    pub const fn from_unix(secs: u64) -> Self {
        Timestamp(secs)
    }

    /// Unix seconds.
    #[must_use]
    pub const fn to_unix(self) -> u64 {
        self.0
    }

    /// Whether this timestamp is strictly before the current time.
    #[must_use]
    pub fn is_past(self) -> bool {
        self < Self::now()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_now_is_in_the_future() {
        let later = Timestamp::from_now(Duration::from_secs(60));
        assert!(Timestamp::now() <= later);
        assert!(!later.is_past());
    }

    #[test]
    fn the_epoch_is_past() {
        assert!(Timestamp::from_unix(0).is_past());
    }
}
