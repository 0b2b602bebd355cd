use std::fmt;

use serde::{Deserialize, Serialize};

/// Discrete server tick. The host advances it at a fixed rate (20 TPS by default).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tick(pub u64);

impl Tick {
    /// First tick of any timeline.
    pub const ZERO: Self = Self(0);

    /// Advance by `delta` ticks, returning `None` on overflow.
    pub fn checked_add(self, delta: u64) -> Option<Self> {
        self.0.checked_add(delta).map(Self)
    }

    /// Advance by `delta` ticks, saturating at `u64::MAX`.
    pub fn saturating_add(self, delta: u64) -> Self {
        Self(self.0.saturating_add(delta))
    }

    /// The following tick.
    pub fn next(self) -> Self {
        self.saturating_add(1)
    }

    /// Ticks elapsed since `earlier` (0 if `earlier` is in the future).
    pub fn since(self, earlier: Tick) -> u64 {
        self.0.saturating_sub(earlier.0)
    }
}

impl From<u64> for Tick {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Tick {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tick {}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_counter() {
        assert!(Tick(1) < Tick(2));
        assert_eq!(Tick::ZERO, Tick(0));
        assert_eq!(Tick(41).next(), Tick(42));
    }

    #[test]
    fn checked_add_detects_overflow() {
        assert_eq!(Tick(10).checked_add(5), Some(Tick(15)));
        assert_eq!(Tick(u64::MAX).checked_add(1), None);
        assert_eq!(Tick(u64::MAX).saturating_add(1), Tick(u64::MAX));
    }

    #[test]
    fn since_saturates() {
        assert_eq!(Tick(20).since(Tick(5)), 15);
        assert_eq!(Tick(5).since(Tick(20)), 0);
    }

    #[test]
    fn display() {
        assert_eq!(Tick(7).to_string(), "tick 7");
    }
}
