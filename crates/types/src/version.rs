//! State versions: the store's logical clock.
//!
//! One state version is assigned per committed ledger transaction by the
//! upstream transaction source, strictly increasing and never reused.
//! Version 0 is reserved as "before anything"; the first ingested version
//! becomes the store's genesis.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Monotonically increasing identifier of a committed ledger transaction.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StateVersion(u64);

impl StateVersion {
    /// Creates a version from a raw value.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw numeric value.
    #[inline]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The next version in sequence.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The previous version, or `None` at version 0.
    #[inline]
    pub const fn pred(self) -> Option<Self> {
        match self.0.checked_sub(1) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl From<u64> for StateVersion {
    #[inline]
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<StateVersion> for u64 {
    #[inline]
    fn from(version: StateVersion) -> Self {
        version.0
    }
}

impl fmt::Display for StateVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sv:{}", self.0)
    }
}

impl std::str::FromStr for StateVersion {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Selects which committed state a read should observe.
///
/// `Latest` resolves to the store tip at the start of the read transaction;
/// `AtVersion` pins an explicit past version. Resolution from timestamps or
/// epochs happens upstream of the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerStateSelector {
    /// The most recently ingested state version.
    Latest,
    /// An explicit, previously committed state version.
    AtVersion(StateVersion),
}
