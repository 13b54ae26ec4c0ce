//! Type-safe identifiers.
//!
//! Query ids correlate answers arriving on a shared connection with the
//! subscription that asked for them. They are process-local, monotonically
//! increasing, and unique among the subscriptions active on one transport.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ============================================================================
// QueryId
// ============================================================================

/// Per-subscription correlation token.
///
/// Allocated by the transport at subscribe time, starting from 1 on every
/// connect. Rendered as a decimal string on the wire since the `graphql-ws`
/// protocol carries string ids.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct QueryId(u64);

impl QueryId {
    /// Creates a query id from a raw value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueryId {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

impl From<u64> for QueryId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

// ============================================================================
// Tests
// ============================================================================
