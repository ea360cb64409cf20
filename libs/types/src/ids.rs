//! Order identifier type
//!
//! Replay feeds supply 64-bit integer ids; ids minted by a book are drawn
//! from a per-book monotonic counter. `0` is reserved as the null sentinel
//! returned by rejected submissions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(u64);

impl OrderId {
    /// Sentinel id for rejected submissions and feed rows without an id.
    pub const NULL: OrderId = OrderId(0);

    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }

    /// Check whether this is the null sentinel.
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for OrderId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}
