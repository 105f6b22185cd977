//! # stratum-types: Core types for Stratum
//!
//! Shared identifier types used across the Stratum workspace. The log, the
//! wire protocol, the server, and the client all address records by
//! [`Offset`], so the newtype lives in its own crate to keep the leaf crates
//! free of cross-dependencies.

use std::fmt::Display;
use std::ops::{Add, AddAssign, Sub};

use serde::{Deserialize, Serialize};

/// Position of a record within the log.
///
/// Offsets are dense and zero-indexed: the first record in a log has offset
/// 0, the second has offset 1, and so on. An offset is assigned exactly once
/// and never reused, even across restarts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Offset(u64);

impl Offset {
    pub const ZERO: Offset = Offset(0);

    pub fn new(offset: u64) -> Self {
        Self(offset)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// The offset immediately after this one.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Distance to an earlier offset, or `None` if `earlier` is ahead.
    pub fn distance_from(&self, earlier: Offset) -> Option<u64> {
        self.0.checked_sub(earlier.0)
    }
}

impl Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add<u64> for Offset {
    type Output = Self;
    fn add(self, rhs: u64) -> Self::Output {
        Self(self.0 + rhs)
    }
}

impl AddAssign<u64> for Offset {
    fn add_assign(&mut self, rhs: u64) {
        self.0 += rhs;
    }
}

impl Sub for Offset {
    type Output = u64;
    fn sub(self, rhs: Self) -> Self::Output {
        self.0 - rhs.0
    }
}

impl From<u64> for Offset {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Offset> for u64 {
    fn from(offset: Offset) -> Self {
        offset.0
    }
}
