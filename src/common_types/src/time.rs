// Copyright 2022 CeresDB Project Authors. Licensed under Apache-2.0.

//! Time types.

use std::fmt;

/// Unix timestamp in milliseconds.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp(0);

    pub const fn new(ts: i64) -> Self {
        Self(ts)
    }

    #[inline]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl From<i64> for Timestamp {
    fn from(ts: i64) -> Self {
        Self(ts)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
