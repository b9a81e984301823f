//! Expiration policy for cached entities and index entries.

use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Absolute expiry of a cached copy.
///
/// Persisted as epoch seconds, with `0` reserved for "never expires".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum Expiration {
    Never,
    At(i64),
}

impl Expiration {
    /// An entry is expired only when the clock has moved past its deadline.
    pub fn is_expired(self, now: i64) -> bool {
        match self {
            Expiration::Never => false,
            Expiration::At(deadline) => now > deadline,
        }
    }
}

impl From<i64> for Expiration {
    fn from(value: i64) -> Self {
        if value == 0 {
            Expiration::Never
        } else {
            Expiration::At(value)
        }
    }
}

impl From<Expiration> for i64 {
    fn from(value: Expiration) -> Self {
        match value {
            Expiration::Never => 0,
            Expiration::At(deadline) => deadline,
        }
    }
}

/// Compute the expiration for a copy written at `now`.
///
/// Returns `None` when caching is disabled: the caller must not cache.
pub fn compute_expiration(ttl_seconds: u64, caching_enabled: bool, now: i64) -> Option<Expiration> {
    if !caching_enabled {
        return None;
    }
    if ttl_seconds == 0 {
        return Some(Expiration::Never);
    }
    let ttl = i64::try_from(ttl_seconds).unwrap_or(i64::MAX);
    Some(Expiration::At(now.saturating_add(ttl)))
}

/// Source of the current time in epoch seconds.
pub trait Clock: Send + Sync {
    fn now(&self) -> i64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        OffsetDateTime::now_utc().unix_timestamp()
    }
}

/// Hand-driven clock for deterministic expiry.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: i64) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
