//! Cache Entry Module
//!
//! Defines a locally cached entry and its age-based expiry rules.

use crate::protocol::current_timestamp_ms;

// == Cache Entry ==
/// A single locally cached value with its write timestamp.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The stored value
    pub value: Vec<u8>,
    /// Last put of this key (Unix milliseconds)
    pub last_written_at: u64,
    /// Absolute expiry deadline (Unix milliseconds), None = no deadline
    pub expire_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry stamped with the current time.
    pub fn new(value: Vec<u8>, expire_at: Option<u64>) -> Self {
        Self::written_at(value, expire_at, current_timestamp_ms())
    }

    pub(crate) fn written_at(value: Vec<u8>, expire_at: Option<u64>, now: u64) -> Self {
        Self {
            value,
            last_written_at: now,
            expire_at,
        }
    }

    // == Is Expired ==
    /// Checks whether the entry must no longer be served at `now`.
    ///
    /// An entry is expired when it is strictly older than `max_age_ms`
    /// (0 disables the age bound), or when its own deadline has been reached.
    pub fn is_expired_at(&self, now: u64, max_age_ms: u64) -> bool {
        let too_old = max_age_ms > 0 && now.saturating_sub(self.last_written_at) > max_age_ms;
        let past_deadline = matches!(self.expire_at, Some(deadline) if now >= deadline);
        too_old || past_deadline
    }

    /// Checks expiry against the current time.
    pub fn is_expired(&self, max_age_ms: u64) -> bool {
        self.is_expired_at(current_timestamp_ms(), max_age_ms)
    }

    /// Age of the entry in milliseconds.
    pub fn age_ms(&self) -> u64 {
        current_timestamp_ms().saturating_sub(self.last_written_at)
    }
}
