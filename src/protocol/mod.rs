//! Protocol Module
//!
//! Messages exchanged between cache clients and the cache server, plus the
//! key contract shared by both ends.

mod messages;

pub use messages::Message;

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{CacheError, Result};

// == Key Validation ==
/// Checks a key (or prefix) against the key contract.
///
/// The only requirement is that keys are non-empty; length is not bounded.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("Key cannot be empty".to_string()));
    }
    Ok(())
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
///
/// Expiry deadlines on the wire use this clock.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
