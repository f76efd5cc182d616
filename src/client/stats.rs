//! Client Statistics Module
//!
//! Counters describing how the local entry store has been used.

use serde::Serialize;

// == Client Stats ==
/// Snapshot of a client's local cache counters, returned by
/// `CacheClient::stats`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ClientStats {
    /// Reads that returned a value
    pub hits: u64,
    /// Reads that found nothing (absent or expired)
    pub misses: u64,
    /// Entries dropped because they aged out
    pub expirations: u64,
    /// Entries dropped to respect the local capacity
    pub evictions: u64,
    /// Invalidations pushed by the server
    pub invalidations_received: u64,
    /// Current number of local entries
    pub total_entries: usize,
}

impl ClientStats {
    // == Constructor ==
    /// Creates a zeroed set of counters.
    pub fn new() -> Self {
        Self::default()
    }

    // == Hit Rate ==
    /// Returns hits / (hits + misses), or 0.0 before any read.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    // == Recorders ==
    /// Records a read that returned a value.
    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    /// Records a read that returned nothing.
    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    /// Records `count` entries dropped for age or deadline.
    pub fn record_expirations(&mut self, count: usize) {
        self.expirations += count as u64;
    }

    /// Records one entry dropped to make room.
    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    /// Records one invalidation pushed by the server, whether or not the
    /// key was present locally.
    pub fn record_invalidation(&mut self) {
        self.invalidations_received += 1;
    }

    /// Updates the current entry count.
    pub fn set_total_entries(&mut self, count: usize) {
        self.total_entries = count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_new() {
        let stats = ClientStats::new();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = ClientStats::new();
        for _ in 0..3 {
            stats.record_hit();
        }
        stats.record_miss();
        assert!((stats.hit_rate() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_counters() {
        let mut stats = ClientStats::new();
        stats.record_expirations(4);
        stats.record_eviction();
        stats.record_invalidation();
        stats.record_invalidation();
        stats.set_total_entries(7);

        assert_eq!(stats.expirations, 4);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.invalidations_received, 2);
        assert_eq!(stats.total_entries, 7);
    }
}
