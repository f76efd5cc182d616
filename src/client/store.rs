//! Entry Store Module
//!
//! The client's local map of cached entries, with age-based expiry and an
//! optional LRU capacity bound.

use std::collections::HashMap;

use super::{CacheEntry, ClientStats, LruTracker};
use crate::error::Result;
use crate::protocol::{current_timestamp_ms, validate_key};

// == Lookup ==
/// Outcome of reading a key from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Hit(Vec<u8>),
    Miss,
    /// The entry had aged out and was evicted by this read
    Expired,
}

impl Lookup {
    pub fn into_value(self) -> Option<Vec<u8>> {
        match self {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss | Lookup::Expired => None,
        }
    }
}

// == Entry Store ==
/// Local key/value storage of one cache client.
///
/// Access order is only tracked when a capacity is configured, so an
/// unbounded store keeps O(1) reads and writes.
#[derive(Debug)]
pub struct EntryStore {
    entries: HashMap<String, CacheEntry>,
    lru: LruTracker,
    stats: ClientStats,
    /// Maximum local age in milliseconds, 0 = unbounded
    max_local_entry_age_ms: u64,
    /// Maximum number of entries, 0 = unbounded
    max_entries: usize,
}

impl EntryStore {
    // == Constructor ==
    /// Creates an empty store.
    ///
    /// # Arguments
    /// * `max_local_entry_age_ms` - Local TTL, 0 disables age expiry
    /// * `max_entries` - Capacity, 0 disables LRU eviction
    pub fn new(max_local_entry_age_ms: u64, max_entries: usize) -> Self {
        Self {
            entries: HashMap::new(),
            lru: LruTracker::new(),
            stats: ClientStats::new(),
            max_local_entry_age_ms,
            max_entries,
        }
    }

    // == Put ==
    /// Stores a value, overwriting any previous entry and restamping it.
    ///
    /// Returns the keys evicted to make room, so the caller can tell the
    /// server it no longer holds them.
    pub fn put(&mut self, key: &str, value: Vec<u8>, expire_at: Option<u64>) -> Result<Vec<String>> {
        self.put_at(key, value, expire_at, current_timestamp_ms())
    }

    fn put_at(
        &mut self,
        key: &str,
        value: Vec<u8>,
        expire_at: Option<u64>,
        now: u64,
    ) -> Result<Vec<String>> {
        validate_key(key)?;

        let mut evicted = Vec::new();
        if self.max_entries > 0 {
            if !self.entries.contains_key(key) {
                while self.entries.len() >= self.max_entries {
                    match self.lru.evict_oldest() {
                        Some(oldest) => {
                            self.entries.remove(&oldest);
                            self.stats.record_eviction();
                            evicted.push(oldest);
                        }
                        None => break,
                    }
                }
            }
            self.lru.touch(key);
        }

        self.entries
            .insert(key.to_string(), CacheEntry::written_at(value, expire_at, now));
        self.stats.set_total_entries(self.entries.len());
        Ok(evicted)
    }

    // == Get ==
    /// Returns the value if present and not expired.
    ///
    /// An entry found expired is evicted on the spot.
    pub fn get(&mut self, key: &str) -> Option<Vec<u8>> {
        self.lookup(key).into_value()
    }

    /// Like [`get`](Self::get), but tells an expired entry apart from a
    /// missing one so the caller can unregister the key.
    pub fn lookup(&mut self, key: &str) -> Lookup {
        self.lookup_at(key, current_timestamp_ms())
    }

    fn lookup_at(&mut self, key: &str, now: u64) -> Lookup {
        let expired = match self.entries.get(key) {
            Some(entry) => entry.is_expired_at(now, self.max_local_entry_age_ms),
            None => {
                self.stats.record_miss();
                return Lookup::Miss;
            }
        };

        if expired {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            self.stats.record_miss();
            return Lookup::Expired;
        }

        if self.max_entries > 0 {
            self.lru.touch(key);
        }
        self.stats.record_hit();
        match self.entries.get(key) {
            Some(entry) => Lookup::Hit(entry.value.clone()),
            None => Lookup::Miss,
        }
    }

    #[cfg(test)]
    fn get_at(&mut self, key: &str, now: u64) -> Option<Vec<u8>> {
        self.lookup_at(key, now).into_value()
    }

    // == Invalidate ==
    /// Removes the entry if present. Idempotent.
    ///
    /// Returns true if an entry was removed.
    pub fn invalidate_local(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    /// Applies an invalidation pushed by the server.
    pub fn apply_remote_invalidation(&mut self, key: &str) -> bool {
        self.stats.record_invalidation();
        self.remove_entry(key)
    }

    /// Applies a prefix invalidation pushed by the server.
    pub fn apply_remote_prefix_invalidation(&mut self, prefix: &str) -> usize {
        self.stats.record_invalidation();
        self.invalidate_prefix(prefix)
    }

    /// Removes every entry whose key starts with `prefix`.
    ///
    /// Returns the number of entries removed.
    pub fn invalidate_prefix(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .entries
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            self.remove_entry(key);
        }
        keys.len()
    }

    /// Drops every entry. Returns the keys removed.
    pub fn clear(&mut self) -> Vec<String> {
        let keys: Vec<String> = self.entries.drain().map(|(key, _)| key).collect();
        self.lru.clear();
        self.stats.set_total_entries(0);
        keys
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            if self.max_entries > 0 {
                self.lru.remove(key);
            }
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Cleanup Expired ==
    /// Removes all expired entries. Returns the keys removed.
    pub fn cleanup_expired(&mut self) -> Vec<String> {
        self.cleanup_expired_at(current_timestamp_ms())
    }

    fn cleanup_expired_at(&mut self, now: u64) -> Vec<String> {
        let max_age = self.max_local_entry_age_ms;
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now, max_age))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired_keys {
            self.remove_entry(key);
        }
        self.stats.record_expirations(expired_keys.len());
        expired_keys
    }

    // == Configuration ==
    /// Changes the local TTL. Existing write stamps are kept as they are.
    pub fn set_max_local_entry_age(&mut self, millis: u64) {
        self.max_local_entry_age_ms = millis;
    }

    pub fn max_local_entry_age(&self) -> u64 {
        self.max_local_entry_age_ms
    }

    // == Stats ==
    pub fn stats(&self) -> ClientStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.entries.len());
        stats
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
