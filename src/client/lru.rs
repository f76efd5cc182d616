//! LRU Tracker Module
//!
//! Tracks local access order so a bounded entry store can evict the least
//! recently used key.

use std::collections::VecDeque;

// == LRU Tracker ==
/// Access order of the keys in a bounded entry store.
///
/// - Front = most recently written or read
/// - Back = next in line for eviction
#[derive(Debug, Default)]
pub struct LruTracker {
    /// Keys by last access, each present at most once
    order: VecDeque<String>,
}

impl LruTracker {
    // == Constructor ==
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used.
    ///
    /// A key already tracked is moved to the front rather than duplicated.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.order.push_front(key.to_string());
    }

    // == Remove ==
    /// Stops tracking a key. Unknown keys are ignored.
    pub fn remove(&mut self, key: &str) {
        self.order.retain(|k| k != key);
    }

    // == Evict Oldest ==
    /// Removes and returns the least recently used key.
    ///
    /// Returns None if nothing is tracked.
    pub fn evict_oldest(&mut self) -> Option<String> {
        self.order.pop_back()
    }

    // == Clear ==
    /// Forgets every key, used when the whole store is flushed.
    pub fn clear(&mut self) {
        self.order.clear();
    }

    // == Length ==
    /// Returns the number of tracked keys.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
