//! Client Module
//!
//! The client side of the cache: a local entry store with age-based expiry,
//! and the [`CacheClient`] that keeps it coherent with the server.

mod backoff;
mod cache_client;
mod entry;
mod lru;
mod stats;
mod store;

pub use backoff::Backoff;
pub use cache_client::{CacheClient, ConnectionState};
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use stats::ClientStats;
pub use store::{EntryStore, Lookup};
