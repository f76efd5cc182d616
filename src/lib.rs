//! Syncache - a coordinator-mediated in-memory cache
//!
//! Clients keep local copies of key/value entries. A central server tracks
//! which client holds which key and invalidates stale copies whenever a
//! client writes. Clients additionally drop entries older than a local TTL.

pub mod api;
pub mod client;
pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod server;
pub mod tasks;

pub use api::AppState;
pub use client::{CacheClient, ConnectionState};
pub use config::{ClientConfig, ServerConfig};
pub use error::{CacheError, Result};
pub use server::CacheServer;
