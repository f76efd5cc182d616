//! Server Module
//!
//! The coordinating side of the cache: admits client sessions, tracks which
//! client holds which key, and broadcasts invalidations.

mod cache_server;
mod coordinator;
mod registry;
mod session;
mod stats;

pub use cache_server::CacheServer;
pub use coordinator::ServerHandle;
pub use registry::Registry;
pub use session::{ClientSession, SessionInfo};
pub use stats::ServerStats;
