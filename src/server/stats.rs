//! Server Statistics Module

use serde::Serialize;

// == Server Stats ==
#[derive(Debug, Clone, Default, Serialize)]
pub struct ServerStats {
    pub cache_name: String,
    /// Sessions currently admitted
    pub connected_clients: usize,
    /// Keys with at least one holder
    pub tracked_keys: usize,
    /// Invalidation messages delivered to clients
    pub invalidations_sent: u64,
    /// Keys dropped because their deadline passed
    pub expirations: u64,
    /// Handshakes refused (namespace mismatch or duplicate identity)
    pub rejected_handshakes: u64,
}

impl ServerStats {
    pub fn new(cache_name: impl Into<String>) -> Self {
        Self {
            cache_name: cache_name.into(),
            ..Self::default()
        }
    }
}
