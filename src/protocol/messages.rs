//! Wire messages
//!
//! Every frame on a channel is one `Message`. The TCP transport encodes them
//! as one JSON object per line, tagged by `type`.

use serde::{Deserialize, Serialize};

/// A single protocol message.
///
/// Direction is noted on each variant. Values never travel to the server:
/// a put only announces the key and its optional expiry deadline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Message {
    /// client -> server, first frame of every connection
    Handshake { client_id: String, cache_name: String },

    /// server -> client, answer to `Handshake`
    HandshakeAck {
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },

    /// client -> server, the sender now holds a fresh copy of `key`
    PutNotify {
        key: String,
        /// Absolute expiry deadline in Unix milliseconds
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expire_at: Option<u64>,
    },

    /// server -> client, drop the local copy of `key`
    Invalidate { key: String },

    /// server -> client, drop every local key starting with `prefix`
    InvalidatePrefix { prefix: String },

    /// client -> server, evict `key` from every other client
    InvalidateRequest { key: String },

    /// client -> server, evict every key starting with `prefix` from every other client
    InvalidatePrefixRequest { prefix: String },

    /// client -> server, the sender no longer holds these keys
    Unregister { keys: Vec<String> },

    /// either direction, graceful close
    Disconnect,
}

impl Message {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Handshake { .. } => "HANDSHAKE",
            Message::HandshakeAck { .. } => "HANDSHAKE_ACK",
            Message::PutNotify { .. } => "PUT_NOTIFY",
            Message::Invalidate { .. } => "INVALIDATE",
            Message::InvalidatePrefix { .. } => "INVALIDATE_PREFIX",
            Message::InvalidateRequest { .. } => "INVALIDATE_REQUEST",
            Message::InvalidatePrefixRequest { .. } => "INVALIDATE_PREFIX_REQUEST",
            Message::Unregister { .. } => "UNREGISTER",
            Message::Disconnect => "DISCONNECT",
        }
    }
}
