//! Error types for the cache client and server
//!
//! Provides unified error handling using thiserror.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the cache client and server.
///
/// Only `InvalidKey` is surfaced to callers of the client API. The
/// connection-related variants are absorbed by the reconnect loop on the
/// client and by session teardown on the server.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key (or prefix) violates the key contract
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The peer side of a channel has gone away
    #[error("Channel closed")]
    ChannelClosed,

    /// No server is accepting connections at the locator
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// The server refused the handshake
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// The handshake did not complete in time
    #[error("Handshake timed out")]
    HandshakeTimeout,

    /// Socket level failure
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed frame on the wire
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The server's coordinator has stopped, or was never started
    #[error("Cache server is not running")]
    ServerNotRunning,

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

// == IntoResponse Implementation ==
impl IntoResponse for CacheError {
    fn into_response(self) -> Response {
        let status = match &self {
            CacheError::InvalidKey(_) => StatusCode::BAD_REQUEST,
            CacheError::ChannelClosed
            | CacheError::ConnectionRefused(_)
            | CacheError::HandshakeRejected(_)
            | CacheError::HandshakeTimeout
            | CacheError::ServerNotRunning => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string()
        }));

        (status, body).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for the cache crate.
pub type Result<T> = std::result::Result<T, CacheError>;
