//! Client Session Module
//!
//! Server-side record of one admitted connection.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::network::MessageSender;
use crate::protocol::Message;

// == Client Session ==
#[derive(Debug)]
pub struct ClientSession {
    pub client_id: String,
    pub cache_name: String,
    pub connected_at: DateTime<Utc>,
    /// Identifies the connection, so messages from a superseded connection
    /// with the same client id can be told apart
    pub session_id: u64,
    sender: MessageSender,
}

impl ClientSession {
    pub fn new(session_id: u64, client_id: String, cache_name: String, sender: MessageSender) -> Self {
        Self {
            client_id,
            cache_name,
            connected_at: Utc::now(),
            session_id,
            sender,
        }
    }

    pub fn send(&self, message: Message) -> Result<()> {
        self.sender.send(message)
    }

    /// False once the connection behind this session has gone away.
    pub fn is_live(&self) -> bool {
        !self.sender.is_closed()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            client_id: self.client_id.clone(),
            connected_at: self.connected_at,
        }
    }
}

/// Public view of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionInfo {
    pub client_id: String,
    pub connected_at: DateTime<Utc>,
}
