//! Network Module
//!
//! Transport-agnostic channel abstraction between one client and the server.
//!
//! A [`Connection`] is a pair of ordered, reliable message queues. The
//! receive side yields `None` once the peer is gone, which is how both ends
//! learn about closed connections. Concrete transports:
//! - [`local`]: in-process loopback, used by tests and embedded setups
//! - [`tcp`]: newline-delimited JSON over TCP

pub mod local;
pub mod tcp;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{CacheError, Result};
use crate::protocol::Message;

/// Receive half of a connection.
pub type MessageReceiver = mpsc::UnboundedReceiver<Message>;

// == Message Sender ==
/// Send half of a connection.
///
/// Sends are fire-and-forget: they never block and only fail once the peer
/// side has been dropped.
#[derive(Debug, Clone)]
pub struct MessageSender {
    inner: mpsc::UnboundedSender<Message>,
}

impl MessageSender {
    pub fn new(inner: mpsc::UnboundedSender<Message>) -> Self {
        Self { inner }
    }

    /// Queues a message for delivery.
    pub fn send(&self, message: Message) -> Result<()> {
        self.inner.send(message).map_err(|_| CacheError::ChannelClosed)
    }

    /// Returns true once the peer can no longer receive.
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }
}

// == Connection ==
/// One established channel.
#[derive(Debug)]
pub struct Connection {
    /// Human readable peer description for logs
    pub peer: String,
    pub sender: MessageSender,
    pub receiver: MessageReceiver,
}

impl Connection {
    /// Creates two connected ends, messages sent on one arrive on the other.
    pub fn pair(left_peer: impl Into<String>, right_peer: impl Into<String>) -> (Self, Self) {
        let (left_tx, left_rx) = mpsc::unbounded_channel();
        let (right_tx, right_rx) = mpsc::unbounded_channel();
        (
            Connection {
                peer: left_peer.into(),
                sender: MessageSender::new(right_tx),
                receiver: left_rx,
            },
            Connection {
                peer: right_peer.into(),
                sender: MessageSender::new(left_tx),
                receiver: right_rx,
            },
        )
    }
}

// == Transport Traits ==
/// Client-side capability: open a connection to the server.
#[async_trait]
pub trait ServerLocator: Send + Sync + 'static {
    async fn connect(&self) -> Result<Connection>;
}

/// Server-side capability: wait for the next incoming connection.
///
/// Returning an error stops the server's accept loop.
#[async_trait]
pub trait ChannelAcceptor: Send + 'static {
    async fn accept(&mut self) -> Result<Connection>;
}
