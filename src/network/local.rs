//! In-process loopback transport.
//!
//! A [`LocalHub`] plays the role of a listening address: the server takes an
//! acceptor from it, clients take locators. Installing a new acceptor replaces
//! the previous one, which lets a stopped server be replaced by a fresh one on
//! the same hub.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{ChannelAcceptor, Connection, ServerLocator};
use crate::error::{CacheError, Result};

type PendingSender = mpsc::UnboundedSender<Connection>;

#[derive(Debug, Default)]
struct HubInner {
    pending: Mutex<Option<PendingSender>>,
    next_id: AtomicU64,
}

/// Loopback rendezvous point shared by one server and its clients.
#[derive(Debug, Clone, Default)]
pub struct LocalHub {
    inner: Arc<HubInner>,
}

impl LocalHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs a new acceptor, replacing any previous one.
    pub fn acceptor(&self) -> LocalAcceptor {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut pending) = self.inner.pending.lock() {
            *pending = Some(tx);
        }
        LocalAcceptor { incoming: rx }
    }

    /// Returns a locator connecting to whichever acceptor is installed.
    pub fn locator(&self) -> LocalServerLocator {
        LocalServerLocator { hub: self.clone() }
    }
}

/// Client-side handle of a [`LocalHub`].
#[derive(Debug, Clone)]
pub struct LocalServerLocator {
    hub: LocalHub,
}

#[async_trait]
impl ServerLocator for LocalServerLocator {
    async fn connect(&self) -> Result<Connection> {
        let id = self.hub.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (client_end, server_end) =
            Connection::pair("local-server", format!("local-client-{}", id));

        let pending = self
            .hub
            .inner
            .pending
            .lock()
            .map_err(|_| CacheError::Internal("local hub lock poisoned".to_string()))?;
        match pending.as_ref() {
            Some(tx) => tx
                .send(server_end)
                .map_err(|_| CacheError::ConnectionRefused("no local acceptor".to_string()))?,
            None => {
                return Err(CacheError::ConnectionRefused(
                    "no local acceptor".to_string(),
                ))
            }
        }

        Ok(client_end)
    }
}

/// Server-side handle of a [`LocalHub`].
#[derive(Debug)]
pub struct LocalAcceptor {
    incoming: mpsc::UnboundedReceiver<Connection>,
}

#[async_trait]
impl ChannelAcceptor for LocalAcceptor {
    async fn accept(&mut self) -> Result<Connection> {
        self.incoming.recv().await.ok_or(CacheError::ChannelClosed)
    }
}
