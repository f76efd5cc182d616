//! Cache Client
//!
//! Serves reads and writes from the local [`EntryStore`] and keeps a
//! connection to the cache server alive in the background:
//!
//! ```text
//! DISCONNECTED -> CONNECTING -> CONNECTED -> DISCONNECTED ...
//!        \______________\____________\______-> CLOSED (after stop)
//! ```
//!
//! Reads never touch the network. Writes update the store first and then
//! notify the server if connected; notifications issued while disconnected
//! are dropped because every successful handshake starts from an empty store.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{Backoff, ClientStats, EntryStore, Lookup};
use crate::config::ClientConfig;
use crate::error::{CacheError, Result};
use crate::network::{MessageReceiver, MessageSender, ServerLocator};
use crate::protocol::{current_timestamp_ms, validate_key, Message};
use crate::tasks::spawn_sweep_task;

// == Connection State ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    /// Terminal, reached through [`CacheClient::stop`]
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
            ConnectionState::Closed => "CLOSED",
        };
        f.write_str(name)
    }
}

/// State shared between the public handle and the background tasks.
struct ClientInner {
    config: ClientConfig,
    locator: Arc<dyn ServerLocator>,
    store: Arc<RwLock<EntryStore>>,
    /// Present only while CONNECTED. Always locked after `store`.
    outbound: RwLock<Option<MessageSender>>,
    state: watch::Sender<ConnectionState>,
}

impl ClientInner {
    fn set_state(&self, next: ConnectionState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            debug!("Client {} state {} -> {}", self.config.client_id, previous, next);
        }
    }

    /// Sends a message if connected, silently dropping it otherwise.
    async fn notify(&self, message: Message) {
        let outbound = self.outbound.read().await;
        if let Some(sender) = outbound.as_ref() {
            if sender.send(message).is_err() {
                debug!("Client {} lost its channel while sending", self.config.client_id);
            }
        }
    }

    // == Handshake ==
    /// Opens a channel and performs the handshake.
    ///
    /// On acceptance the local store is flushed and the sender installed in a
    /// single critical section, so every entry written afterwards is announced
    /// to the server.
    async fn establish(&self) -> Result<MessageReceiver> {
        let connection = self.locator.connect().await?;
        let sender = connection.sender;
        let mut receiver = connection.receiver;

        sender.send(Message::Handshake {
            client_id: self.config.client_id.clone(),
            cache_name: self.config.cache_name.clone(),
        })?;

        let answer = tokio::time::timeout(self.config.handshake_timeout(), receiver.recv())
            .await
            .map_err(|_| CacheError::HandshakeTimeout)?;

        match answer {
            Some(Message::HandshakeAck { accepted: true, .. }) => {}
            Some(Message::HandshakeAck {
                accepted: false,
                reason,
            }) => {
                return Err(CacheError::HandshakeRejected(
                    reason.unwrap_or_else(|| "no reason given".to_string()),
                ))
            }
            Some(other) => {
                return Err(CacheError::HandshakeRejected(format!(
                    "unexpected {} during handshake",
                    other.kind()
                )))
            }
            None => return Err(CacheError::ChannelClosed),
        }

        {
            let mut store = self.store.write().await;
            let flushed = store.clear();
            if !flushed.is_empty() {
                info!(
                    "Client {} flushed {} local entries after connecting",
                    self.config.client_id,
                    flushed.len()
                );
            }
            *self.outbound.write().await = Some(sender);
        }
        self.set_state(ConnectionState::Connected);
        Ok(receiver)
    }

    // == Receive Loop ==
    /// Applies server pushes until the channel closes.
    async fn serve(&self, mut receiver: MessageReceiver) {
        while let Some(message) = receiver.recv().await {
            match message {
                Message::Invalidate { key } => {
                    let removed = self.store.write().await.apply_remote_invalidation(&key);
                    debug!(
                        "Client {} invalidated {} (present: {})",
                        self.config.client_id, key, removed
                    );
                }
                Message::InvalidatePrefix { prefix } => {
                    let removed = self
                        .store
                        .write()
                        .await
                        .apply_remote_prefix_invalidation(&prefix);
                    debug!(
                        "Client {} invalidated {} entries under prefix {}",
                        self.config.client_id, removed, prefix
                    );
                }
                Message::Disconnect => {
                    info!("Server asked client {} to disconnect", self.config.client_id);
                    break;
                }
                other => {
                    debug!(
                        "Client {} ignoring unexpected {}",
                        self.config.client_id,
                        other.kind()
                    );
                }
            }
        }
    }

    async fn on_disconnected(&self) {
        self.outbound.write().await.take();
        self.set_state(ConnectionState::Disconnected);
    }

    // == Connection Loop ==
    /// Connects, serves, and reconnects with capped exponential backoff.
    async fn run(self: Arc<Self>) {
        let mut backoff = Backoff::new(
            self.config.reconnect_initial_ms,
            self.config.reconnect_max_ms,
        );

        loop {
            self.set_state(ConnectionState::Connecting);
            match self.establish().await {
                Ok(receiver) => {
                    info!(
                        "Client {} connected to cache {}",
                        self.config.client_id, self.config.cache_name
                    );
                    backoff.reset();
                    self.serve(receiver).await;
                    warn!("Client {} disconnected", self.config.client_id);
                }
                Err(e) => {
                    warn!(
                        "Client {} connection attempt failed: {}",
                        self.config.client_id, e
                    );
                }
            }
            self.on_disconnected().await;

            let delay = backoff.next_delay();
            debug!(
                "Client {} reconnecting in {:?}",
                self.config.client_id, delay
            );
            tokio::time::sleep(delay).await;
        }
    }
}

// == Cache Client ==
/// One participant of a shared cache namespace.
pub struct CacheClient {
    inner: Arc<ClientInner>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheClient {
    // == Constructor ==
    /// Creates a client. Nothing happens on the network until [`start`](Self::start).
    pub fn new(config: ClientConfig, locator: impl ServerLocator) -> Self {
        let store = EntryStore::new(config.max_local_entry_age_ms, config.max_local_entries);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ClientInner {
                config,
                locator: Arc::new(locator),
                store: Arc::new(RwLock::new(store)),
                outbound: RwLock::new(None),
                state,
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // == Lifecycle ==
    /// Starts the connection loop and the local expiry sweep.
    ///
    /// Calling it again while running, or after [`stop`](Self::stop), does nothing.
    pub async fn start(&self) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() || self.state() == ConnectionState::Closed {
            return;
        }

        info!(
            "Starting cache client {} for cache {}",
            self.inner.config.client_id, self.inner.config.cache_name
        );
        tasks.push(tokio::spawn(self.inner.clone().run()));
        let inner = self.inner.clone();
        tasks.push(spawn_sweep_task(
            self.inner.store.clone(),
            self.inner.config.sweep_interval_ms,
            move |keys| {
                let inner = inner.clone();
                async move { inner.notify(Message::Unregister { keys }).await }
            },
        ));
    }

    /// Stops all background activity and closes the channel.
    ///
    /// The local store stays readable and writable, but no network activity
    /// happens once this returns.
    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        for handle in tasks.iter() {
            handle.abort();
        }
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }

        if let Some(sender) = self.inner.outbound.write().await.take() {
            let _ = sender.send(Message::Disconnect);
        }
        self.inner.set_state(ConnectionState::Closed);
        info!("Cache client {} stopped", self.inner.config.client_id);
    }

    /// Waits until the client is connected or `timeout` elapses.
    ///
    /// Returns false on timeout or if the client has been stopped.
    pub async fn wait_for_connection(&self, timeout: Duration) -> bool {
        let mut state = self.inner.state.subscribe();
        let reached = tokio::time::timeout(
            timeout,
            state.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Closed)),
        )
        .await;
        matches!(reached, Ok(Ok(ref s)) if **s == ConnectionState::Connected)
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    // == Put ==
    /// Stores a value locally and announces it to the server.
    ///
    /// # Arguments
    /// * `key` - Non-empty key
    /// * `value` - Bytes to cache
    /// * `ttl` - Optional lifetime; the server invalidates every copy once it passes
    pub async fn put(&self, key: &str, value: impl Into<Vec<u8>>, ttl: Option<Duration>) -> Result<()> {
        let expire_at = ttl.map(|ttl| current_timestamp_ms().saturating_add(ttl.as_millis() as u64));

        let mut store = self.inner.store.write().await;
        let evicted = store.put(key, value.into(), expire_at)?;

        // Sent while the store lock is held so a concurrent reconnect flush
        // cannot slip between the write and its announcement.
        let outbound = self.inner.outbound.read().await;
        if let Some(sender) = outbound.as_ref() {
            if !evicted.is_empty() {
                let _ = sender.send(Message::Unregister { keys: evicted });
            }
            let _ = sender.send(Message::PutNotify {
                key: key.to_string(),
                expire_at,
            });
        }
        Ok(())
    }

    // == Get ==
    /// Returns the locally cached value, or None if absent or expired.
    ///
    /// An entry found aged out is dropped and unregistered on the server.
    pub async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let mut store = self.inner.store.write().await;
        match store.lookup(key) {
            Lookup::Hit(value) => Some(value),
            Lookup::Miss => None,
            Lookup::Expired => {
                self.inner
                    .notify(Message::Unregister {
                        keys: vec![key.to_string()],
                    })
                    .await;
                None
            }
        }
    }

    // == Invalidate ==
    /// Drops the key locally and asks the server to drop it everywhere else.
    pub async fn invalidate(&self, key: &str) -> Result<()> {
        validate_key(key)?;
        self.inner.store.write().await.invalidate_local(key);
        self.inner
            .notify(Message::InvalidateRequest {
                key: key.to_string(),
            })
            .await;
        Ok(())
    }

    /// Drops every key starting with `prefix`, locally and on every other client.
    pub async fn invalidate_by_prefix(&self, prefix: &str) -> Result<()> {
        validate_key(prefix)?;
        self.inner.store.write().await.invalidate_prefix(prefix);
        self.inner
            .notify(Message::InvalidatePrefixRequest {
                prefix: prefix.to_string(),
            })
            .await;
        Ok(())
    }

    /// Drops every local entry and unregisters them on the server.
    ///
    /// Other clients keep their copies. Returns the number of entries dropped.
    pub async fn clear(&self) -> usize {
        let mut store = self.inner.store.write().await;
        let keys = store.clear();
        let count = keys.len();
        if count > 0 {
            self.inner.notify(Message::Unregister { keys }).await;
        }
        count
    }

    // == Configuration ==
    /// Changes the local TTL in milliseconds, 0 = unbounded.
    pub async fn set_max_local_entry_age(&self, millis: u64) {
        self.inner.store.write().await.set_max_local_entry_age(millis);
    }

    pub async fn max_local_entry_age(&self) -> u64 {
        self.inner.store.read().await.max_local_entry_age()
    }

    pub async fn stats(&self) -> ClientStats {
        self.inner.store.read().await.stats()
    }
}

impl fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheClient")
            .field("client_id", &self.inner.config.client_id)
            .field("cache_name", &self.inner.config.cache_name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::local::LocalHub;
    use crate::network::{ChannelAcceptor, Connection};

    fn test_config(id: &str) -> ClientConfig {
        ClientConfig::new(id, "ciao").with_reconnect_backoff(10, 50)
    }

    /// Accepts the client's channel and answers its handshake.
    async fn accept_client(acceptor: &mut impl ChannelAcceptor, client: &CacheClient) -> Connection {
        let mut server_end = acceptor.accept().await.unwrap();
        assert!(matches!(
            server_end.receiver.recv().await,
            Some(Message::Handshake { .. })
        ));
        server_end
            .sender
            .send(Message::HandshakeAck {
                accepted: true,
                reason: None,
            })
            .unwrap();
        assert!(client.wait_for_connection(Duration::from_secs(5)).await);
        server_end
    }

    #[tokio::test]
    async fn test_local_operations_without_server() {
        let hub = LocalHub::new();
        let client = CacheClient::new(test_config("c1"), hub.locator());

        client.put("pippo", "testdata", None).await.unwrap();
        assert_eq!(client.get("pippo").await, Some(b"testdata".to_vec()));

        client.invalidate("pippo").await.unwrap();
        assert_eq!(client.get("pippo").await, None);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_empty_key_rejected() {
        let hub = LocalHub::new();
        let client = CacheClient::new(test_config("c1"), hub.locator());

        assert!(matches!(
            client.put("", "v", None).await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            client.invalidate("").await,
            Err(CacheError::InvalidKey(_))
        ));
        assert!(matches!(
            client.invalidate_by_prefix("").await,
            Err(CacheError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_wait_for_connection_times_out() {
        let hub = LocalHub::new();
        let client = CacheClient::new(test_config("c1"), hub.locator());
        client.start().await;

        assert!(!client.wait_for_connection(Duration::from_millis(100)).await);

        client.stop().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_handshake_and_put_notify() {
        let hub = LocalHub::new();
        let mut acceptor = hub.acceptor();
        let client = CacheClient::new(test_config("c1"), hub.locator());
        client.start().await;

        let mut server_end = acceptor.accept().await.unwrap();
        assert_eq!(
            server_end.receiver.recv().await,
            Some(Message::Handshake {
                client_id: "c1".to_string(),
                cache_name: "ciao".to_string(),
            })
        );
        server_end
            .sender
            .send(Message::HandshakeAck {
                accepted: true,
                reason: None,
            })
            .unwrap();
        assert!(client.wait_for_connection(Duration::from_secs(5)).await);

        client.put("pippo", "testdata", None).await.unwrap();
        assert_eq!(
            server_end.receiver.recv().await,
            Some(Message::PutNotify {
                key: "pippo".to_string(),
                expire_at: None,
            })
        );

        server_end
            .sender
            .send(Message::Invalidate {
                key: "pippo".to_string(),
            })
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.get("pippo").await, None);
        assert_eq!(client.stats().await.invalidations_received, 1);

        client.stop().await;
        assert_eq!(server_end.receiver.recv().await, Some(Message::Disconnect));
    }

    #[tokio::test]
    async fn test_rejected_handshake_retries() {
        let hub = LocalHub::new();
        let mut acceptor = hub.acceptor();
        let client = CacheClient::new(test_config("c1"), hub.locator());
        client.start().await;

        let mut first = acceptor.accept().await.unwrap();
        first.receiver.recv().await.unwrap();
        first
            .sender
            .send(Message::HandshakeAck {
                accepted: false,
                reason: Some("cache name mismatch".to_string()),
            })
            .unwrap();
        drop(first);

        // The client backs off and tries again
        let mut second = acceptor.accept().await.unwrap();
        assert!(matches!(
            second.receiver.recv().await,
            Some(Message::Handshake { .. })
        ));
        assert_ne!(client.state(), ConnectionState::Connected);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_wait_for_connection_after_stop_returns_false() {
        let hub = LocalHub::new();
        let client = CacheClient::new(test_config("c1"), hub.locator());
        client.start().await;
        client.stop().await;

        assert!(!client.wait_for_connection(Duration::from_secs(5)).await);

        // Restarting a closed client is a no-op
        client.start().await;
        assert_eq!(client.state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_long_keys_accepted() {
        let hub = LocalHub::new();
        let client = CacheClient::new(test_config("c1"), hub.locator());
        let key = "x".repeat(300);

        client.put(&key, "v", None).await.unwrap();
        assert_eq!(client.get(&key).await, Some(b"v".to_vec()));
        client.invalidate(&key).await.unwrap();
        assert_eq!(client.get(&key).await, None);
    }

    #[tokio::test]
    async fn test_unanswered_handshake_times_out_and_retries() {
        let hub = LocalHub::new();
        let mut acceptor = hub.acceptor();
        let mut config = test_config("c1");
        config.handshake_timeout_ms = 100;
        let client = CacheClient::new(config, hub.locator());
        client.start().await;

        // Never answered, but kept open so only the timeout can end the attempt
        let mut silent = acceptor.accept().await.unwrap();
        assert!(matches!(
            silent.receiver.recv().await,
            Some(Message::Handshake { .. })
        ));

        let mut second = tokio::time::timeout(Duration::from_secs(5), acceptor.accept())
            .await
            .expect("client should retry after the handshake timeout")
            .unwrap();
        assert!(matches!(
            second.receiver.recv().await,
            Some(Message::Handshake { .. })
        ));
        assert_ne!(client.state(), ConnectionState::Connected);

        client.stop().await;
    }

    #[tokio::test]
    async fn test_aged_out_entry_is_unregistered() {
        let hub = LocalHub::new();
        let mut acceptor = hub.acceptor();
        let client = CacheClient::new(test_config("c1").with_max_local_entry_age(50), hub.locator());
        client.start().await;
        let mut server_end = accept_client(&mut acceptor, &client).await;

        client.put("pippo", "testdata", None).await.unwrap();
        assert!(matches!(
            server_end.receiver.recv().await,
            Some(Message::PutNotify { .. })
        ));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(client.get("pippo").await, None);

        // Reported exactly once, by whichever of the sweep or the read saw it first
        assert_eq!(
            server_end.receiver.recv().await,
            Some(Message::Unregister {
                keys: vec!["pippo".to_string()],
            })
        );
        client.stop().await;
        assert_eq!(server_end.receiver.recv().await, Some(Message::Disconnect));
    }

    #[tokio::test]
    async fn test_clear_unregisters_keys() {
        let hub = LocalHub::new();
        let mut acceptor = hub.acceptor();
        let client = CacheClient::new(test_config("c1"), hub.locator());
        client.start().await;
        let mut server_end = accept_client(&mut acceptor, &client).await;

        client.put("a", "1", None).await.unwrap();
        client.put("b", "2", None).await.unwrap();
        server_end.receiver.recv().await.unwrap();
        server_end.receiver.recv().await.unwrap();

        assert_eq!(client.clear().await, 2);
        match server_end.receiver.recv().await {
            Some(Message::Unregister { mut keys }) => {
                keys.sort();
                assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected unregister, got {:?}", other),
        }
        client.stop().await;
    }
}
