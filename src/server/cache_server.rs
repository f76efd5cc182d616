//! Cache Server
//!
//! Wires an acceptor, the per-connection tasks and the coordinator together.
//!
//! ```text
//! acceptor -> connection task (one per channel) --Command--> coordinator
//!                                                              |
//!             client channels <------- INVALIDATE / ACK -------+
//! ```

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::coordinator::{Command, Coordinator};
use super::{ServerHandle, ServerStats, SessionInfo};
use crate::config::ServerConfig;
use crate::error::{CacheError, Result};
use crate::network::{ChannelAcceptor, Connection};
use crate::protocol::{validate_key, Message};
use crate::tasks::spawn_expiry_task;

// == Cache Server ==
pub struct CacheServer {
    config: ServerConfig,
    handle: ServerHandle,
    /// Taken by `start`; None once the coordinator has been spawned
    commands: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl CacheServer {
    pub fn new(config: ServerConfig) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            handle: ServerHandle::new(tx),
            commands: Mutex::new(Some(rx)),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // == Lifecycle ==
    /// Starts accepting clients on `acceptor`.
    ///
    /// A server runs once: calling this again, or after [`stop`](Self::stop),
    /// does nothing.
    pub async fn start(&self, acceptor: impl ChannelAcceptor) {
        let Some(commands) = self.commands.lock().await.take() else {
            warn!("Cache server {} already started", self.config.cache_name);
            return;
        };

        info!("Starting cache server for cache {}", self.config.cache_name);
        let mut tasks = self.tasks.lock().await;
        tasks.push(tokio::spawn(
            Coordinator::new(self.config.cache_name.clone()).run(commands),
        ));
        tasks.push(tokio::spawn(accept_loop(
            acceptor,
            self.handle.clone(),
            self.config.handshake_timeout(),
        )));
        tasks.push(spawn_expiry_task(
            self.handle.clone(),
            self.config.expiry_check_interval(),
        ));
    }

    /// Disconnects every client and stops all server tasks.
    pub async fn stop(&self) {
        // Close the door before dismissing the clients already inside
        self.commands.lock().await.take();
        if self.handle.shutdown().await.is_err() {
            debug!("Coordinator was not running");
        }

        let mut tasks = self.tasks.lock().await;
        for handle in tasks.iter() {
            handle.abort();
        }
        for handle in tasks.drain(..) {
            let _ = handle.await;
        }
        info!("Cache server for cache {} stopped", self.config.cache_name);
    }

    // == Queries ==
    pub fn cache_name(&self) -> &str {
        &self.config.cache_name
    }

    /// Handle for observing the server from elsewhere, e.g. the admin API.
    pub fn handle(&self) -> ServerHandle {
        self.handle.clone()
    }

    pub async fn stats(&self) -> Result<ServerStats> {
        self.handle.stats().await
    }

    pub async fn holders(&self, key: &str) -> Result<Vec<String>> {
        self.handle.holders(key).await
    }

    pub async fn connected_clients(&self) -> Result<Vec<SessionInfo>> {
        self.handle.sessions().await
    }
}

// == Accept Loop ==
/// Accepts connections and runs one task per connection.
///
/// Dropping (or aborting) this future aborts every connection task with it.
async fn accept_loop(mut acceptor: impl ChannelAcceptor, server: ServerHandle, handshake_timeout: Duration) {
    let mut connections = JoinSet::new();
    let mut next_session_id: u64 = 1;

    loop {
        tokio::select! {
            accepted = acceptor.accept() => match accepted {
                Ok(connection) => {
                    debug!("Accepted connection from {}", connection.peer);
                    let session_id = next_session_id;
                    next_session_id += 1;
                    connections.spawn(serve_connection(
                        connection,
                        session_id,
                        server.clone(),
                        handshake_timeout,
                    ));
                }
                Err(CacheError::ChannelClosed) => {
                    info!("Acceptor closed, no longer accepting connections");
                    break;
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(Duration::from_millis(100)).await;
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    while connections.join_next().await.is_some() {}
}

// == Connection Task ==
/// Performs the handshake, then forwards client requests to the coordinator
/// until the channel closes.
async fn serve_connection(
    connection: Connection,
    session_id: u64,
    server: ServerHandle,
    handshake_timeout: Duration,
) {
    let Connection {
        peer,
        sender,
        mut receiver,
    } = connection;

    let (client_id, cache_name) = match tokio::time::timeout(handshake_timeout, receiver.recv()).await {
        Ok(Some(Message::Handshake {
            client_id,
            cache_name,
        })) => (client_id, cache_name),
        Ok(Some(other)) => {
            warn!("Expected handshake from {}, got {}", peer, other.kind());
            let _ = sender.send(Message::HandshakeAck {
                accepted: false,
                reason: Some("expected handshake".to_string()),
            });
            return;
        }
        Ok(None) => {
            debug!("Connection from {} closed before handshake", peer);
            return;
        }
        Err(_) => {
            warn!("Handshake from {} timed out", peer);
            return;
        }
    };

    let (reply, admitted) = oneshot::channel();
    let open = Command::Open {
        session_id,
        client_id: client_id.clone(),
        cache_name,
        sender,
        reply,
    };
    if server.send(open).is_err() || !admitted.await.unwrap_or(false) {
        return;
    }

    while let Some(message) = receiver.recv().await {
        let command = match message {
            Message::PutNotify { key, expire_at } => Command::Put {
                session_id,
                client_id: client_id.clone(),
                key,
                expire_at,
            },
            Message::InvalidateRequest { key } => Command::Invalidate {
                session_id,
                client_id: client_id.clone(),
                key,
            },
            Message::InvalidatePrefixRequest { prefix } => Command::InvalidatePrefix {
                session_id,
                client_id: client_id.clone(),
                prefix,
            },
            Message::Unregister { keys } => Command::Unregister {
                session_id,
                client_id: client_id.clone(),
                keys,
            },
            Message::Disconnect => {
                debug!("Client {} sent disconnect", client_id);
                break;
            }
            other => {
                debug!("Ignoring unexpected {} from {}", other.kind(), client_id);
                continue;
            }
        };

        if let Some(key) = command_key(&command) {
            if let Err(e) = validate_key(key) {
                warn!("Ignoring request from {}: {}", client_id, e);
                continue;
            }
        }
        if server.send(command).is_err() {
            return;
        }
    }

    let _ = server.send(Command::Close {
        session_id,
        client_id,
    });
}

/// Key or prefix a client request refers to.
fn command_key(command: &Command) -> Option<&str> {
    match command {
        Command::Put { key, .. } | Command::Invalidate { key, .. } => Some(key),
        Command::InvalidatePrefix { prefix, .. } => Some(prefix),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::Instant;

    fn handle() -> (ServerHandle, mpsc::UnboundedReceiver<Command>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ServerHandle::new(tx), rx)
    }

    #[tokio::test]
    async fn test_silent_connection_dropped_after_handshake_timeout() {
        let (server, mut commands) = handle();
        let (mut client_end, server_end) = Connection::pair("client", "server");

        let started = Instant::now();
        serve_connection(server_end, 1, server, Duration::from_millis(100)).await;

        assert!(started.elapsed() >= Duration::from_millis(100));
        // Channel closed without an answer, and the coordinator never heard of it
        assert_eq!(client_end.receiver.recv().await, None);
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_non_handshake_first_message_rejected() {
        let (server, mut commands) = handle();
        let (mut client_end, server_end) = Connection::pair("client", "server");

        client_end
            .sender
            .send(Message::InvalidateRequest {
                key: "pippo".to_string(),
            })
            .unwrap();
        serve_connection(server_end, 1, server, Duration::from_secs(5)).await;

        assert!(matches!(
            client_end.receiver.recv().await,
            Some(Message::HandshakeAck { accepted: false, .. })
        ));
        assert!(commands.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_admitted_connection_forwards_requests() {
        let (server, mut commands) = handle();
        let (client_end, server_end) = Connection::pair("client", "server");
        let task = tokio::spawn(serve_connection(server_end, 7, server, Duration::from_secs(5)));

        client_end
            .sender
            .send(Message::Handshake {
                client_id: "theClient1".to_string(),
                cache_name: "ciao".to_string(),
            })
            .unwrap();
        match commands.recv().await {
            Some(Command::Open {
                session_id,
                client_id,
                reply,
                ..
            }) => {
                assert_eq!(session_id, 7);
                assert_eq!(client_id, "theClient1");
                reply.send(true).unwrap();
            }
            other => panic!("expected open, got {:?}", other),
        }

        let long_key = "k".repeat(300);
        client_end
            .sender
            .send(Message::PutNotify {
                key: long_key.clone(),
                expire_at: None,
            })
            .unwrap();
        match commands.recv().await {
            Some(Command::Put { key, session_id, .. }) => {
                assert_eq!(key, long_key);
                assert_eq!(session_id, 7);
            }
            other => panic!("expected put, got {:?}", other),
        }

        client_end.sender.send(Message::Disconnect).unwrap();
        assert!(matches!(
            commands.recv().await,
            Some(Command::Close { session_id: 7, .. })
        ));
        task.await.unwrap();
    }
}
