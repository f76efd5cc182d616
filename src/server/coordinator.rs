//! Coordinator Module
//!
//! The single task that owns the [`Registry`] and every [`ClientSession`].
//! Connection tasks never touch shared state; they turn incoming frames into
//! [`Command`]s, and the coordinator applies them one at a time. This gives a
//! global order over all puts and invalidations.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ClientSession, Registry, ServerStats, SessionInfo};
use crate::error::{CacheError, Result};
use crate::network::MessageSender;
use crate::protocol::Message;

// == Commands ==
#[derive(Debug)]
pub(crate) enum Command {
    Open {
        session_id: u64,
        client_id: String,
        cache_name: String,
        sender: MessageSender,
        reply: oneshot::Sender<bool>,
    },
    Close {
        session_id: u64,
        client_id: String,
    },
    Put {
        session_id: u64,
        client_id: String,
        key: String,
        expire_at: Option<u64>,
    },
    Invalidate {
        session_id: u64,
        client_id: String,
        key: String,
    },
    InvalidatePrefix {
        session_id: u64,
        client_id: String,
        prefix: String,
    },
    Unregister {
        session_id: u64,
        client_id: String,
        keys: Vec<String>,
    },
    ExpireDue {
        now: u64,
    },
    Stats {
        reply: oneshot::Sender<ServerStats>,
    },
    Holders {
        key: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    Sessions {
        reply: oneshot::Sender<Vec<SessionInfo>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

// == Server Handle ==
/// Cloneable handle for talking to a running coordinator.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl ServerHandle {
    pub(crate) fn new(commands: mpsc::UnboundedSender<Command>) -> Self {
        Self { commands }
    }

    pub(crate) fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .map_err(|_| CacheError::ServerNotRunning)
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply, answer) = oneshot::channel();
        self.send(build(reply))?;
        answer
            .await
            .map_err(|_| CacheError::ServerNotRunning)
    }

    pub async fn stats(&self) -> Result<ServerStats> {
        self.request(|reply| Command::Stats { reply }).await
    }

    /// Clients currently recorded as holding `key`, sorted.
    pub async fn holders(&self, key: &str) -> Result<Vec<String>> {
        let key = key.to_string();
        self.request(|reply| Command::Holders { key, reply }).await
    }

    pub async fn sessions(&self) -> Result<Vec<SessionInfo>> {
        self.request(|reply| Command::Sessions { reply }).await
    }

    /// Invalidates every key whose deadline is at or before `now`.
    pub fn expire_due(&self, now: u64) -> Result<()> {
        self.send(Command::ExpireDue { now })
    }

    pub(crate) async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

// == Coordinator ==
#[derive(Debug)]
pub(crate) struct Coordinator {
    cache_name: String,
    registry: Registry,
    sessions: HashMap<String, ClientSession>,
    stats: ServerStats,
}

impl Coordinator {
    pub(crate) fn new(cache_name: impl Into<String>) -> Self {
        let cache_name = cache_name.into();
        Self {
            stats: ServerStats::new(cache_name.clone()),
            cache_name,
            registry: Registry::new(),
            sessions: HashMap::new(),
        }
    }

    /// Applies commands until shutdown or until every handle is dropped.
    pub(crate) async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        while let Some(command) = commands.recv().await {
            if !self.handle(command) {
                break;
            }
        }
        debug!("Coordinator for cache {} stopped", self.cache_name);
    }

    /// Applies one command. Returns false once the coordinator must stop.
    pub(crate) fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Open {
                session_id,
                client_id,
                cache_name,
                sender,
                reply,
            } => {
                let admitted = self.open_session(session_id, client_id, cache_name, sender);
                let _ = reply.send(admitted);
            }
            Command::Close {
                session_id,
                client_id,
            } => {
                if self.is_current(&client_id, session_id) {
                    self.close_session(&client_id);
                }
            }
            Command::Put {
                session_id,
                client_id,
                key,
                expire_at,
            } => {
                if self.is_current(&client_id, session_id) {
                    let stale = self.registry.record_put(&client_id, &key, expire_at);
                    self.fan_out(stale, Message::Invalidate { key });
                }
            }
            Command::Invalidate {
                session_id,
                client_id,
                key,
            } => {
                if self.is_current(&client_id, session_id) {
                    let stale = self.registry.record_invalidate(&client_id, &key);
                    self.fan_out(stale, Message::Invalidate { key });
                }
            }
            Command::InvalidatePrefix {
                session_id,
                client_id,
                prefix,
            } => {
                if self.is_current(&client_id, session_id) {
                    let targets = self.registry.record_invalidate_prefix(&client_id, &prefix);
                    self.fan_out(targets, Message::InvalidatePrefix { prefix });
                }
            }
            Command::Unregister {
                session_id,
                client_id,
                keys,
            } => {
                if self.is_current(&client_id, session_id) {
                    self.registry.unregister(&client_id, &keys);
                }
            }
            Command::ExpireDue { now } => {
                let expired = self.registry.take_expired(now);
                if !expired.is_empty() {
                    debug!("Expiring {} keys", expired.len());
                }
                for (key, holders) in expired {
                    self.stats.expirations += 1;
                    self.fan_out(holders, Message::Invalidate { key });
                }
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.stats());
            }
            Command::Holders { key, reply } => {
                let _ = reply.send(self.registry.holders(&key));
            }
            Command::Sessions { reply } => {
                let mut sessions: Vec<SessionInfo> =
                    self.sessions.values().map(ClientSession::info).collect();
                sessions.sort_by(|a, b| a.client_id.cmp(&b.client_id));
                let _ = reply.send(sessions);
            }
            Command::Shutdown { reply } => {
                self.shutdown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    // == Session Admission ==
    fn open_session(
        &mut self,
        session_id: u64,
        client_id: String,
        cache_name: String,
        sender: MessageSender,
    ) -> bool {
        let rejection = if cache_name != self.cache_name {
            Some(format!(
                "cache name mismatch: expected {}, got {}",
                self.cache_name, cache_name
            ))
        } else {
            match self.sessions.get(&client_id) {
                Some(existing) if existing.is_live() => {
                    Some(format!("client id {} is already connected", client_id))
                }
                Some(_) => {
                    debug!("Replacing dead session of client {}", client_id);
                    self.close_session(&client_id);
                    None
                }
                None => None,
            }
        };

        if let Some(reason) = rejection {
            warn!("Rejecting handshake from {}: {}", client_id, reason);
            self.stats.rejected_handshakes += 1;
            let _ = sender.send(Message::HandshakeAck {
                accepted: false,
                reason: Some(reason),
            });
            return false;
        }

        if sender
            .send(Message::HandshakeAck {
                accepted: true,
                reason: None,
            })
            .is_err()
        {
            debug!("Client {} went away during handshake", client_id);
            return false;
        }

        info!("Client {} connected to cache {}", client_id, cache_name);
        self.sessions.insert(
            client_id.clone(),
            ClientSession::new(session_id, client_id, cache_name, sender),
        );
        true
    }

    fn is_current(&self, client_id: &str, session_id: u64) -> bool {
        self.sessions
            .get(client_id)
            .is_some_and(|session| session.session_id == session_id)
    }

    /// Removes a session and everything the registry knows about it. Idempotent.
    fn close_session(&mut self, client_id: &str) -> bool {
        if self.sessions.remove(client_id).is_none() {
            return false;
        }
        let forgotten = self.registry.remove_client(client_id);
        info!(
            "Client {} disconnected, forgot {} held keys",
            client_id, forgotten
        );
        true
    }

    // == Fan-out ==
    /// Sends `message` to every target. A target that cannot be reached is
    /// treated as disconnected; the remaining targets are still served.
    fn fan_out(&mut self, targets: Vec<String>, message: Message) {
        if targets.is_empty() {
            return;
        }

        let mut unreachable = Vec::new();
        for target in &targets {
            if let Some(session) = self.sessions.get(target) {
                match session.send(message.clone()) {
                    Ok(()) => self.stats.invalidations_sent += 1,
                    Err(_) => unreachable.push(target.clone()),
                }
            }
        }
        debug!(
            "Sent {} to {} clients ({} unreachable)",
            message.kind(),
            targets.len() - unreachable.len(),
            unreachable.len()
        );

        for client_id in unreachable {
            warn!("Client {} unreachable during invalidation, dropping session", client_id);
            self.close_session(&client_id);
        }
    }

    fn stats(&self) -> ServerStats {
        let mut stats = self.stats.clone();
        stats.connected_clients = self.sessions.len();
        stats.tracked_keys = self.registry.tracked_keys();
        stats
    }

    fn shutdown(&mut self) {
        for session in self.sessions.values() {
            let _ = session.send(Message::Disconnect);
        }
        info!(
            "Coordinator for cache {} closing {} sessions",
            self.cache_name,
            self.sessions.len()
        );
        self.sessions.clear();
        self.registry = Registry::new();
    }

    #[cfg(test)]
    pub(crate) fn registry(&self) -> &Registry {
        &self.registry
    }
}
