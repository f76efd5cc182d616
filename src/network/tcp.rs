//! TCP transport.
//!
//! Frames are JSON-encoded [`Message`]s, one per line. Each socket is bridged
//! onto a [`Connection`] by two tasks: a reader that decodes lines into the
//! receive queue, and a writer that drains the send queue onto the socket.
//! Either task ending tears the bridge down, which surfaces as a closed
//! channel on both sides.

use std::net::SocketAddr;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{ChannelAcceptor, Connection, MessageSender, ServerLocator};
use crate::error::Result;
use crate::protocol::Message;

/// Wires a socket to a fresh [`Connection`].
fn bridge(stream: TcpStream, peer: String) -> Connection {
    let (read_half, mut write_half) = stream.into_split();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel::<Message>();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    let reader_peer = peer.clone();
    tokio::spawn(async move {
        let mut lines = BufReader::new(read_half).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Message>(&line) {
                        Ok(message) => {
                            if inbound_tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!("Dropping connection to {}: bad frame: {}", reader_peer, e);
                            break;
                        }
                    }
                }
                Ok(None) => {
                    debug!("Connection to {} closed by peer", reader_peer);
                    break;
                }
                Err(e) => {
                    debug!("Read error on connection to {}: {}", reader_peer, e);
                    break;
                }
            }
        }
    });

    let writer_peer = peer.clone();
    tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let mut frame = match serde_json::to_vec(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!("Failed to encode {} for {}: {}", message.kind(), writer_peer, e);
                    continue;
                }
            };
            frame.push(b'\n');
            if let Err(e) = write_half.write_all(&frame).await {
                debug!("Write error on connection to {}: {}", writer_peer, e);
                break;
            }
        }
        let _ = write_half.shutdown().await;
    });

    Connection {
        peer,
        sender: MessageSender::new(outbound_tx),
        receiver: inbound_rx,
    }
}

// == Acceptor ==
/// Listening side of the TCP transport.
#[derive(Debug)]
pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    /// Binds a listener, `port` 0 picks an ephemeral port.
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }
}

#[async_trait]
impl ChannelAcceptor for TcpAcceptor {
    async fn accept(&mut self) -> Result<Connection> {
        let (stream, addr) = self.listener.accept().await?;
        stream.set_nodelay(true)?;
        Ok(bridge(stream, addr.to_string()))
    }
}

// == Locator ==
/// Connecting side of the TCP transport.
#[derive(Debug, Clone)]
pub struct TcpServerLocator {
    addr: SocketAddr,
}

impl TcpServerLocator {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }
}

#[async_trait]
impl ServerLocator for TcpServerLocator {
    async fn connect(&self) -> Result<Connection> {
        let stream = TcpStream::connect(self.addr).await?;
        stream.set_nodelay(true)?;
        Ok(bridge(stream, self.addr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_tcp_roundtrip() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let locator = TcpServerLocator::new(acceptor.local_addr().unwrap());

        let mut client = locator.connect().await.unwrap();
        let mut server = acceptor.accept().await.unwrap();

        client
            .sender
            .send(Message::PutNotify {
                key: "pippo".to_string(),
                expire_at: Some(42),
            })
            .unwrap();
        assert_eq!(
            server.receiver.recv().await,
            Some(Message::PutNotify {
                key: "pippo".to_string(),
                expire_at: Some(42),
            })
        );

        server
            .sender
            .send(Message::Invalidate {
                key: "pippo".to_string(),
            })
            .unwrap();
        assert_eq!(
            client.receiver.recv().await,
            Some(Message::Invalidate {
                key: "pippo".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_tcp_close_is_observed() {
        let mut acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let locator = TcpServerLocator::new(acceptor.local_addr().unwrap());

        let client = locator.connect().await.unwrap();
        let mut server = acceptor.accept().await.unwrap();

        drop(client);
        assert_eq!(server.receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_tcp_connect_refused() {
        let acceptor = TcpAcceptor::bind("127.0.0.1:0").await.unwrap();
        let addr = acceptor.local_addr().unwrap();
        drop(acceptor);

        let result = TcpServerLocator::new(addr).connect().await;
        assert!(result.is_err());
    }
}
