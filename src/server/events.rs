//! Connection lifecycle notifications.
//!
//! Every connection publishes what happens to it on a broadcast channel. The
//! bootstrap layer (or a test) subscribes to observe handshakes, secure
//! sessions and failures without touching the connection itself.

use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::error::EncryptionError;
use crate::tls::SessionInfo;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    Accepted { peer: SocketAddr },
    HandshakeRejected { peer: SocketAddr, reason: String },
    /// The `101` acknowledgment has been written and flushed.
    HandshakeAccepted { peer: SocketAddr, path: String },
    SecureEstablished { peer: SocketAddr, session: SessionInfo },
    /// Decrypted bytes arrived on the secured channel.
    DataAvailable { peer: SocketAddr, bytes: usize },
    EncryptionError { peer: SocketAddr, error: EncryptionError },
    EndOfStream { peer: SocketAddr },
    Closed { peer: SocketAddr },
}

/// Publisher side of the lifecycle channel.
#[derive(Clone)]
pub struct Events {
    tx: broadcast::Sender<ConnectionEvent>,
}

impl Events {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is normal.
    pub fn emit(&self, event: ConnectionEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for Events {
    fn default() -> Self {
        Self::new(256)
    }
}
