use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use bytes::{Buf, Bytes, BytesMut};
use futures_util::FutureExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tracing::{debug, info, warn};

use crate::config::Limits;
use crate::error::{ConnectionError, EncryptionError};
use crate::protocol::handshake::{Handshake, HandshakeError, acknowledgment_now, parse_handshake};
use crate::protocol::parser::{ParseError, parse_request};
use crate::protocol::request::Request;
use crate::protocol::response::Response;
use crate::protocol::writer::ResponseWriter;
use crate::server::events::{ConnectionEvent, Events};
use crate::server::router::{ConnectionInfo, Responder, Router};
use crate::tls::TransportUpgrader;
use crate::tls::upgrade::session_info;

/// State every connection reads but never mutates.
pub struct Shared {
    pub router: Router,
    pub upgrader: TransportUpgrader,
    pub limits: Limits,
    pub events: Events,
}

/// One accepted stream and everything it owns.
pub struct Connection<S> {
    shared: Arc<Shared>,
    info: ConnectionInfo,
    transport: Transport<S>,
    buffer: BytesMut,
    state: ConnectionState,
}

enum Transport<S> {
    Raw(S),
    Secure(Box<TlsStream<S>>),
    Detached,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Accepted,
    AwaitingHandshake,
    HandshakeFailed(HandshakeError),
    /// Carries bytes that arrived after the handshake terminator.
    Upgrading(Bytes),
    Secured,
    Closed,
}

enum Negotiation {
    Accepted { handshake: Handshake, early: Bytes },
    Rejected(HandshakeError),
    Eof,
}

enum Frame {
    Request(Request),
    Malformed(&'static str),
    Eof,
    Failed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, peer: SocketAddr, shared: Arc<Shared>) -> Self {
        Self {
            shared,
            info: ConnectionInfo { peer },
            transport: Transport::Raw(stream),
            buffer: BytesMut::with_capacity(4096),
            state: ConnectionState::Accepted,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Drives the connection until it closes. The transport is shut down on
    /// every exit path.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        let result = self.drive().await;
        self.close().await;
        result
    }

    async fn drive(&mut self) -> anyhow::Result<()> {
        let peer = self.info.peer;

        loop {
            self.state = match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Accepted => {
                    self.shared.events.emit(ConnectionEvent::Accepted { peer });
                    ConnectionState::AwaitingHandshake
                }

                ConnectionState::AwaitingHandshake => {
                    let limit = self.shared.limits.handshake_timeout();
                    let negotiation = timeout(limit, self.negotiate())
                        .await
                        .map_err(|_| ConnectionError::HandshakeTimeout(limit))??;

                    match negotiation {
                        Negotiation::Accepted { handshake, early } => {
                            info!(peer = %peer, path = %handshake.path, "Handshake accepted");
                            for (name, value) in &handshake.headers {
                                debug!(peer = %peer, header = %name, value = %value, "Handshake header");
                            }
                            ConnectionState::Upgrading(early)
                        }
                        Negotiation::Rejected(e) => ConnectionState::HandshakeFailed(e),
                        Negotiation::Eof => ConnectionState::Closed,
                    }
                }

                ConnectionState::HandshakeFailed(e) => {
                    warn!(peer = %peer, error = %e, "Invalid handshake");
                    self.shared.events.emit(ConnectionEvent::HandshakeRejected {
                        peer,
                        reason: e.to_string(),
                    });
                    self.state = ConnectionState::HandshakeFailed(e);
                    return Ok(());
                }

                ConnectionState::Upgrading(early) => {
                    let limit = self.shared.limits.handshake_timeout();
                    match timeout(limit, self.upgrade(early)).await {
                        Ok(Ok(())) => ConnectionState::Secured,
                        Ok(Err(e)) => {
                            self.report_encryption_error(e);
                            ConnectionState::Closed
                        }
                        Err(_) => return Err(ConnectionError::HandshakeTimeout(limit).into()),
                    }
                }

                ConnectionState::Secured => match self.read_request().await? {
                    Frame::Request(request) => {
                        self.dispatch(request).await?;
                        ConnectionState::Secured
                    }
                    Frame::Malformed(reason) => {
                        debug!(peer = %peer, reason, "Malformed frame");
                        self.write_secure(&Response::bad_request()).await?;
                        ConnectionState::Secured
                    }
                    Frame::Eof => {
                        self.shared.events.emit(ConnectionEvent::EndOfStream { peer });
                        ConnectionState::Closed
                    }
                    Frame::Failed => ConnectionState::Closed,
                },

                ConnectionState::Closed => break,
            };
        }

        Ok(())
    }

    /// Reads plaintext until the handshake terminator, then answers it.
    async fn negotiate(&mut self) -> anyhow::Result<Negotiation> {
        let Transport::Raw(stream) = &mut self.transport else {
            anyhow::bail!("handshake on a non-raw transport");
        };

        loop {
            match parse_handshake(&self.buffer) {
                Ok((handshake, consumed)) => {
                    // Anything past the terminator belongs to the TLS layer.
                    let early = self.buffer.split_off(consumed).freeze();
                    self.buffer.clear();

                    ResponseWriter::from_bytes(acknowledgment_now())
                        .write_to_stream(stream)
                        .await?;

                    self.shared.events.emit(ConnectionEvent::HandshakeAccepted {
                        peer: self.info.peer,
                        path: handshake.path.clone(),
                    });

                    return Ok(Negotiation::Accepted { handshake, early });
                }
                Err(HandshakeError::Incomplete) => {}
                Err(e) => {
                    self.buffer.clear();
                    return Ok(Negotiation::Rejected(e));
                }
            }

            check_buffer_limit(&self.buffer, &self.shared.limits)?;

            let n = stream.read_buf(&mut self.buffer).await?;
            if n == 0 {
                return Ok(Negotiation::Eof);
            }
        }
    }

    async fn upgrade(&mut self, early: Bytes) -> Result<(), EncryptionError> {
        let stream = match std::mem::replace(&mut self.transport, Transport::Detached) {
            Transport::Raw(stream) => stream,
            other => {
                self.transport = other;
                return Err(EncryptionError {
                    code: "AlreadyUpgraded".to_string(),
                    subsystem: "io",
                    reason: "transport is not plaintext".to_string(),
                });
            }
        };

        let tls = self.shared.upgrader.upgrade(stream, &early).await?;
        let session = session_info(&tls);

        info!(
            peer = %self.info.peer,
            version = ?session.protocol_version,
            alpn = ?session.alpn,
            peer_certificate = session.peer_certificate,
            "Secure session established"
        );

        self.transport = Transport::Secure(Box::new(tls));
        self.shared.events.emit(ConnectionEvent::SecureEstablished {
            peer: self.info.peer,
            session,
        });

        Ok(())
    }

    /// Reads decrypted bytes until one complete frame is buffered.
    async fn read_request(&mut self) -> anyhow::Result<Frame> {
        let Transport::Secure(stream) = &mut self.transport else {
            anyhow::bail!("request read before the channel was secured");
        };

        loop {
            match parse_request(&self.buffer) {
                Ok((request, consumed)) => {
                    self.buffer.advance(consumed);
                    return Ok(Frame::Request(request));
                }
                Err(ParseError::Incomplete) => {}
                Err(ParseError::Malformed { reason, consumed }) => {
                    self.buffer.advance(consumed);
                    return Ok(Frame::Malformed(reason));
                }
            }

            check_buffer_limit(&self.buffer, &self.shared.limits)?;

            let idle = self.shared.limits.idle_timeout();
            let read = timeout(idle, stream.read_buf(&mut self.buffer))
                .await
                .map_err(|_| ConnectionError::IdleTimeout(idle))?;

            let n = match read {
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => 0,
                Err(e) => {
                    let error = EncryptionError::from_io(&e);
                    self.report_encryption_error(error);
                    return Ok(Frame::Failed);
                }
            };

            if n == 0 {
                return Ok(Frame::Eof);
            }

            self.shared.events.emit(ConnectionEvent::DataAvailable {
                peer: self.info.peer,
                bytes: n,
            });
        }
    }

    /// Routes one request. Handler errors and panics stay inside this
    /// connection and become a `500` if nothing was written yet.
    async fn dispatch(&mut self, request: Request) -> anyhow::Result<()> {
        let Transport::Secure(stream) = &mut self.transport else {
            anyhow::bail!("dispatch before the channel was secured");
        };
        let mut responder = Responder::new(&mut **stream);

        let Some(handler) = self.shared.router.lookup(&request.method, &request.path) else {
            debug!(peer = %self.info.peer, method = %request.method, path = %request.path, "No route");
            return responder.send(&Response::not_found()).await;
        };

        debug!(peer = %self.info.peer, method = %request.method, path = %request.path, "Dispatching");

        let outcome = AssertUnwindSafe(handler.handle(&self.info, &request, &mut responder))
            .catch_unwind()
            .await;

        let failure = match outcome {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => format!("{e:#}"),
            Err(panic) => panic_message(panic.as_ref()),
        };

        warn!(
            peer = %self.info.peer,
            method = %request.method,
            path = %request.path,
            error = %failure,
            "Handler failed"
        );

        if !responder.has_responded() {
            responder.send(&Response::internal_error()).await?;
        }

        Ok(())
    }

    async fn write_secure(&mut self, response: &Response) -> anyhow::Result<()> {
        let Transport::Secure(stream) = &mut self.transport else {
            anyhow::bail!("write before the channel was secured");
        };
        ResponseWriter::new(response)
            .write_to_stream(&mut **stream)
            .await
    }

    fn report_encryption_error(&self, error: EncryptionError) {
        warn!(
            peer = %self.info.peer,
            code = %error.code,
            subsystem = error.subsystem,
            reason = %error.reason,
            "Encryption error"
        );
        if error.is_bad_certificate() {
            warn!(
                peer = %self.info.peer,
                "Client rejected the certificate; the chain is probably missing intermediates, serve a full-chain PEM"
            );
        }
        self.shared.events.emit(ConnectionEvent::EncryptionError {
            peer: self.info.peer,
            error,
        });
    }

    /// Best-effort flush and shutdown. Nothing is written on a raw transport.
    async fn close(&mut self) {
        let grace = self.shared.limits.handshake_timeout();

        match std::mem::replace(&mut self.transport, Transport::Detached) {
            Transport::Raw(mut stream) => {
                let _ = timeout(grace, stream.shutdown()).await;
            }
            Transport::Secure(mut stream) => {
                let _ = timeout(grace, stream.shutdown()).await;
            }
            Transport::Detached => {}
        }

        if !matches!(self.state, ConnectionState::HandshakeFailed(_)) {
            self.state = ConnectionState::Closed;
        }

        info!(peer = %self.info.peer, "Connection closed");
        self.shared.events.emit(ConnectionEvent::Closed {
            peer: self.info.peer,
        });
    }
}

fn check_buffer_limit(buffer: &BytesMut, limits: &Limits) -> Result<(), ConnectionError> {
    if buffer.len() >= limits.max_buffer_bytes {
        return Err(ConnectionError::BufferLimitExceeded {
            buffered: buffer.len(),
            limit: limits.max_buffer_bytes,
        });
    }
    Ok(())
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}
