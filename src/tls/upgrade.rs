use std::io::Cursor;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

use crate::error::EncryptionError;

/// Turns an accepted plaintext connection into a TLS server stream in place.
///
/// The caller owns the raw stream and stops reading from it once the
/// handshake terminator is found; whatever it had already read past that
/// point (usually the start of the ClientHello) is handed over as `buffered`
/// and fed to rustls before a single new byte is read from the socket. From
/// then on all reads go through the TLS layer.
#[derive(Clone)]
pub struct TransportUpgrader {
    acceptor: TlsAcceptor,
}

/// Facts about a freshly established secure session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub protocol_version: Option<String>,
    pub alpn: Option<String>,
    pub server_name: Option<String>,
    pub peer_certificate: bool,
}

impl TransportUpgrader {
    pub fn new(config: Arc<rustls::ServerConfig>) -> Self {
        Self {
            acceptor: TlsAcceptor::from(config),
        }
    }

    /// Wraps `stream` and runs the TLS handshake to completion.
    pub async fn upgrade<IO>(
        &self,
        stream: IO,
        buffered: &[u8],
    ) -> Result<TlsStream<IO>, EncryptionError>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let mut feed_error: Option<EncryptionError> = None;

        let accept = self.acceptor.accept_with(stream, |conn| {
            if buffered.is_empty() {
                return;
            }
            if let Err(e) = feed_server_connection(conn, buffered) {
                feed_error = Some(e);
            }
        });

        if let Some(e) = feed_error {
            return Err(e);
        }

        accept.await.map_err(|e| EncryptionError::from_io(&e))
    }
}

/// Pushes bytes that were read off the socket before the wrap into rustls.
fn feed_server_connection(
    conn: &mut rustls::ServerConnection,
    data: &[u8],
) -> Result<(), EncryptionError> {
    let mut cursor = Cursor::new(data);

    while (cursor.position() as usize) < data.len() {
        let n = conn
            .read_tls(&mut cursor)
            .map_err(|e| EncryptionError::from_io(&e))?;
        if n == 0 {
            break;
        }
        // Drain rustls' record buffer so the next read_tls has room.
        conn.process_new_packets()
            .map_err(|e| EncryptionError::from_rustls(&e))?;
    }

    Ok(())
}

/// Describes the negotiated session on `stream`.
pub fn session_info<IO>(stream: &TlsStream<IO>) -> SessionInfo {
    let (_, conn) = stream.get_ref();

    SessionInfo {
        protocol_version: conn.protocol_version().map(|v| format!("{v:?}")),
        alpn: conn
            .alpn_protocol()
            .map(|p| String::from_utf8_lossy(p).into_owned()),
        server_name: conn.server_name().map(str::to_string),
        peer_certificate: conn.peer_certificates().is_some_and(|c| !c.is_empty()),
    }
}
