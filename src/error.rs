//! Error types shared across the crate.

use std::time::Duration;

/// Failure while provisioning certificates or building the TLS configuration.
#[derive(Debug, thiserror::Error)]
pub enum TlsSetupError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no private key found in {0}")]
    NoPrivateKey(String),
    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

/// A failure on the secure layer, split into the pieces operators need.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("[{subsystem}] {code}: {reason}")]
pub struct EncryptionError {
    /// Short machine-readable code, e.g. `AlertReceived` or `UnexpectedEof`.
    pub code: String,
    /// Which layer raised it: `rustls` or `io`.
    pub subsystem: &'static str,
    /// Human-readable description.
    pub reason: String,
}

impl EncryptionError {
    pub fn from_rustls(err: &rustls::Error) -> Self {
        Self {
            code: variant_name(&format!("{err:?}")),
            subsystem: "rustls",
            reason: err.to_string(),
        }
    }

    /// Unwraps the rustls error tokio-rustls tucks inside an `io::Error`.
    pub fn from_io(err: &std::io::Error) -> Self {
        match err
            .get_ref()
            .and_then(|inner| inner.downcast_ref::<rustls::Error>())
        {
            Some(tls) => Self::from_rustls(tls),
            None => Self {
                code: format!("{:?}", err.kind()),
                subsystem: "io",
                reason: err.to_string(),
            },
        }
    }

    /// True when the peer refused the certificate chain we served.
    pub fn is_bad_certificate(&self) -> bool {
        let reason = self.reason.to_ascii_lowercase();
        reason.contains("bad certificate") || reason.contains("badcertificate")
    }
}

fn variant_name(debug: &str) -> String {
    debug
        .split(|c: char| c == '(' || c == '{' || c == ' ')
        .next()
        .unwrap_or(debug)
        .to_string()
}

/// Reasons a connection is torn down without a protocol-level reply.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("handshake not completed within {0:?}")]
    HandshakeTimeout(Duration),
    #[error("connection idle for {0:?}")]
    IdleTimeout(Duration),
    #[error("buffered {buffered} bytes without a complete frame (limit {limit})")]
    BufferLimitExceeded { buffered: usize, limit: usize },
}
