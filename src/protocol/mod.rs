//! GURT wire protocol.
//!
//! Everything in this module is pure: it turns byte buffers into values and
//! values into bytes. Socket handling lives in [`crate::server`] and the
//! secure-channel upgrade in [`crate::tls`].
//!
//! # Submodules
//!
//! - **`handshake`**: the plaintext `HANDSHAKE` line and the `101` acknowledgment
//! - **`request`**: request representation and header-line rules
//! - **`parser`**: extracts complete request frames from the decrypted stream
//! - **`response`**: response representation with builder pattern
//! - **`writer`**: serializes and writes responses to a channel
//! - **`date`**: RFC 1123 timestamps used in the `date` header
//!
//! # Wire Format
//!
//! ```text
//!  client                                   server
//!    │  HANDSHAKE / GURT/1.0.0\r\n ... \r\n    │   plaintext
//!    │ ──────────────────────────────────────▶ │
//!    │  GURT/1.0.0 101 SWITCHING_PROTOCOLS     │
//!    │ ◀────────────────────────────────────── │
//!    │  TLS 1.3 handshake (same transport)     │
//!    │ ◀─────────────────────────────────────▶ │
//!    │  GET /path GURT/1.0.0\r\n ... \r\n      │   encrypted
//!    │ ──────────────────────────────────────▶ │
//!    │  GURT/1.0.0 200 OK\r\n ... body         │
//!    │ ◀────────────────────────────────────── │
//! ```

pub mod date;
pub mod handshake;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;

/// Protocol name as it appears on the wire.
pub const PROTOCOL_NAME: &str = "GURT";

/// Full protocol version.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// `<protocol>/<version>` token used in handshake lines and status lines.
pub const PROTOCOL_TOKEN: &str = "GURT/1.0.0";

/// Application-layer protocol identifier (`<name>/<major.minor>`).
pub const ALPN_TOKEN: &str = "GURT/1.0";

/// Value of the `server` header on every frame the server emits.
pub const SERVER_IDENTITY: &str = "GURT/1.0.0";

/// Header block terminator.
pub const TERMINATOR: &[u8] = b"\r\n\r\n";

/// Returns the index of the first `\r\n\r\n` in `buf`.
pub fn find_terminator(buf: &[u8]) -> Option<usize> {
    buf.windows(TERMINATOR.len())
        .position(|w| w == TERMINATOR)
}

/// First line of every frame the server emits: `<token> <code> <reason>\r\n`.
pub fn status_line(code: u16, reason: &str) -> String {
    format!("{PROTOCOL_TOKEN} {code} {reason}\r\n")
}

/// Appends one `name: value\r\n` header line.
pub fn push_header(out: &mut String, name: &str, value: &str) {
    out.push_str(name);
    out.push_str(": ");
    out.push_str(value);
    out.push_str("\r\n");
}
