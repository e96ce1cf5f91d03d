use std::collections::HashMap;

use crate::protocol::request::parse_header_block;
use crate::protocol::response::StatusCode;
use crate::protocol::{
    ALPN_TOKEN, PROTOCOL_NAME, PROTOCOL_TOKEN, PROTOCOL_VERSION, SERVER_IDENTITY, date,
    find_terminator, push_header, status_line,
};

/// Method token every handshake line must start with.
pub const HANDSHAKE_METHOD: &str = "HANDSHAKE";

/// Encryption advertised in the acknowledgment.
pub const ENCRYPTION_TOKEN: &str = "TLS/1.3";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HandshakeError {
    /// No terminator yet; more bytes are needed.
    #[error("incomplete handshake")]
    Incomplete,
    #[error("handshake is not valid UTF-8")]
    InvalidUtf8,
    #[error("expected HANDSHAKE, got {0:?}")]
    WrongMethod(String),
    #[error("handshake line has no path")]
    MissingPath,
    #[error("expected GURT/1.0.0, got {0:?}")]
    WrongVersion(String),
    #[error("unexpected trailing tokens in handshake line")]
    TrailingTokens,
}

/// A validated handshake line plus its informational headers.
#[derive(Debug, Clone)]
pub struct Handshake {
    pub path: String,
    pub version: String,
    pub headers: HashMap<String, String>,
}

/// Parses a handshake from the start of `buf`.
///
/// On success returns the handshake and the number of bytes it occupied,
/// terminator included. Bytes past that point belong to whatever the client
/// sent next (typically the start of the TLS handshake) and are not touched.
pub fn parse_handshake(buf: &[u8]) -> Result<(Handshake, usize), HandshakeError> {
    let end = find_terminator(buf).ok_or(HandshakeError::Incomplete)?;
    let text = std::str::from_utf8(&buf[..end]).map_err(|_| HandshakeError::InvalidUtf8)?;

    let mut lines = text.split("\r\n");
    let line = lines.next().unwrap_or_default();
    let mut tokens = line.split_whitespace();

    let method = tokens.next().unwrap_or_default();
    if method != HANDSHAKE_METHOD {
        return Err(HandshakeError::WrongMethod(method.to_string()));
    }

    let path = tokens.next().ok_or(HandshakeError::MissingPath)?;

    let version = tokens.next().unwrap_or_default();
    if version != PROTOCOL_TOKEN {
        return Err(HandshakeError::WrongVersion(version.to_string()));
    }

    if tokens.next().is_some() {
        return Err(HandshakeError::TrailingTokens);
    }

    let handshake = Handshake {
        path: path.to_string(),
        version: version.to_string(),
        headers: parse_header_block(lines),
    };

    Ok((handshake, end + 4))
}

/// Builds the plaintext `101` acknowledgment stamped with `date`.
pub fn acknowledgment(date: &str) -> Vec<u8> {
    let switching = StatusCode::SwitchingProtocols;
    let version_header = format!("{}-version", PROTOCOL_NAME.to_ascii_lowercase());

    let mut ack = status_line(switching.as_u16(), switching.reason_phrase());
    push_header(&mut ack, &version_header, PROTOCOL_VERSION);
    push_header(&mut ack, "encryption", ENCRYPTION_TOKEN);
    push_header(&mut ack, "alpn", ALPN_TOKEN);
    push_header(&mut ack, "server", SERVER_IDENTITY);
    push_header(&mut ack, "date", date);
    ack.push_str("\r\n");

    ack.into_bytes()
}

/// The acknowledgment stamped with the current time.
pub fn acknowledgment_now() -> Vec<u8> {
    acknowledgment(&date::now())
}
