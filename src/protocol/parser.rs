use crate::protocol::{TERMINATOR, find_terminator};
use crate::protocol::request::{Method, Request, parse_header_block};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// The buffer does not hold a complete frame yet.
    #[error("incomplete frame")]
    Incomplete,
    /// The frame is complete but unusable. `consumed` bytes must still be
    /// dropped so the next frame starts at a clean boundary.
    #[error("malformed frame: {reason}")]
    Malformed { reason: &'static str, consumed: usize },
}

/// Extracts one request frame from the start of `buf`.
///
/// A frame is a start line (`<METHOD> <PATH>`, optionally followed by a
/// protocol token), header lines and a blank line, followed by the body.
/// Returns the request and the number of bytes it occupied; anything after
/// that belongs to the next frame.
///
/// With a `content-length` header, exactly that many body bytes must follow.
/// Without one, the body runs to the next `\r\n\r\n` (which is consumed) or to
/// the end of what is buffered, unless the bytes after the blank line already
/// open another request. A body without `content-length` that itself contains
/// `\r\n\r\n`, or that starts like a request line, cannot be told apart from a
/// following frame.
pub fn parse_request(buf: &[u8]) -> Result<(Request, usize), ParseError> {
    let headers_end = find_terminator(buf).ok_or(ParseError::Incomplete)?;
    let head_len = headers_end + TERMINATOR.len();
    let rest = &buf[head_len..];

    // A rejected frame still takes its body with it.
    let malformed = |reason| ParseError::Malformed {
        reason,
        consumed: head_len + unframed_body(rest).1,
    };

    let head = std::str::from_utf8(&buf[..headers_end])
        .map_err(|_| malformed("header block is not valid UTF-8"))?;

    let mut lines = head.split("\r\n");

    // Start line
    let start_line = lines.next().unwrap_or_default();
    let mut parts = start_line.split_whitespace();

    let method = parts
        .next()
        .and_then(Method::parse)
        .ok_or_else(|| malformed("missing method"))?;
    let path = parts.next().ok_or_else(|| malformed("missing path"))?;
    let version = parts.next().map(str::to_string);

    let headers = parse_header_block(lines);

    // Body
    let (body_len, body_span) = match headers.get("content-length") {
        Some(v) => {
            let len = v
                .parse::<usize>()
                .map_err(|_| malformed("invalid content-length"))?;
            if rest.len() < len {
                return Err(ParseError::Incomplete);
            }
            (len, len)
        }
        None => unframed_body(rest),
    };

    let request = Request {
        method,
        path: path.to_string(),
        version,
        headers,
        body: rest[..body_len].to_vec(),
    };

    Ok((request, head_len + body_span))
}

/// Delimits a body sent without `content-length`.
///
/// Returns the body length and the number of bytes it occupies, closing
/// terminator included.
fn unframed_body(rest: &[u8]) -> (usize, usize) {
    if rest.is_empty() || opens_request(rest) {
        return (0, 0);
    }

    match find_terminator(rest) {
        Some(end) => (end, end + TERMINATOR.len()),
        None => (rest.len(), rest.len()),
    }
}

/// True if `buf` starts with something shaped like `<METHOD> <PATH>`.
fn opens_request(buf: &[u8]) -> bool {
    let line_end = buf
        .windows(2)
        .position(|w| w == b"\r\n")
        .unwrap_or(buf.len());
    let Ok(line) = std::str::from_utf8(&buf[..line_end]) else {
        return false;
    };

    let mut tokens = line.split_whitespace();
    let method = tokens
        .next()
        .is_some_and(|m| m.bytes().all(|b| b.is_ascii_alphabetic()));
    let path = tokens.next().is_some_and(|p| p.starts_with('/'));

    method && path
}
