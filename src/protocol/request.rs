use std::collections::HashMap;
use std::fmt;

/// Request methods.
///
/// Method tokens are case-normalized: `get`, `Get` and `GET` all parse to
/// [`Method::GET`]. Tokens outside the well-known set are kept verbatim
/// (upper-cased) in [`Method::Other`] so they can still be routed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other token, upper-cased
    Other(String),
}

impl Method {
    /// Parses a method token, upper-casing it first.
    ///
    /// Returns `None` only for an empty token.
    ///
    /// # Example
    ///
    /// ```
    /// # use gurt::protocol::request::Method;
    /// assert_eq!(Method::parse("get"), Some(Method::GET));
    /// assert_eq!(Method::parse("purge"), Some(Method::Other("PURGE".into())));
    /// assert_eq!(Method::parse(""), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        if s.is_empty() {
            return None;
        }

        let upper = s.to_ascii_uppercase();
        Some(match upper.as_str() {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            _ => Method::Other(upper),
        })
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Other(token) => token,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request frame received on the secured channel.
#[derive(Debug, Clone)]
pub struct Request {
    /// The request method
    pub method: Method,
    /// The request path, verbatim (query strings are not split off)
    pub path: String,
    /// Protocol token from the start line, if the client sent one
    pub version: Option<String>,
    /// Headers; names are lower-cased, the last occurrence of a name wins
    pub headers: HashMap<String, String>,
    /// Raw body bytes
    pub body: Vec<u8>,
}

impl Request {
    /// Looks up a header. The name is matched case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    /// Declared `content-length`, or 0 if missing or not a number.
    pub fn content_length(&self) -> usize {
        self.header("content-length")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Splits a header line on its first colon.
///
/// The name is lower-cased and trimmed, the value is everything after the
/// first colon with surrounding whitespace removed, so `a: b:c` yields
/// `("a", "b:c")`. A line without a colon becomes a name with an empty value.
pub fn parse_header_line(line: &str) -> (String, String) {
    match line.split_once(':') {
        Some((name, value)) => (name.trim().to_ascii_lowercase(), value.trim().to_string()),
        None => (line.trim().to_ascii_lowercase(), String::new()),
    }
}

/// Collects header lines into a map, skipping blank lines.
pub fn parse_header_block<'a>(lines: impl Iterator<Item = &'a str>) -> HashMap<String, String> {
    let mut headers = HashMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (name, value) = parse_header_line(line);
        headers.insert(name, value);
    }

    headers
}
