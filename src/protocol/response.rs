use crate::protocol::{SERVER_IDENTITY, date};

/// Status codes the server itself produces.
///
/// Handlers are not limited to these; [`ResponseBuilder::with_reason`] takes
/// any code and reason phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 101 SWITCHING_PROTOCOLS
    SwitchingProtocols,
    /// 200 OK
    Ok,
    /// 201 Created
    Created,
    /// 204 No Content
    NoContent,
    /// 400 Bad Request
    BadRequest,
    /// 404 Not Found
    NotFound,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use gurt::protocol::response::StatusCode;
    /// assert_eq!(StatusCode::Ok.as_u16(), 200);
    /// assert_eq!(StatusCode::NotFound.as_u16(), 404);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::SwitchingProtocols => 101,
            StatusCode::Ok => 200,
            StatusCode::Created => 201,
            StatusCode::NoContent => 204,
            StatusCode::BadRequest => 400,
            StatusCode::NotFound => 404,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the reason phrase for this status code.
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::SwitchingProtocols => "SWITCHING_PROTOCOLS",
            StatusCode::Ok => "OK",
            StatusCode::Created => "Created",
            StatusCode::NoContent => "No Content",
            StatusCode::BadRequest => "Bad Request",
            StatusCode::NotFound => "Not Found",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A complete response frame ready to be written to the secured channel.
#[derive(Debug, Clone)]
pub struct Response {
    /// Numeric status code
    pub status: u16,
    /// Reason phrase following the code on the status line
    pub reason: String,
    /// Headers in emission order; names are unique, compared case-insensitively
    pub headers: Vec<(String, String)>,
    /// Response body as bytes
    pub body: Vec<u8>,
}

/// Builder for responses.
///
/// `build` fills in `server`, `date` and `content-length` unless the caller
/// already set them. `content-length` is the body's byte length, so a body of
/// `"€"` reports 3.
///
/// # Example
///
/// ```
/// # use gurt::protocol::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::Ok)
///     .header("content-type", "application/json")
///     .body("{}")
///     .build();
/// assert_eq!(response.header("content-length"), Some("2"));
/// ```
pub struct ResponseBuilder {
    status: u16,
    reason: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
    content_length: bool,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self::with_reason(status.as_u16(), status.reason_phrase())
    }

    /// Creates a builder for an arbitrary code and reason phrase.
    pub fn with_reason(status: u16, reason: impl Into<String>) -> Self {
        Self {
            status,
            reason: reason.into(),
            headers: Vec::new(),
            body: Vec::new(),
            content_length: true,
        }
    }

    /// Adds or replaces a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        set_header(&mut self.headers, key.into(), value.into());
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Skips the automatic `content-length`, e.g. for `204` or `HEAD` replies.
    pub fn without_content_length(mut self) -> Self {
        self.content_length = false;
        self
    }

    /// Builds the final Response.
    pub fn build(mut self) -> Response {
        if self.content_length && !has_header(&self.headers, "content-length") {
            let len = self.body.len().to_string();
            self.headers.push(("content-length".to_string(), len));
        }
        if !has_header(&self.headers, "server") {
            self.headers.push(("server".to_string(), SERVER_IDENTITY.to_string()));
        }
        if !has_header(&self.headers, "date") {
            self.headers.push(("date".to_string(), date::now()));
        }

        Response {
            status: self.status,
            reason: self.reason,
            headers: self.headers,
            body: self.body,
        }
    }
}

fn has_header(headers: &[(String, String)], key: &str) -> bool {
    headers.iter().any(|(k, _)| k.eq_ignore_ascii_case(key))
}

fn set_header(headers: &mut Vec<(String, String)>, key: String, value: String) {
    match headers.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&key)) {
        Some(slot) => slot.1 = value,
        None => headers.push((key, value)),
    }
}

impl Response {
    /// Starts a builder; shorthand for [`ResponseBuilder::new`].
    pub fn builder(status: StatusCode) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    /// A `200 OK` plain-text response.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::Ok)
            .header("content-type", "text/plain")
            .body(body)
            .build()
    }

    /// The built-in responder for unknown routes.
    pub fn not_found() -> Self {
        ResponseBuilder::new(StatusCode::NotFound)
            .header("content-type", "text/plain")
            .body("Not Found")
            .build()
    }

    /// Response for a frame whose start line could not be parsed.
    pub fn bad_request() -> Self {
        ResponseBuilder::new(StatusCode::BadRequest)
            .header("content-type", "text/plain")
            .body("Bad Request")
            .build()
    }

    /// Response sent when a handler fails before writing anything.
    pub fn internal_error() -> Self {
        ResponseBuilder::new(StatusCode::InternalServerError)
            .header("content-type", "text/plain")
            .body("Internal Server Error")
            .build()
    }

    /// Looks up a header by case-insensitive name.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}
