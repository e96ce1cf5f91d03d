//! Route registry.
//!
//! Routes are keyed by `(method, path)`. Methods are upper-cased on both
//! registration and lookup; paths match as exact literal strings. The
//! registry is assembled before the listener starts and shared read-only
//! with every connection.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::AsyncWrite;

use crate::protocol::request::{Method, Request};
use crate::protocol::response::Response;
use crate::protocol::writer::ResponseWriter;

/// Metadata about the connection a request arrived on.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub peer: SocketAddr,
}

/// Write half handed to handlers: the connection's secured channel.
pub struct Responder<'a> {
    stream: &'a mut (dyn AsyncWrite + Send + Unpin),
    responded: bool,
}

impl<'a> Responder<'a> {
    pub fn new(stream: &'a mut (dyn AsyncWrite + Send + Unpin)) -> Self {
        Self {
            stream,
            responded: false,
        }
    }

    /// Serializes and writes a full response frame.
    pub async fn send(&mut self, response: &Response) -> anyhow::Result<()> {
        self.responded = true;
        ResponseWriter::new(response)
            .write_to_stream(&mut *self.stream)
            .await
    }

    /// Writes bytes as-is, for handlers that build frames themselves.
    pub async fn send_raw(&mut self, bytes: impl Into<Vec<u8>>) -> anyhow::Result<()> {
        self.responded = true;
        ResponseWriter::from_bytes(bytes.into())
            .write_to_stream(&mut *self.stream)
            .await
    }

    /// Whether anything has been written for the current request.
    pub fn has_responded(&self) -> bool {
        self.responded
    }
}

/// A route handler. It is solely responsible for writing its response.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(
        &self,
        conn: &ConnectionInfo,
        request: &Request,
        responder: &mut Responder<'_>,
    ) -> anyhow::Result<()>;
}

/// Adapts an async closure returning a [`Response`] into a [`Handler`].
pub struct FnHandler<F>(F);

/// Wraps `f` so it can be registered as a route.
///
/// # Example
///
/// ```
/// # use gurt::server::router::{Router, handler_fn};
/// # use gurt::protocol::response::Response;
/// let router = Router::new()
///     .get("/", handler_fn(|_req, _conn| async { Ok(Response::ok("hello")) }));
/// assert_eq!(router.len(), 1);
/// ```
pub fn handler_fn<F, Fut>(f: F) -> FnHandler<F>
where
    F: Fn(Request, ConnectionInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    FnHandler(f)
}

#[async_trait]
impl<F, Fut> Handler for FnHandler<F>
where
    F: Fn(Request, ConnectionInfo) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Response>> + Send + 'static,
{
    async fn handle(
        &self,
        conn: &ConnectionInfo,
        request: &Request,
        responder: &mut Responder<'_>,
    ) -> anyhow::Result<()> {
        let response = (self.0)(request.clone(), conn.clone()).await?;
        responder.send(&response).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RouteKey {
    method: Method,
    path: String,
}

/// Immutable-after-build mapping from `(method, path)` to handler.
#[derive(Default, Clone)]
pub struct Router {
    routes: HashMap<RouteKey, Arc<dyn Handler>>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `method` and `path`, replacing any earlier
    /// handler for the same key. An empty method token is ignored.
    pub fn route(mut self, method: &str, path: &str, handler: impl Handler + 'static) -> Self {
        match Method::parse(method) {
            Some(method) => {
                let key = RouteKey {
                    method,
                    path: path.to_string(),
                };
                self.routes.insert(key, Arc::new(handler));
            }
            None => tracing::warn!(path = %path, "Ignoring route with empty method"),
        }
        self
    }

    pub fn get(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("GET", path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("POST", path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("PUT", path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("DELETE", path, handler)
    }

    pub fn head(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("HEAD", path, handler)
    }

    pub fn options(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("OPTIONS", path, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler + 'static) -> Self {
        self.route("PATCH", path, handler)
    }

    /// Finds the handler for a request. Pure: no state is touched.
    pub fn lookup(&self, method: &Method, path: &str) -> Option<&Arc<dyn Handler>> {
        let key = RouteKey {
            method: method.clone(),
            path: path.to_string(),
        };
        self.routes.get(&key)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
