//! Shared utilities for end-to-end tests: a server on an ephemeral port and
//! a TLS client that speaks the plaintext handshake first.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};
use std::time::Duration;

use gurt::config::Limits;
use gurt::server::{ConnectionEvent, Router, Server};
use gurt::tls::{TlsMaterial, TlsSettings};
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

pub const HANDSHAKE: &[u8] = b"HANDSHAKE / GURT/1.0.0\r\nhost: x\r\n\r\n";

pub const TIMEOUT: Duration = Duration::from_secs(5);

pub fn fixture(name: &str) -> String {
    format!("{}/tests/fixtures/{}", env!("CARGO_MANIFEST_DIR"), name)
}

pub fn material(name: &str) -> TlsMaterial {
    TlsMaterial::from_pem_files(
        &fixture(&format!("{name}.crt")),
        &fixture(&format!("{name}.key")),
    )
    .unwrap()
}

pub fn tls_settings() -> TlsSettings {
    TlsSettings {
        material: material("default"),
        named_material: Vec::new(),
        require_client_certificate_in_local_mode: false,
        forced_server_name: None,
        alpn_protocols: vec!["GURT/1.0".to_string()],
    }
}

pub fn test_limits() -> Limits {
    Limits {
        handshake_timeout_secs: 5,
        idle_timeout_secs: 30,
        max_buffer_bytes: 64 * 1024,
        max_connections: 16,
    }
}

/// Starts a server on `127.0.0.1:0` and returns its address and event feed.
pub async fn start_server(
    router: Router,
    settings: TlsSettings,
    limits: Limits,
) -> (SocketAddr, broadcast::Receiver<ConnectionEvent>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = Server::new(router, settings.build_server_config().unwrap(), limits);
    let events = server.subscribe();
    tokio::spawn(server.serve(listener));

    (addr, events)
}

pub async fn start_default_server(router: Router) -> (SocketAddr, broadcast::Receiver<ConnectionEvent>) {
    start_server(router, tls_settings(), test_limits()).await
}

/// Waits for the next event matching `pred`, skipping others.
pub async fn wait_for<F>(
    events: &mut broadcast::Receiver<ConnectionEvent>,
    pred: F,
) -> ConnectionEvent
where
    F: Fn(&ConnectionEvent) -> bool,
{
    tokio::time::timeout(TIMEOUT, async {
        loop {
            let event = events.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event not observed")
}

#[derive(Debug)]
struct AcceptAnyServerCert(rustls::crypto::WebPkiSupportedAlgorithms);

impl ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.0)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.0)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.0.supported_schemes()
    }
}

pub fn connector() -> TlsConnector {
    let provider = Arc::new(rustls::crypto::aws_lc_rs::default_provider());
    let algs = provider.signature_verification_algorithms;

    let mut config = rustls::ClientConfig::builder_with_provider(provider)
        .with_protocol_versions(&[&rustls::version::TLS13])
        .unwrap()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert(algs)))
        .with_no_client_auth();
    config.alpn_protocols = vec![b"GURT/1.0".to_vec()];

    TlsConnector::from(Arc::new(config))
}

/// Reads one byte at a time up to and including `\r\n\r\n`, so nothing past
/// the header block is consumed.
pub async fn read_head<R: AsyncRead + Unpin>(stream: &mut R) -> Vec<u8> {
    let mut head = Vec::new();
    let mut byte = [0u8; 1];

    while !head.ends_with(b"\r\n\r\n") {
        let n = stream.read(&mut byte).await.unwrap();
        if n == 0 {
            break;
        }
        head.push(byte[0]);
    }

    head
}

/// Plain handshake, wait for the `101`, then TLS.
pub async fn connect_as(addr: SocketAddr, server_name: &str) -> (String, TlsStream<TcpStream>) {
    let mut tcp = TcpStream::connect(addr).await.unwrap();
    tcp.write_all(HANDSHAKE).await.unwrap();

    let ack = String::from_utf8(read_head(&mut tcp).await).unwrap();

    let name = ServerName::try_from(server_name.to_string()).unwrap();
    let tls = connector().connect(name, tcp).await.unwrap();

    (ack, tls)
}

pub async fn connect(addr: SocketAddr) -> (String, TlsStream<TcpStream>) {
    connect_as(addr, "localhost").await
}

/// A parsed response frame as seen by the client.
#[derive(Debug)]
pub struct ClientResponse {
    pub status_line: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ClientResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn status(&self) -> u16 {
        self.status_line
            .split_whitespace()
            .nth(1)
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }
}

/// Reads one response frame; the body length comes from `content-length`.
pub async fn read_response<R: AsyncRead + Unpin>(stream: &mut R) -> ClientResponse {
    let head = tokio::time::timeout(TIMEOUT, read_head(stream)).await.unwrap();
    let head = String::from_utf8(head).unwrap();

    let mut lines = head.trim_end().split("\r\n");
    let status_line = lines.next().unwrap_or_default().to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let len = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .map(|(_, v)| v.parse::<usize>().unwrap())
        .unwrap_or(0);

    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await.unwrap();

    ClientResponse { status_line, headers, body }
}

/// Client-side stream that sends the handshake in the same write as the
/// first TLS record and strips the `101` block from the read side, the way
/// an eager client would.
pub struct EagerHandshake<S> {
    inner: S,
    prefix: Option<Vec<u8>>,
    absorbed: usize,
    pub ack: Vec<u8>,
    ack_done: bool,
    surplus: Vec<u8>,
}

impl<S> EagerHandshake<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            prefix: Some(HANDSHAKE.to_vec()),
            absorbed: 0,
            ack: Vec::new(),
            ack_done: false,
            surplus: Vec::new(),
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for EagerHandshake<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        while !this.ack_done {
            let mut chunk = [0u8; 1024];
            let mut chunk_buf = ReadBuf::new(&mut chunk);
            ready!(Pin::new(&mut this.inner).poll_read(cx, &mut chunk_buf))?;

            let filled = chunk_buf.filled();
            if filled.is_empty() {
                return Poll::Ready(Ok(()));
            }

            this.ack.extend_from_slice(filled);
            if let Some(pos) = this.ack.windows(4).position(|w| w == b"\r\n\r\n") {
                this.surplus = this.ack.split_off(pos + 4);
                this.ack_done = true;
            }
        }

        if !this.surplus.is_empty() {
            let n = this.surplus.len().min(buf.remaining());
            buf.put_slice(&this.surplus[..n]);
            this.surplus.drain(..n);
            return Poll::Ready(Ok(()));
        }

        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for EagerHandshake<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if let Some(prefix) = this.prefix.as_mut() {
            if this.absorbed == 0 {
                prefix.extend_from_slice(buf);
                this.absorbed = buf.len();
            }
            while !prefix.is_empty() {
                let n = ready!(Pin::new(&mut this.inner).poll_write(cx, &prefix[..]))?;
                prefix.drain(..n);
            }
            this.prefix = None;
            return Poll::Ready(Ok(this.absorbed));
        }

        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}
