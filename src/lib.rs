//! GURT - a plaintext-negotiated, TLS-upgraded request/response protocol.
//!
//! Core library: handshake negotiation, in-place TLS upgrade, request
//! framing, routing and response serialization.

pub mod config;
pub mod error;
pub mod protocol;
pub mod server;
pub mod tls;
