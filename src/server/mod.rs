//! Listener, per-connection supervision and routing.
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────────────┐
//!        │      Accepted       │
//!        └──────────┬──────────┘
//!                   ▼
//!        ┌─────────────────────┐   bad line   ┌─────────────────┐
//!        │  AwaitingHandshake  │ ───────────▶ │ HandshakeFailed │ ─▶ closed, nothing written
//!        └──────────┬──────────┘              └─────────────────┘
//!                   │ 101 written
//!                   ▼
//!        ┌─────────────────────┐   TLS error
//!        │      Upgrading      │ ───────────▶ Closed
//!        └──────────┬──────────┘
//!                   │ secure session established
//!                   ▼
//!        ┌─────────────────────┐
//!        │       Secured       │ ◀─┐ one dispatch per frame
//!        └──────────┬──────────┘ ──┘
//!                   │ end of stream / error / timeout
//!                   ▼
//!                 Closed
//! ```

pub mod connection;
pub mod events;
pub mod listener;
pub mod router;

pub use connection::{Connection, ConnectionState};
pub use events::ConnectionEvent;
pub use listener::Server;
pub use router::{ConnectionInfo, Handler, Responder, Router, handler_fn};
