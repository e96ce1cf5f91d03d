//! Secure-channel support: rustls configuration and the in-place upgrade.

pub mod setup;
pub mod upgrade;

pub use setup::{TlsMaterial, TlsSettings};
pub use upgrade::{SessionInfo, TransportUpgrader};
