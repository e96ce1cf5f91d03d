use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{Semaphore, broadcast};
use tracing::{info, warn};

use crate::config::{Config, Limits};
use crate::server::connection::{Connection, Shared};
use crate::server::events::{ConnectionEvent, Events};
use crate::server::router::Router;
use crate::tls::{TlsSettings, TransportUpgrader};

/// Accept loop plus the state every connection shares.
pub struct Server {
    shared: Arc<Shared>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    pub fn new(router: Router, tls: Arc<rustls::ServerConfig>, limits: Limits) -> Self {
        let connection_limit = Arc::new(Semaphore::new(limits.max_connections.max(1)));
        let shared = Shared {
            router,
            upgrader: TransportUpgrader::new(tls),
            limits,
            events: Events::default(),
        };

        Self {
            shared: Arc::new(shared),
            connection_limit,
        }
    }

    /// Lifecycle events for every connection this server accepts.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events.subscribe()
    }

    /// Accepts connections until the listener fails. Each connection runs in
    /// its own task; its failures never reach the loop.
    pub async fn serve(self, listener: TcpListener) -> anyhow::Result<()> {
        info!("Listening on {}", listener.local_addr()?);

        loop {
            let permit = self.connection_limit.clone().acquire_owned().await?;

            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "Accept failed");
                    continue;
                }
            };
            info!("Accepted connection from {}", peer);

            let shared = self.shared.clone();
            tokio::spawn(async move {
                let _permit = permit;
                let mut conn = Connection::new(socket, peer, shared);
                if let Err(e) = conn.run().await {
                    tracing::error!("Connection error from {}: {:#}", peer, e);
                }
            });
        }
    }
}

/// Loads certificates, binds `cfg.listen_addr` and serves `router`.
pub async fn run(cfg: &Config, router: Router) -> anyhow::Result<()> {
    let settings = TlsSettings::load(&cfg.tls)?;
    info!(
        cert = %cfg.tls.cert_path,
        chain_len = settings.material.cert_chain.len(),
        named = settings.named_material.len(),
        local_mode = settings.require_client_certificate_in_local_mode,
        forced_server_name = ?settings.forced_server_name,
        "Certificate material loaded"
    );
    let tls = settings.build_server_config()?;

    let listener = TcpListener::bind(&cfg.listen_addr).await?;
    Server::new(router, tls, cfg.limits.clone())
        .serve(listener)
        .await
}
