use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::protocol::ALPN_TOKEN;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_ENV: &str = "GURT_CONFIG";

/// Environment variable overriding `listen_addr`.
pub const LISTEN_ENV: &str = "LISTEN";

const DEFAULT_CONFIG_PATH: &str = "gurt.yaml";
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:4878";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen_addr: String,
    pub tls: TlsConfig,
    pub limits: Limits,
    pub site: SiteConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    pub require_client_certificate_in_local_mode: bool,
    pub forced_server_name: Option<String>,
    pub alpn_protocols: Vec<String>,
    pub sni_certificates: Vec<NamedCertificate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NamedCertificate {
    pub server_name: String,
    pub cert_path: String,
    pub key_path: String,
}

/// Per-connection resource bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Limits {
    pub handshake_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_buffer_bytes: usize,
    pub max_connections: usize,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Document served by `GET /`.
    pub index_path: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            tls: TlsConfig::default(),
            limits: Limits::default(),
            site: SiteConfig::default(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            cert_path: "gurt.crt".to_string(),
            key_path: "gurt.key".to_string(),
            require_client_certificate_in_local_mode: false,
            forced_server_name: None,
            alpn_protocols: vec![ALPN_TOKEN.to_string()],
            sni_certificates: Vec::new(),
        }
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 10,
            idle_timeout_secs: 60,
            max_buffer_bytes: 64 * 1024,
            max_connections: 1024,
        }
    }
}

impl Limits {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    /// Rejects limits under which no client could ever be served.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.max_connections > 0, "limits.max_connections must be at least 1");
        anyhow::ensure!(self.max_buffer_bytes > 0, "limits.max_buffer_bytes must be at least 1");
        Ok(())
    }
}

impl Config {
    /// Loads the file named by `GURT_CONFIG` (default `gurt.yaml`), falling
    /// back to defaults when it does not exist, then applies `LISTEN`.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

        let mut cfg = match std::fs::read_to_string(&path) {
            Ok(text) => Self::from_yaml(&text).with_context(|| format!("invalid config {path}"))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => return Err(e).with_context(|| format!("failed to read {path}")),
        };

        if let Ok(listen_addr) = std::env::var(LISTEN_ENV) {
            cfg.listen_addr = listen_addr;
        }

        Ok(cfg)
    }

    pub fn from_yaml(text: &str) -> anyhow::Result<Self> {
        let cfg: Self = serde_yaml::from_str(text)?;
        cfg.limits.validate()?;
        Ok(cfg)
    }
}
