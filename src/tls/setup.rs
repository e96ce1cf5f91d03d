//! Certificate loading and rustls server configuration.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::sync::{Arc, OnceLock};

use rustls::pki_types::{CertificateDer, PrivateKeyDer, UnixTime};
use rustls::server::danger::{ClientCertVerified, ClientCertVerifier};
use rustls::server::{ClientHello, ResolvesServerCert};
use rustls::sign::CertifiedKey;

use crate::config::TlsConfig;
use crate::error::TlsSetupError;

/// Certificate chain and private key, passed through to rustls unchanged.
pub struct TlsMaterial {
    pub cert_chain: Vec<CertificateDer<'static>>,
    pub key: PrivateKeyDer<'static>,
}

impl TlsMaterial {
    /// Loads a PEM certificate chain and a PEM private key from disk.
    pub fn from_pem_files(cert_path: &str, key_path: &str) -> Result<Self, TlsSetupError> {
        let read_err = |path: &str| {
            let path = path.to_string();
            move |source: std::io::Error| TlsSetupError::Read { path, source }
        };

        let mut reader = BufReader::new(File::open(cert_path).map_err(read_err(cert_path))?);
        let cert_chain = rustls_pemfile::certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err(cert_path))?;
        if cert_chain.is_empty() {
            return Err(TlsSetupError::NoCertificates(cert_path.to_string()));
        }

        let mut reader = BufReader::new(File::open(key_path).map_err(read_err(key_path))?);
        let key = rustls_pemfile::private_key(&mut reader)
            .map_err(read_err(key_path))?
            .ok_or_else(|| TlsSetupError::NoPrivateKey(key_path.to_string()))?;

        Ok(Self { cert_chain, key })
    }

    fn into_certified_key(self) -> Result<Arc<CertifiedKey>, TlsSetupError> {
        let signing_key = crypto_provider().key_provider.load_private_key(self.key)?;
        Ok(Arc::new(CertifiedKey::new(self.cert_chain, signing_key)))
    }
}

/// Everything the upgrader needs to act as the TLS server endpoint.
pub struct TlsSettings {
    pub material: TlsMaterial,
    /// Extra certificates selectable by server name.
    pub named_material: Vec<(String, TlsMaterial)>,
    /// Ask for a client certificate and accept whatever is presented, unverified.
    pub require_client_certificate_in_local_mode: bool,
    /// Select the certificate for this name no matter what SNI the client sends.
    pub forced_server_name: Option<String>,
    pub alpn_protocols: Vec<String>,
}

impl TlsSettings {
    /// Loads all certificate material named in the configuration.
    pub fn load(cfg: &TlsConfig) -> Result<Self, TlsSetupError> {
        let material = TlsMaterial::from_pem_files(&cfg.cert_path, &cfg.key_path)?;

        let mut named_material = Vec::with_capacity(cfg.sni_certificates.len());
        for entry in &cfg.sni_certificates {
            let m = TlsMaterial::from_pem_files(&entry.cert_path, &entry.key_path)?;
            named_material.push((entry.server_name.clone(), m));
        }

        Ok(Self {
            material,
            named_material,
            require_client_certificate_in_local_mode: cfg.require_client_certificate_in_local_mode,
            forced_server_name: cfg.forced_server_name.clone(),
            alpn_protocols: cfg.alpn_protocols.clone(),
        })
    }

    /// Builds a TLS 1.3-only rustls server configuration.
    pub fn build_server_config(self) -> Result<Arc<rustls::ServerConfig>, TlsSetupError> {
        let provider = crypto_provider();

        let builder = rustls::ServerConfig::builder_with_provider(provider.clone())
            .with_protocol_versions(&[&rustls::version::TLS13])?;

        let builder = if self.require_client_certificate_in_local_mode {
            builder.with_client_cert_verifier(Arc::new(AcceptAnyClientCert {
                supported_algs: provider.signature_verification_algorithms,
            }))
        } else {
            builder.with_no_client_auth()
        };

        let mut by_name = HashMap::with_capacity(self.named_material.len());
        for (name, material) in self.named_material {
            by_name.insert(name.to_ascii_lowercase(), material.into_certified_key()?);
        }

        let resolver = NamedCertResolver {
            default: self.material.into_certified_key()?,
            by_name,
            forced_server_name: self.forced_server_name.map(|n| n.to_ascii_lowercase()),
        };

        let mut config = builder.with_cert_resolver(Arc::new(resolver));
        config.alpn_protocols = self
            .alpn_protocols
            .iter()
            .map(|s| s.as_bytes().to_vec())
            .collect();

        Ok(Arc::new(config))
    }
}

fn crypto_provider() -> Arc<rustls::crypto::CryptoProvider> {
    static INSTANCE: OnceLock<Arc<rustls::crypto::CryptoProvider>> = OnceLock::new();
    INSTANCE
        .get_or_init(|| Arc::new(rustls::crypto::aws_lc_rs::default_provider()))
        .clone()
}

/// Picks a certificate by server name.
///
/// With a forced name set, the client's SNI is ignored. Unknown names fall
/// back to the primary certificate.
#[derive(Debug)]
struct NamedCertResolver {
    default: Arc<CertifiedKey>,
    by_name: HashMap<String, Arc<CertifiedKey>>,
    forced_server_name: Option<String>,
}

impl NamedCertResolver {
    fn select(&self, requested: Option<&str>) -> Arc<CertifiedKey> {
        let name = match (&self.forced_server_name, requested) {
            (Some(forced), _) => Some(forced.clone()),
            (None, Some(sni)) => Some(sni.to_ascii_lowercase()),
            (None, None) => None,
        };

        name.and_then(|n| self.by_name.get(&n).cloned())
            .unwrap_or_else(|| self.default.clone())
    }
}

impl ResolvesServerCert for NamedCertResolver {
    fn resolve(&self, client_hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        let requested = client_hello.server_name();
        if let Some(forced) = &self.forced_server_name {
            tracing::debug!(requested = ?requested, forced = %forced, "Forcing server name");
        }
        Some(self.select(requested))
    }
}

/// Client verifier for local-certificate mode: asks for a certificate but
/// neither requires nor checks it.
#[derive(Debug)]
struct AcceptAnyClientCert {
    supported_algs: rustls::crypto::WebPkiSupportedAlgorithms,
}

impl ClientCertVerifier for AcceptAnyClientCert {
    fn offer_client_auth(&self) -> bool {
        true
    }

    fn client_auth_mandatory(&self) -> bool {
        false
    }

    fn root_hint_subjects(&self) -> &[rustls::DistinguishedName] {
        &[]
    }

    fn verify_client_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _now: UnixTime,
    ) -> Result<ClientCertVerified, rustls::Error> {
        Ok(ClientCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(message, cert, dss, &self.supported_algs)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &rustls::DigitallySignedStruct,
    ) -> Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(message, cert, dss, &self.supported_algs)
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        self.supported_algs.supported_schemes()
    }
}
