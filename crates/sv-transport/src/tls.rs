//! TLS configuration for both ends of a relay connection.
//!
//! The relay terminates TLS with a certificate chain and key loaded from a
//! directory (`cert.pem`, `key.pem`). Clients either trust a specific CA or
//! self-signed certificate, or, for local development only, accept whatever
//! certificate the relay presents.
//!
//! All configs are built with the `ring` crypto provider passed explicitly, so
//! no process-wide default provider has to be installed first.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, ServerConfig, SignatureScheme};
use thiserror::Error;
use tracing::{info, warn};

/// File name of the PEM certificate chain inside the certificate directory.
pub const CERT_FILE_NAME: &str = "cert.pem";
/// File name of the PEM private key inside the certificate directory.
pub const KEY_FILE_NAME: &str = "key.pem";

/// Errors raised while building a TLS configuration.
#[derive(Debug, Error)]
pub enum TlsConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid PEM data in {path}: {source}")]
    Pem {
        path: PathBuf,
        #[source]
        source: rustls::pki_types::pem::Error,
    },

    #[error("no certificate found in {0}")]
    NoCertificate(PathBuf),

    #[error("TLS configuration rejected: {0}")]
    Rustls(#[from] rustls::Error),
}

fn provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

fn read_file(path: &Path) -> Result<Vec<u8>, TlsConfigError> {
    fs::read(path).map_err(|source| TlsConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Reads every certificate in a PEM file.
pub fn load_certificates(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsConfigError> {
    let pem = read_file(path)?;
    let certs = CertificateDer::pem_slice_iter(&pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsConfigError::Pem {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsConfigError::NoCertificate(path.to_path_buf()));
    }
    Ok(certs)
}

/// Reads the first private key (PKCS#8, PKCS#1 or SEC1) in a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsConfigError> {
    let pem = read_file(path)?;
    PrivateKeyDer::from_pem_slice(&pem).map_err(|source| TlsConfigError::Pem {
        path: path.to_path_buf(),
        source,
    })
}

// ── Server side ───────────────────────────────────────────────────────────────

/// Builds a server config from an in-memory certificate chain and key.
pub fn server_config(
    cert_chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
) -> Result<Arc<ServerConfig>, TlsConfigError> {
    let config = ServerConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)?;
    Ok(Arc::new(config))
}

/// Loads `cert.pem` and `key.pem` from `certs_dir` and builds a server config.
///
/// # Errors
///
/// Returns [`TlsConfigError`] naming the offending file if either is missing
/// or malformed, or if the key does not match the certificate.
pub fn load_server_config(certs_dir: &Path) -> Result<Arc<ServerConfig>, TlsConfigError> {
    let cert_path = certs_dir.join(CERT_FILE_NAME);
    let key_path = certs_dir.join(KEY_FILE_NAME);
    let chain = load_certificates(&cert_path)?;
    let key = load_private_key(&key_path)?;
    info!(
        "loaded TLS certificate chain ({} certs) from {}",
        chain.len(),
        cert_path.display()
    );
    server_config(chain, key)
}

// ── Client side ───────────────────────────────────────────────────────────────

/// Builds a client config that trusts exactly the certificates in `roots`.
pub fn client_config(roots: RootCertStore) -> Result<Arc<ClientConfig>, TlsConfigError> {
    let config = ClientConfig::builder_with_provider(provider())
        .with_safe_default_protocol_versions()?
        .with_root_certificates(roots)
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Builds a client config trusting every certificate in the PEM file at
/// `ca_path` (a CA, or the relay's own self-signed certificate).
pub fn client_config_trusting(ca_path: &Path) -> Result<Arc<ClientConfig>, TlsConfigError> {
    let mut roots = RootCertStore::empty();
    for cert in load_certificates(ca_path)? {
        roots.add(cert)?;
    }
    client_config(roots)
}

/// Builds a client config that accepts any server certificate.
///
/// The connection is still encrypted but the relay is not authenticated.
/// Development use only.
pub fn insecure_client_config() -> Result<Arc<ClientConfig>, TlsConfigError> {
    warn!("TLS certificate verification is disabled");
    let provider = provider();
    let config = ClientConfig::builder_with_provider(Arc::clone(&provider))
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert { provider }))
        .with_no_client_auth();
    Ok(Arc::new(config))
}

/// Parses `host` into the name sent in SNI and checked against the
/// certificate.
pub fn server_name(host: &str) -> Result<ServerName<'static>, rustls::pki_types::InvalidDnsNameError> {
    ServerName::try_from(host.to_string())
}

/// Skips chain and name validation but still checks handshake signatures, so
/// the peer must at least hold the key for the certificate it presents.
#[derive(Debug)]
struct AcceptAnyCert {
    provider: Arc<CryptoProvider>,
}

impl ServerCertVerifier for AcceptAnyCert {
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
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls12_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        verify_tls13_signature(message, cert, dss, &self.provider.signature_verification_algorithms)
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}
