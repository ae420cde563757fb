use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::crypto::CryptoProvider;
use rustls::crypto::ring::{self as ring_provider, cipher_suite, kx_group};
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

use gameap_config::DaemonConfig;

#[derive(Error, Debug)]
pub enum TlsError {
    #[error("certificate chain file is not set")]
    MissingCertificate,

    #[error("private key file is not set")]
    MissingPrivateKey,

    #[error("failed to read {path}: {source}")]
    Pem {
        path: String,
        source: rustls::pki_types::pem::Error,
    },

    #[error("no certificates found in {0}")]
    EmptyChain(String),

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// TLS 1.2 and 1.3 with AEAD suites and NIST curves only.
fn provider() -> CryptoProvider {
    CryptoProvider {
        cipher_suites: vec![
            cipher_suite::TLS13_AES_256_GCM_SHA384,
            cipher_suite::TLS13_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384,
            cipher_suite::TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256,
            cipher_suite::TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256,
        ],
        kx_groups: vec![kx_group::SECP256R1, kx_group::SECP384R1],
        ..ring_provider::default_provider()
    }
}

fn load_certificates(path: &str) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let pem_error = |source| TlsError::Pem {
        path: path.to_string(),
        source,
    };

    let certs = CertificateDer::pem_file_iter(Path::new(path))
        .map_err(pem_error)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(pem_error)?;

    if certs.is_empty() {
        return Err(TlsError::EmptyChain(path.to_string()));
    }
    Ok(certs)
}

fn load_private_key(path: &str) -> Result<PrivateKeyDer<'static>, TlsError> {
    PrivateKeyDer::from_pem_file(Path::new(path)).map_err(|source| TlsError::Pem {
        path: path.to_string(),
        source,
    })
}

pub fn acceptor(cfg: &DaemonConfig) -> Result<TlsAcceptor, TlsError> {
    if cfg.certificate_chain_file.is_empty() {
        return Err(TlsError::MissingCertificate);
    }
    if cfg.private_key_file.is_empty() {
        return Err(TlsError::MissingPrivateKey);
    }

    let certs = load_certificates(&cfg.certificate_chain_file)?;
    let key = load_private_key(&cfg.private_key_file)?;

    let config = ServerConfig::builder_with_provider(Arc::new(provider()))
        .with_protocol_versions(&[&rustls::version::TLS12, &rustls::version::TLS13])?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;

    Ok(TlsAcceptor::from(Arc::new(config)))
}
