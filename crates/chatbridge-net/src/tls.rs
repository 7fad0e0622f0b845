//! PEM loading and rustls server configuration.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::ServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::TlsAcceptor;

use crate::NetError;

/// Builds a server config from a PEM certificate chain and private key.
///
/// # Errors
/// Returns `NetError::Tls` if a file can't be read, holds no usable
/// certificate or key, or rustls rejects the pair.
pub fn load_tls_config(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<Arc<ServerConfig>, NetError> {
    let certs = load_certs(cert_path.as_ref())?;
    let key = load_private_key(key_path.as_ref())?;

    let config = ServerConfig::builder_with_provider(Arc::new(
        rustls::crypto::ring::default_provider(),
    ))
    .with_safe_default_protocol_versions()
    .map_err(|e| NetError::Tls(e.to_string()))?
    .with_no_client_auth()
    .with_single_cert(certs, key)
    .map_err(|e| NetError::Tls(e.to_string()))?;

    Ok(Arc::new(config))
}

/// A TLS acceptor for the given certificate and key files.
pub fn tls_acceptor(
    cert_path: impl AsRef<Path>,
    key_path: impl AsRef<Path>,
) -> Result<TlsAcceptor, NetError> {
    load_tls_config(cert_path, key_path).map(TlsAcceptor::from)
}

fn open(path: &Path) -> Result<BufReader<File>, NetError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| NetError::Tls(format!("{}: {e}", path.display())))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, NetError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| NetError::Tls(format!("{}: {e}", path.display())))?;
    if certs.is_empty() {
        return Err(NetError::Tls(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, NetError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| NetError::Tls(format!("{}: {e}", path.display())))?
        .ok_or_else(|| NetError::Tls(format!("{}: no private key found", path.display())))
}
