//! TLS configuration and certificate loading.
//!
//! The PEM files are checked up front so a bad path or an empty file fails
//! startup with a readable error instead of a rustls parse error.

use std::io::BufReader;
use std::path::{Path, PathBuf};
use axum_server::tls_rustls::RustlsConfig;

/// Error type for TLS material loading.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("certificate file not found: {0}")]
    CertificateNotFound(PathBuf),
    #[error("private key file not found: {0}")]
    KeyNotFound(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
    #[error("invalid TLS configuration: {0}")]
    Config(std::io::Error),
}

/// Load TLS configuration from certificate chain and key files.
pub async fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<RustlsConfig, TlsError> {
    if !cert_path.exists() {
        return Err(TlsError::CertificateNotFound(cert_path.to_path_buf()));
    }
    if !key_path.exists() {
        return Err(TlsError::KeyNotFound(key_path.to_path_buf()));
    }

    let cert_pem = read(cert_path).await?;
    let key_pem = read(key_path).await?;

    let certs = rustls_pemfile::certs(&mut BufReader::new(cert_pem.as_slice()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Read { path: cert_path.to_path_buf(), source })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.to_path_buf()));
    }

    let key = rustls_pemfile::private_key(&mut BufReader::new(key_pem.as_slice()))
        .map_err(|source| TlsError::Read { path: key_path.to_path_buf(), source })?;
    if key.is_none() {
        return Err(TlsError::NoPrivateKey(key_path.to_path_buf()));
    }

    tracing::debug!(certificates = certs.len(), cert = %cert_path.display(), "TLS material loaded");
    RustlsConfig::from_pem(cert_pem, key_pem).await.map_err(TlsError::Config)
}

async fn read(path: &Path) -> Result<Vec<u8>, TlsError> {
    tokio::fs::read(path).await.map_err(|source| TlsError::Read {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file_with(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn missing_files_are_reported_by_role() {
        let key = file_with("");
        let err = load_tls_config(Path::new("/nonexistent/server.crt"), key.path())
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::CertificateNotFound(_)));

        let cert = file_with("");
        let err = load_tls_config(cert.path(), Path::new("/nonexistent/server.key"))
            .await
            .unwrap_err();
        assert!(matches!(err, TlsError::KeyNotFound(_)));
    }

    #[tokio::test]
    async fn empty_certificate_file_is_rejected() {
        let cert = file_with("not a pem file\n");
        let key = file_with("");
        let err = load_tls_config(cert.path(), key.path()).await.unwrap_err();
        assert!(matches!(err, TlsError::NoCertificates(_)));
    }

    #[tokio::test]
    async fn key_file_without_key_is_rejected() {
        let cert = file_with("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        let key = file_with("-----BEGIN CERTIFICATE-----\nAAAA\n-----END CERTIFICATE-----\n");
        let err = load_tls_config(cert.path(), key.path()).await.unwrap_err();
        assert!(matches!(err, TlsError::NoPrivateKey(_)));
    }
}
