//! TLS configuration and certificate loading.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls_pemfile::{certs, private_key};
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::CertificateDer;
use tokio_rustls::rustls::ServerConfig;

use crate::security::SecurityError;

/// ALPN protocol advertised by the server.
pub const ALPN_H2: &[u8] = b"h2";

/// Load a rustls server configuration from PEM certificate and key files.
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, SecurityError> {
    let cert_file = File::open(cert_path).map_err(|source| SecurityError::CertificateLoad {
        path: cert_path.to_path_buf(),
        source,
    })?;
    let cert_chain: Vec<CertificateDer<'static>> = certs(&mut BufReader::new(cert_file))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SecurityError::InvalidCertificate(format!("failed to parse certificates: {e}")))?;

    if cert_chain.is_empty() {
        return Err(SecurityError::InvalidCertificate(format!(
            "no certificates found in {}",
            cert_path.display()
        )));
    }

    let key_file = File::open(key_path).map_err(|source| SecurityError::KeyLoad {
        path: key_path.to_path_buf(),
        source,
    })?;
    let key = private_key(&mut BufReader::new(key_file))
        .map_err(|e| SecurityError::InvalidKey(format!("failed to parse private key: {e}")))?
        .ok_or_else(|| SecurityError::InvalidKey(format!("no private key found in {}", key_path.display())))?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .map_err(|e| SecurityError::ServerConfigBuild(e.to_string()))?
        .with_no_client_auth()
        .with_single_cert(cert_chain, key)
        .map_err(|e| SecurityError::ServerConfigBuild(e.to_string()))?;
    config.alpn_protocols = vec![ALPN_H2.to_vec()];

    tracing::debug!(cert = %cert_path.display(), "TLS server configuration loaded");
    Ok(Arc::new(config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_temp(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn loads_self_signed_pair() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert = write_temp(&certified.cert.pem());
        let key = write_temp(&certified.key_pair.serialize_pem());

        let config = load_server_config(cert.path(), key.path()).unwrap();
        assert_eq!(config.alpn_protocols, vec![b"h2".to_vec()]);
    }

    #[test]
    fn missing_certificate_file_is_reported() {
        let err = load_server_config(Path::new("/nonexistent/cert.pem"), Path::new("/nonexistent/key.pem"))
            .unwrap_err();
        assert!(matches!(err, SecurityError::CertificateLoad { .. }));
    }

    #[test]
    fn empty_certificate_file_is_rejected() {
        let cert = write_temp("");
        let key = write_temp("");
        let err = load_server_config(cert.path(), key.path()).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidCertificate(_)));
    }

    #[test]
    fn missing_key_is_rejected() {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();
        let cert = write_temp(&certified.cert.pem());
        let key = write_temp("");
        let err = load_server_config(cert.path(), key.path()).unwrap_err();
        assert!(matches!(err, SecurityError::InvalidKey(_)));
    }
}
