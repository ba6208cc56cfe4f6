//! Security context: the shared capability that performs handshakes.
//!
//! A context is built once per secure port and is immutable afterwards. The
//! listener and every in-flight handshake hold it through an `Arc`; it is
//! released when the last of them lets go.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::security::credentials::{
    ServerCredentials, CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY, CREDENTIALS_TYPE_SSL,
};
use crate::security::endpoint::SecureEndpoint;
use crate::security::{tls, SecurityError};

/// Error from a single connection's handshake.
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The TLS exchange failed (bad certificate, protocol mismatch, peer reset...).
    #[error("TLS handshake failed: {0}")]
    Tls(#[source] std::io::Error),

    /// The peer did not complete the handshake in time.
    #[error("handshake timed out after {0:?}")]
    TimedOut(Duration),
}

impl HandshakeError {
    /// Short status label for logs and metrics.
    pub fn status(&self) -> &'static str {
        match self {
            HandshakeError::Tls(_) => "error",
            HandshakeError::TimedOut(_) => "timeout",
        }
    }
}

enum Mechanism {
    Tls(TlsAcceptor),
    Fake,
}

/// Performs server-side security handshakes.
pub struct SecurityContext {
    mechanism: Mechanism,
}

impl SecurityContext {
    /// Build the context matching the credential type.
    pub fn from_credentials(credentials: &ServerCredentials) -> Result<Self, SecurityError> {
        match credentials.credential_type.as_str() {
            CREDENTIALS_TYPE_SSL => {
                let (Some(cert_path), Some(key_path)) = (&credentials.cert_path, &credentials.key_path) else {
                    return Err(SecurityError::MissingTlsMaterial);
                };
                let config = tls::load_server_config(cert_path, key_path)?;
                Ok(Self::tls(config))
            }
            CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY => Ok(Self::fake()),
            other => Err(SecurityError::UnsupportedCredentials(other.to_string())),
        }
    }

    /// Context performing TLS handshakes with `config`.
    pub fn tls(config: Arc<ServerConfig>) -> Self {
        Self {
            mechanism: Mechanism::Tls(TlsAcceptor::from(config)),
        }
    }

    /// Context whose handshake always succeeds without protecting anything.
    pub fn fake() -> Self {
        Self {
            mechanism: Mechanism::Fake,
        }
    }

    pub fn credential_type(&self) -> &'static str {
        match self.mechanism {
            Mechanism::Tls(_) => CREDENTIALS_TYPE_SSL,
            Mechanism::Fake => CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY,
        }
    }

    /// Run the server side of the handshake on `stream`.
    ///
    /// On failure the stream is dropped here, which closes the connection.
    pub async fn handshake(&self, stream: TcpStream, timeout: Duration) -> Result<SecureEndpoint, HandshakeError> {
        match &self.mechanism {
            Mechanism::Tls(acceptor) => {
                match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
                    Ok(Ok(tls)) => Ok(SecureEndpoint::Tls(Box::new(tls))),
                    Ok(Err(e)) => Err(HandshakeError::Tls(e)),
                    Err(_) => Err(HandshakeError::TimedOut(timeout)),
                }
            }
            Mechanism::Fake => Ok(SecureEndpoint::Insecure(stream)),
        }
    }
}

impl fmt::Debug for SecurityContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityContext")
            .field("credential_type", &self.credential_type())
            .finish()
    }
}
