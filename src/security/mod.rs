//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! ServerCredentials (type + material)
//!     → context.rs (build SecurityContext once per secure port)
//!     → tls.rs (load PEM chain and key into a rustls config)
//!
//! Per accepted connection:
//!     → SecurityContext::handshake
//!     → endpoint.rs (SecureEndpoint handed to the transport layer)
//! ```
//!
//! # Design Decisions
//! - Two credential types: `ssl` and `fake_transport_security`
//! - Contexts are immutable and shared through `Arc`, so no locking
//! - A failed handshake drops the stream; nothing else cleans up after it

pub mod context;
pub mod credentials;
pub mod endpoint;
pub mod tls;

use std::path::PathBuf;

use thiserror::Error;

pub use context::{HandshakeError, SecurityContext};
pub use credentials::{ServerCredentials, CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY, CREDENTIALS_TYPE_SSL};
pub use endpoint::SecureEndpoint;

/// Error type for building a security context.
#[derive(Debug, Error)]
pub enum SecurityError {
    /// Credential type is neither `ssl` nor `fake_transport_security`.
    #[error("unsupported credentials type '{0}'")]
    UnsupportedCredentials(String),

    /// `ssl` credentials without a certificate or key path.
    #[error("ssl credentials require cert_path and key_path")]
    MissingTlsMaterial,

    #[error("failed to load certificate from {}: {source}", .path.display())]
    CertificateLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load private key from {}: {source}", .path.display())]
    KeyLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate: {0}")]
    InvalidCertificate(String),

    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("failed to build TLS server config: {0}")]
    ServerConfigBuild(String),
}
