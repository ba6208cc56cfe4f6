//! Server credentials as configured per secure port.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Credential type for TLS server credentials.
pub const CREDENTIALS_TYPE_SSL: &str = "ssl";

/// Credential type for the insecure test mode (handshake always succeeds).
pub const CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY: &str = "fake_transport_security";

/// Credentials a secure port is configured with.
///
/// The type is kept as a string so configuration files can name types this
/// build does not support; those are rejected when the security context is
/// built, not when the file is parsed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ServerCredentials {
    /// Credential type discriminant (`ssl` or `fake_transport_security`).
    #[serde(rename = "type")]
    pub credential_type: String,

    /// PEM certificate chain, required for `ssl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_path: Option<PathBuf>,

    /// PEM private key, required for `ssl`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_path: Option<PathBuf>,
}

impl ServerCredentials {
    /// TLS credentials from a certificate chain and private key on disk.
    pub fn ssl(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            credential_type: CREDENTIALS_TYPE_SSL.to_string(),
            cert_path: Some(cert_path.into()),
            key_path: Some(key_path.into()),
        }
    }

    /// Insecure credentials for tests and local development.
    pub fn fake() -> Self {
        Self::of_type(CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY)
    }

    /// Credentials carrying only a type and no material.
    pub fn of_type(credential_type: impl Into<String>) -> Self {
        Self {
            credential_type: credential_type.into(),
            cert_path: None,
            key_path: None,
        }
    }

    /// Whether this build knows how to serve the credential type.
    pub fn is_supported(&self) -> bool {
        matches!(
            self.credential_type.as_str(),
            CREDENTIALS_TYPE_SSL | CREDENTIALS_TYPE_FAKE_TRANSPORT_SECURITY
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_type_field() {
        let creds: ServerCredentials =
            toml::from_str("type = \"ssl\"\ncert_path = \"a.pem\"\nkey_path = \"b.pem\"").unwrap();
        assert_eq!(creds, ServerCredentials::ssl("a.pem", "b.pem"));
        assert!(creds.is_supported());
    }

    #[test]
    fn unknown_type_is_not_supported() {
        assert!(!ServerCredentials::of_type("alts").is_supported());
        assert!(ServerCredentials::fake().is_supported());
    }
}
