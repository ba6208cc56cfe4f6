//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that every port names a usable credential type
//! - Validate value ranges (timeouts > 0, sizes > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServerConfig;
use crate::security::CREDENTIALS_TYPE_SSL;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no ports configured")]
    NoPorts,

    #[error("ports[{index}]: address is empty")]
    EmptyAddress { index: usize },

    #[error("ports[{index}]: unsupported credentials type '{credential_type}'")]
    UnsupportedCredentials { index: usize, credential_type: String },

    #[error("ports[{index}]: ssl credentials require cert_path and key_path")]
    MissingTlsMaterial { index: usize },

    #[error("listener.handshake_timeout_secs must be greater than zero")]
    ZeroHandshakeTimeout,

    #[error("listener.backlog must be greater than zero")]
    ZeroBacklog,

    #[error("channel_args.max_message_size must be greater than zero")]
    ZeroMessageSize,

    #[error("observability.log_level '{0}' is not one of trace, debug, info, warn, error")]
    UnknownLogLevel(String),

    #[error("observability.metrics_address '{0}' is not a socket address")]
    InvalidMetricsAddress(String),
}

/// Check `config` for semantic errors, reporting all of them.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.ports.is_empty() {
        errors.push(ValidationError::NoPorts);
    }

    for (index, port) in config.ports.iter().enumerate() {
        if port.address.trim().is_empty() {
            errors.push(ValidationError::EmptyAddress { index });
        }
        let creds = &port.credentials;
        if !creds.is_supported() {
            errors.push(ValidationError::UnsupportedCredentials {
                index,
                credential_type: creds.credential_type.clone(),
            });
        } else if creds.credential_type == CREDENTIALS_TYPE_SSL
            && (creds.cert_path.is_none() || creds.key_path.is_none())
        {
            errors.push(ValidationError::MissingTlsMaterial { index });
        }
    }

    if config.listener.handshake_timeout_secs == 0 {
        errors.push(ValidationError::ZeroHandshakeTimeout);
    }
    if config.listener.backlog == 0 {
        errors.push(ValidationError::ZeroBacklog);
    }
    if config.channel_args.max_message_size == 0 {
        errors.push(ValidationError::ZeroMessageSize);
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::UnknownLogLevel(observability.log_level.clone()));
    }
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::PortConfig;
    use crate::security::ServerCredentials;

    fn port(address: &str, credentials: ServerCredentials) -> PortConfig {
        PortConfig {
            address: address.to_string(),
            credentials,
        }
    }

    #[test]
    fn valid_config_passes() {
        let mut config = ServerConfig::default();
        config.ports.push(port("127.0.0.1:0", ServerCredentials::fake()));
        config.ports.push(port("[::1]:0", ServerCredentials::ssl("c.pem", "k.pem")));
        assert_eq!(validate_config(&config), Ok(()));
    }

    #[test]
    fn collects_every_error() {
        let mut config = ServerConfig::default();
        config.ports.push(port(" ", ServerCredentials::of_type("alts")));
        config.ports.push(port("127.0.0.1:0", ServerCredentials::of_type("ssl")));
        config.listener.handshake_timeout_secs = 0;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyAddress { index: 0 },
                ValidationError::UnsupportedCredentials {
                    index: 0,
                    credential_type: "alts".into()
                },
                ValidationError::MissingTlsMaterial { index: 1 },
                ValidationError::ZeroHandshakeTimeout,
                ValidationError::UnknownLogLevel("loud".into()),
            ]
        );
    }

    #[test]
    fn empty_config_has_no_ports() {
        let errors = validate_config(&ServerConfig::default()).unwrap_err();
        assert_eq!(errors, vec![ValidationError::NoPorts]);
    }

    #[test]
    fn metrics_address_checked_only_when_enabled() {
        let mut config = ServerConfig::default();
        config.ports.push(port("127.0.0.1:0", ServerCredentials::fake()));
        config.observability.metrics_address = "nowhere".into();
        assert!(validate_config(&config).is_ok());

        config.observability.metrics_enabled = true;
        assert_eq!(
            validate_config(&config).unwrap_err(),
            vec![ValidationError::InvalidMetricsAddress("nowhere".into())]
        );
    }
}
