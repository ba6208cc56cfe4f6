//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::security::ServerCredentials;

/// Root configuration for the secure port server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Secure ports to open.
    pub ports: Vec<PortConfig>,

    /// Listener behaviour shared by every port.
    pub listener: ListenerConfig,

    /// Options handed to every installed transport.
    pub channel_args: ChannelArgs,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// One secure port: an address and the credentials to serve it with.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PortConfig {
    /// Address to resolve and bind (e.g., "0.0.0.0:50051", "localhost:50051").
    pub address: String,

    /// Credentials for the handshake on this port.
    pub credentials: ServerCredentials,
}

/// What to do when only some resolved addresses bind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BindPolicy {
    /// Keep the addresses that bound and log a warning.
    #[default]
    BestEffort,
    /// Fail the port unless every resolved address binds.
    Strict,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Partial bind handling.
    pub bind_policy: BindPolicy,

    /// Maximum time a peer gets to complete the security handshake.
    pub handshake_timeout_secs: u64,

    /// Listen backlog per socket.
    pub backlog: u32,
}

impl ListenerConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_policy: BindPolicy::BestEffort,
            handshake_timeout_secs: 20,
            backlog: crate::net::listener::DEFAULT_BACKLOG,
        }
    }
}

/// Transport-level options applied to every installed transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ChannelArgs {
    /// Largest inbound message accepted, in bytes.
    pub max_message_size: usize,
}

impl Default for ChannelArgs {
    fn default() -> Self {
        Self {
            max_message_size: 4 * 1024 * 1024,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
