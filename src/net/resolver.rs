//! Address resolution.
//!
//! # Responsibilities
//! - Split an endpoint string into host and port (or service)
//! - Resolve the host to an ordered list of socket addresses
//!
//! # Design Decisions
//! - A missing port falls back to the caller's default service
//! - Resolution sits behind a trait so setup can be driven by fixed tables

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

use async_trait::async_trait;
use thiserror::Error;

/// Service used when an address string carries no port.
pub const DEFAULT_SERVICE: &str = "https";

/// Error type for address resolution.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The address string could not be split into host and port.
    #[error("invalid address '{0}'")]
    InvalidAddress(String),

    /// The port is neither numeric nor a known service name.
    #[error("unknown service '{0}'")]
    UnknownService(String),

    /// The system resolver failed.
    #[error("lookup of '{address}' failed: {source}")]
    Lookup {
        address: String,
        #[source]
        source: std::io::Error,
    },

    /// The lookup succeeded but produced nothing.
    #[error("'{0}' resolved to no addresses")]
    Empty(String),
}

/// Maps an endpoint string to concrete socket addresses.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `address`, using `default_service` when it has no port.
    async fn resolve(
        &self,
        address: &str,
        default_service: &str,
    ) -> Result<Vec<SocketAddr>, ResolveError>;
}

/// Resolver backed by the system's name lookup.
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(
        &self,
        address: &str,
        default_service: &str,
    ) -> Result<Vec<SocketAddr>, ResolveError> {
        let (host, port) = split_host_port(address)?;
        let port = service_port(port.unwrap_or(default_service))?;

        if let Ok(ip) = host.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, port)]);
        }

        let addrs: Vec<SocketAddr> = tokio::net::lookup_host((host, port))
            .await
            .map_err(|source| ResolveError::Lookup {
                address: address.to_string(),
                source,
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ResolveError::Empty(address.to_string()));
        }

        tracing::debug!(address, resolved = addrs.len(), "Address resolved");
        Ok(addrs)
    }
}

/// Resolver answering from a fixed table.
///
/// Unknown addresses resolve to nothing, which setup treats as a failure.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: HashMap<String, Vec<SocketAddr>>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the addresses returned for `address`.
    pub fn with_entry(mut self, address: impl Into<String>, addrs: Vec<SocketAddr>) -> Self {
        self.entries.insert(address.into(), addrs);
        self
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn resolve(
        &self,
        address: &str,
        _default_service: &str,
    ) -> Result<Vec<SocketAddr>, ResolveError> {
        match self.entries.get(address) {
            Some(addrs) if !addrs.is_empty() => Ok(addrs.clone()),
            _ => Err(ResolveError::Empty(address.to_string())),
        }
    }
}

/// Split `host:port`, `[v6]:port`, `[v6]`, bare IPv6 or bare host.
pub fn split_host_port(address: &str) -> Result<(&str, Option<&str>), ResolveError> {
    let invalid = || ResolveError::InvalidAddress(address.to_string());

    if let Some(rest) = address.strip_prefix('[') {
        let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        return match tail {
            "" => Ok((host, None)),
            _ => {
                let port = tail.strip_prefix(':').ok_or_else(invalid)?;
                if port.is_empty() {
                    return Err(invalid());
                }
                Ok((host, Some(port)))
            }
        };
    }

    match address.matches(':').count() {
        0 if !address.is_empty() => Ok((address, None)),
        1 => {
            let (host, port) = address.split_once(':').ok_or_else(invalid)?;
            if host.is_empty() || port.is_empty() {
                return Err(invalid());
            }
            Ok((host, Some(port)))
        }
        // More than one colon without brackets: a bare IPv6 literal.
        n if n > 1 => Ok((address, None)),
        _ => Err(invalid()),
    }
}

/// Translate a numeric port or well-known service name.
pub fn service_port(service: &str) -> Result<u16, ResolveError> {
    if let Ok(port) = service.parse::<u16>() {
        return Ok(port);
    }
    match service {
        "https" => Ok(443),
        "http" => Ok(80),
        _ => Err(ResolveError::UnknownService(service.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_handles_common_shapes() {
        assert_eq!(split_host_port("localhost:50051").unwrap(), ("localhost", Some("50051")));
        assert_eq!(split_host_port("localhost").unwrap(), ("localhost", None));
        assert_eq!(split_host_port("[::1]:443").unwrap(), ("::1", Some("443")));
        assert_eq!(split_host_port("[::1]").unwrap(), ("::1", None));
        assert_eq!(split_host_port("::1").unwrap(), ("::1", None));
    }

    #[test]
    fn split_rejects_malformed() {
        assert!(split_host_port("").is_err());
        assert!(split_host_port(":50051").is_err());
        assert!(split_host_port("host:").is_err());
        assert!(split_host_port("[::1").is_err());
        assert!(split_host_port("[::1]x").is_err());
    }

    #[test]
    fn service_names_map_to_ports() {
        assert_eq!(service_port("https").unwrap(), 443);
        assert_eq!(service_port("8080").unwrap(), 8080);
        assert!(matches!(service_port("gopher"), Err(ResolveError::UnknownService(_))));
    }

    #[tokio::test]
    async fn dns_resolver_uses_default_service() {
        let addrs = DnsResolver.resolve("127.0.0.1", DEFAULT_SERVICE).await.unwrap();
        assert_eq!(addrs, vec!["127.0.0.1:443".parse().unwrap()]);
    }

    #[tokio::test]
    async fn static_resolver_unknown_address_is_empty() {
        let resolver = StaticResolver::new()
            .with_entry("known", vec!["127.0.0.1:1".parse().unwrap()]);
        assert_eq!(resolver.resolve("known", DEFAULT_SERVICE).await.unwrap().len(), 1);
        assert!(matches!(
            resolver.resolve("other", DEFAULT_SERVICE).await,
            Err(ResolveError::Empty(_))
        ));
    }
}
