//! Secure ports: bind, accept, handshake, install.
//!
//! # Responsibilities
//! - Build the security context from the port's credentials
//! - Resolve the address and bind every candidate on one port
//! - Register a `SecureListener` with the server, only on success
//! - Per accepted connection: handshake, then install a transport
//!
//! # Design Decisions
//! - Resources acquired during setup are owned values; any early return
//!   drops exactly what was acquired, and nothing reaches the server
//! - Partial binds follow the server's `BindPolicy`
//! - A server that has shut down refuses the port; its sockets are closed
//! - A port mismatch between bound sockets is reported as an error
//! - `destroy` stops new accepts only; in-flight handshakes run to completion

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::runtime::Handle;

use crate::config::BindPolicy;
use crate::net::connection::{Connection, ConnectionState, HandshakeGuard, HandshakeTracker};
use crate::net::{ResolveError, TcpServer, DEFAULT_SERVICE};
use crate::observability::metrics;
use crate::security::{HandshakeError, SecureEndpoint, SecurityContext, SecurityError, ServerCredentials};
use crate::server::registry::{Listener, RegistryClosed};
use crate::server::Server;
use crate::transport::install_transport;

/// Why a secure port could not be added.
#[derive(Debug, Error)]
pub enum AddPortError {
    #[error("unable to create secure server: {0}")]
    Credentials(#[from] SecurityError),

    #[error("address resolution failed: {0}")]
    Resolve(#[from] ResolveError),

    #[error("no address added out of {resolved} resolved")]
    NoAddressBound { resolved: usize },

    #[error("only {bound} of {resolved} resolved addresses could be bound")]
    PartialBind { bound: usize, resolved: usize },

    #[error("bound sockets disagree on port: {expected} vs {actual}")]
    PortMismatch { expected: u16, actual: u16 },

    #[error(transparent)]
    ServerShutDown(#[from] RegistryClosed),
}

/// Add a secure port on `address` served with `credentials`.
///
/// Returns the port every bound socket listens on.
pub async fn add_secure_port(
    server: &Arc<Server>,
    address: &str,
    credentials: &ServerCredentials,
) -> Result<u16, AddPortError> {
    let ctx = match SecurityContext::from_credentials(credentials) {
        Ok(ctx) => Arc::new(ctx),
        Err(e) => {
            tracing::error!(
                credential_type = %credentials.credential_type,
                error = %e,
                "Unable to create secure server with credentials"
            );
            return Err(e.into());
        }
    };
    add_secure_port_with_context(server, address, ctx).await
}

/// Add a port using the insecure test credentials.
pub async fn add_insecure_port(server: &Arc<Server>, address: &str) -> Result<u16, AddPortError> {
    add_secure_port_with_context(server, address, Arc::new(SecurityContext::fake())).await
}

/// Like [`add_secure_port`], collapsing every failure to port `0`.
pub async fn add_secure_port_or_zero(server: &Arc<Server>, address: &str, credentials: &ServerCredentials) -> u16 {
    add_secure_port(server, address, credentials).await.unwrap_or(0)
}

/// Add a secure port sharing an existing security context.
///
/// The context is dropped on every failure path, so its reference count is
/// unchanged when this returns an error.
pub async fn add_secure_port_with_context(
    server: &Arc<Server>,
    address: &str,
    ctx: Arc<SecurityContext>,
) -> Result<u16, AddPortError> {
    let resolved = match server.resolver().resolve(address, DEFAULT_SERVICE).await {
        Ok(resolved) => resolved,
        Err(e) => {
            tracing::error!(address, error = %e, "Failed to resolve address");
            return Err(e.into());
        }
    };

    let mut tcp = TcpServer::with_backlog(server.backlog());
    let port = bind_all(&mut tcp, &resolved, server.bind_policy())?;
    drop(resolved);

    let listener = SecureListener::new(tcp, ctx, server);
    if let Err(e) = server.add_listener(Box::new(listener)) {
        tracing::error!(address, port, "Server is shut down; secure port not added");
        return Err(e.into());
    }

    tracing::info!(address, port, "Secure port added");
    Ok(port)
}

/// Bind every resolved address, returning the shared port.
fn bind_all(tcp: &mut TcpServer, addrs: &[SocketAddr], policy: BindPolicy) -> Result<u16, AddPortError> {
    let mut port: Option<u16> = None;
    let mut bound = 0;

    for addr in addrs {
        match tcp.add_port(*addr) {
            Ok(actual) => {
                match port {
                    None => port = Some(actual),
                    Some(expected) if expected != actual => {
                        tracing::error!(expected, actual, address = %addr, "Bound sockets disagree on port");
                        return Err(AddPortError::PortMismatch { expected, actual });
                    }
                    Some(_) => {}
                }
                bound += 1;
            }
            Err(e) => {
                tracing::warn!(address = %addr, error = %e, "Failed to bind address");
            }
        }
    }

    let Some(port) = port else {
        tracing::error!(resolved = addrs.len(), "No address added out of total resolved");
        return Err(AddPortError::NoAddressBound { resolved: addrs.len() });
    };

    if bound < addrs.len() {
        tracing::warn!(bound, resolved = addrs.len(), "Only some resolved addresses were added");
        if policy == BindPolicy::Strict {
            return Err(AddPortError::PartialBind {
                bound,
                resolved: addrs.len(),
            });
        }
    }

    Ok(port)
}

/// Listener pairing bound sockets with a security context.
pub struct SecureListener {
    tcp: TcpServer,
    ctx: Arc<SecurityContext>,
    server: Weak<Server>,
    handshakes: HandshakeTracker,
    handshake_timeout: Duration,
}

impl SecureListener {
    pub fn new(tcp: TcpServer, ctx: Arc<SecurityContext>, server: &Arc<Server>) -> Self {
        Self {
            tcp,
            ctx,
            server: Arc::downgrade(server),
            handshakes: server.handshake_tracker().clone(),
            handshake_timeout: server.handshake_timeout(),
        }
    }
}

#[async_trait]
impl Listener for SecureListener {
    fn start(&mut self, runtime: &Handle) {
        let ctx = Arc::clone(&self.ctx);
        let server = self.server.clone();
        let handshakes = self.handshakes.clone();
        let timeout = self.handshake_timeout;
        let spawner = runtime.clone();

        self.tcp.start(
            runtime,
            Arc::new(move |stream, peer| {
                on_accept(&spawner, &ctx, &server, &handshakes, timeout, stream, peer)
            }),
        );
    }

    async fn destroy(self: Box<Self>) {
        let SecureListener { tcp, ctx, .. } = *self;
        let addrs = tcp.local_addrs().to_vec();
        tcp.shutdown().await;
        drop(ctx);
        tracing::info!(addresses = ?addrs, "Secure listener destroyed");
    }

    fn local_addrs(&self) -> Vec<SocketAddr> {
        self.tcp.local_addrs().to_vec()
    }
}

/// Launch the handshake for one accepted connection. Never blocks.
fn on_accept(
    runtime: &Handle,
    ctx: &Arc<SecurityContext>,
    server: &Weak<Server>,
    handshakes: &HandshakeTracker,
    timeout: Duration,
    stream: TcpStream,
    peer: SocketAddr,
) {
    metrics::record_accept();
    let mut conn = Connection::accepted(peer);
    tracing::debug!(connection_id = %conn.id(), peer = %peer, "Connection accepted");

    let guard = handshakes.track(conn.id());
    advance(&mut conn, ConnectionState::HandshakePending);

    let ctx = Arc::clone(ctx);
    let server = server.clone();
    runtime.spawn(async move {
        let result = ctx.handshake(stream, timeout).await;
        drop(ctx);
        on_handshake_done(&server, conn, result, guard);
    });
}

/// Runs exactly once per launched handshake.
fn on_handshake_done(
    server: &Weak<Server>,
    mut conn: Connection,
    result: Result<SecureEndpoint, HandshakeError>,
    _guard: HandshakeGuard,
) {
    let endpoint = match result {
        Ok(endpoint) => endpoint,
        Err(e) => {
            metrics::record_handshake(e.status());
            advance(&mut conn, ConnectionState::Failed);
            tracing::error!(
                connection_id = %conn.id(),
                peer = %conn.peer(),
                status = e.status(),
                error = %e,
                "Secure transport failed"
            );
            return;
        }
    };

    metrics::record_handshake("ok");
    advance(&mut conn, ConnectionState::Secured);

    let Some(server) = server.upgrade() else {
        tracing::debug!(connection_id = %conn.id(), "Server gone; dropping secured connection");
        advance(&mut conn, ConnectionState::Failed);
        return;
    };

    let args = server.channel_args().clone();
    match install_transport(&server, endpoint, &args) {
        Ok(transport_id) => {
            advance(&mut conn, ConnectionState::Installed);
            tracing::debug!(connection_id = %conn.id(), transport_id = %transport_id, "Secure transport ready");
        }
        Err(e) => {
            advance(&mut conn, ConnectionState::Failed);
            tracing::error!(connection_id = %conn.id(), error = %e, "Failed to install transport");
        }
    }
}

fn advance(conn: &mut Connection, next: ConnectionState) {
    if let Err(e) = conn.advance(next) {
        tracing::warn!(error = %e, "Connection state not advanced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::StaticResolver;

    fn server_with(resolver: StaticResolver, policy: BindPolicy) -> Arc<Server> {
        Server::builder()
            .resolver(Arc::new(resolver))
            .bind_policy(policy)
            .build()
    }

    fn addr(s: &str) -> SocketAddr {
        s.parse().unwrap()
    }

    fn occupied() -> (std::net::TcpListener, SocketAddr) {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn bind_all_counts_partial_success() {
        let mut tcp = TcpServer::new();
        let (_held, taken) = occupied();
        let addrs = [addr("127.0.0.1:0"), taken];
        let port = bind_all(&mut tcp, &addrs, BindPolicy::BestEffort).unwrap();
        assert_eq!(tcp.len(), 1);
        assert_eq!(tcp.port(), Some(port));
    }

    #[tokio::test]
    async fn bind_all_strict_rejects_partial_success() {
        let mut tcp = TcpServer::new();
        let (_held, taken) = occupied();
        let addrs = [addr("127.0.0.1:0"), taken];
        let err = bind_all(&mut tcp, &addrs, BindPolicy::Strict).unwrap_err();
        assert!(matches!(err, AddPortError::PartialBind { bound: 1, resolved: 2 }));
    }

    #[tokio::test]
    async fn bind_all_reports_port_mismatch() {
        let other = std::net::TcpListener::bind("127.0.0.2:0").unwrap();
        let other_port = other.local_addr().unwrap().port();
        drop(other);

        let mut tcp = TcpServer::new();
        let addrs = [addr("127.0.0.1:0"), SocketAddr::new("127.0.0.2".parse().unwrap(), other_port)];
        let err = bind_all(&mut tcp, &addrs, BindPolicy::BestEffort).unwrap_err();
        assert!(matches!(err, AddPortError::PortMismatch { actual, .. } if actual == other_port));
    }

    #[tokio::test]
    async fn unsupported_credentials_fail_before_resolution() {
        // The resolver knows nothing, so reaching it would yield a Resolve error.
        let server = server_with(StaticResolver::new(), BindPolicy::BestEffort);
        let err = add_secure_port(&server, "anywhere", &ServerCredentials::of_type("alts"))
            .await
            .unwrap_err();
        assert!(matches!(err, AddPortError::Credentials(SecurityError::UnsupportedCredentials(_))));
        assert_eq!(server.listener_count(), 0);
    }

    #[tokio::test]
    async fn sentinel_form_returns_zero_on_failure() {
        let server = server_with(StaticResolver::new(), BindPolicy::BestEffort);
        assert_eq!(add_secure_port_or_zero(&server, "nowhere", &ServerCredentials::fake()).await, 0);
        assert_eq!(server.listener_count(), 0);
    }

    #[tokio::test]
    async fn destroy_releases_context_reference() {
        let resolver = StaticResolver::new().with_entry("local", vec![addr("127.0.0.1:0")]);
        let server = server_with(resolver, BindPolicy::BestEffort);
        let ctx = Arc::new(SecurityContext::fake());

        add_secure_port_with_context(&server, "local", Arc::clone(&ctx)).await.unwrap();
        assert_eq!(Arc::strong_count(&ctx), 2);

        server.shutdown().await;
        assert_eq!(Arc::strong_count(&ctx), 1);
        assert_eq!(server.listener_count(), 0);
    }
}
