//! Transport installation for secured channels.

use std::sync::Arc;

use tokio::sync::oneshot;

use crate::config::ChannelArgs;
use crate::observability::metrics;
use crate::security::SecureEndpoint;
use crate::server::Server;
use crate::transport::filter::extra_server_filters;
use crate::transport::{TransportError, TransportId, TransportInfo, TransportSetup};

/// Build a transport over `endpoint` and register it with `server`.
///
/// The transport gets the server's required filters followed by the
/// adaptation and protocol filters. Once spawned it runs independently of
/// the listener that accepted it and leaves the connection table when done.
pub fn install_transport(
    server: &Arc<Server>,
    endpoint: SecureEndpoint,
    args: &ChannelArgs,
) -> Result<TransportId, TransportError> {
    let mut filters = server.required_filters().clone();
    filters.extend(extra_server_filters(args));

    let id = TransportId::new();
    let info = TransportInfo {
        id,
        peer: endpoint.peer_addr().ok(),
        secure: endpoint.is_secure(),
        filters: filters.names(),
    };

    let transport = server.transport_factory().create_transport(TransportSetup {
        id,
        endpoint,
        args: args.clone(),
        filters,
        dispatcher: server.dispatcher(),
    })?;

    // The transport runs only once its table entry exists, so its removal
    // can never precede the insert.
    let (registered_tx, registered_rx) = oneshot::channel::<()>();
    let weak = Arc::downgrade(server);
    let task = tokio::spawn(async move {
        if registered_rx.await.is_err() {
            return;
        }
        transport.await;
        if let Some(server) = weak.upgrade() {
            server.transports().remove(id);
        }
    });

    if let Err(e) = server.transports().register(info, task.abort_handle()) {
        task.abort();
        return Err(e);
    }
    let _ = registered_tx.send(());

    metrics::record_transport_installed();
    tracing::debug!(transport_id = %id, "Transport installed");
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn plain_endpoint() -> (SecureEndpoint, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).await.unwrap();
        let (stream, _) = listener.accept().await.unwrap();
        (SecureEndpoint::Insecure(stream), client)
    }

    #[tokio::test]
    async fn installed_transport_is_tracked_until_shutdown() {
        let server = Server::builder().build();
        let (endpoint, _client) = plain_endpoint().await;

        let id = install_transport(&server, endpoint, &ChannelArgs::default()).unwrap();
        let info = server.transports().get(id).unwrap();
        assert_eq!(info.filters, vec!["http_server", "http"]);

        server.shutdown().await;
        assert!(server.transports().is_empty());
    }

    #[tokio::test]
    async fn install_after_shutdown_is_refused() {
        let server = Server::builder().build();
        server.shutdown().await;
        let (endpoint, _client) = plain_endpoint().await;

        let err = install_transport(&server, endpoint, &ChannelArgs::default()).unwrap_err();
        assert!(matches!(err, TransportError::Closed));
        assert!(server.transports().is_empty());
    }
}
