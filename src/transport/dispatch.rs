//! Request dispatch seam between transports and the application.

use async_trait::async_trait;

use crate::transport::TransportId;

/// Handles messages that made it through a transport's filter chain.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Handle one inbound message; a returned value is sent back as the reply.
    async fn dispatch(&self, transport: TransportId, message: Vec<u8>) -> Option<Vec<u8>>;
}

/// Replies with every message it receives.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoDispatcher;

#[async_trait]
impl Dispatcher for EchoDispatcher {
    async fn dispatch(&self, transport: TransportId, message: Vec<u8>) -> Option<Vec<u8>> {
        tracing::trace!(transport_id = %transport, bytes = message.len(), "Echo");
        Some(message)
    }
}
