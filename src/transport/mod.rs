//! Protocol transport subsystem.
//!
//! # Data Flow
//! ```text
//! SecureEndpoint (handshake succeeded)
//!     → installer.rs (build filter chain, ask the factory for a transport)
//!     → TransportFactory (framed.rs by default)
//!     → TransportTable (server's connection table, until the transport ends)
//!
//! Per inbound message:
//!     → filter.rs chain (http_server, then http)
//!     → dispatch.rs Dispatcher
//! ```
//!
//! # Design Decisions
//! - A transport is a future; the installer spawns it and owns its table entry
//! - Transports outlive the listener that accepted them

pub mod dispatch;
pub mod filter;
pub mod framed;
pub mod installer;

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use thiserror::Error;
use tokio::task::AbortHandle;

use crate::config::ChannelArgs;
use crate::security::SecureEndpoint;

pub use dispatch::{Dispatcher, EchoDispatcher};
pub use filter::{Filter, FilterChain, FilterError, ProtocolFilter, ServerAdaptationFilter};
pub use framed::FramedTransportFactory;
pub use installer::install_transport;

static TRANSPORT_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an installed transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportId(u64);

impl TransportId {
    pub fn new() -> Self {
        Self(TRANSPORT_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for TransportId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransportId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "transport-{}", self.0)
    }
}

/// Error type for transport construction.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("transport setup failed: {0}")]
    Setup(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// The server's connection table was closed by shutdown.
    #[error("server is shut down")]
    Closed,
}

/// Everything a factory needs to build a transport.
pub struct TransportSetup {
    pub id: TransportId,
    pub endpoint: SecureEndpoint,
    pub args: ChannelArgs,
    pub filters: FilterChain,
    pub dispatcher: Arc<dyn Dispatcher>,
}

/// A running transport: completes when the connection is finished.
pub type TransportFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Builds protocol transports over secured channels.
pub trait TransportFactory: Send + Sync {
    fn create_transport(&self, setup: TransportSetup) -> Result<TransportFuture, TransportError>;
}

/// Connection table entry for an installed transport.
#[derive(Debug, Clone)]
pub struct TransportInfo {
    pub id: TransportId,
    pub peer: Option<SocketAddr>,
    pub secure: bool,
    pub filters: Vec<&'static str>,
}

#[derive(Debug)]
struct TableEntry {
    info: TransportInfo,
    task: AbortHandle,
}

/// The server's table of live transports.
#[derive(Debug, Default)]
pub struct TransportTable {
    entries: DashMap<TransportId, TableEntry>,
    closed: AtomicBool,
}

impl TransportTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: TransportId) -> Option<TransportInfo> {
        self.entries.get(&id).map(|entry| entry.info.clone())
    }

    pub fn ids(&self) -> Vec<TransportId> {
        self.entries.iter().map(|entry| *entry.key()).collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Insert a running transport. Fails once the table is closed, in which
    /// case the entry is gone and the caller must abort `task`.
    fn register(&self, info: TransportInfo, task: AbortHandle) -> Result<(), TransportError> {
        let id = info.id;
        self.entries.insert(id, TableEntry { info, task });
        // Checked after the insert: a concurrent close_all either sees the
        // entry or this sees the flag.
        if self.is_closed() {
            self.remove(id);
            return Err(TransportError::Closed);
        }
        crate::observability::metrics::set_active_transports(self.entries.len());
        Ok(())
    }

    fn remove(&self, id: TransportId) -> Option<TableEntry> {
        let removed = self.entries.remove(&id).map(|(_, entry)| entry);
        crate::observability::metrics::set_active_transports(self.entries.len());
        removed
    }

    /// Abort every live transport and refuse new ones.
    pub fn close_all(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for id in self.ids() {
            if let Some(entry) = self.remove(id) {
                entry.task.abort();
                tracing::debug!(transport_id = %id, "Transport closed");
            }
        }
    }
}
