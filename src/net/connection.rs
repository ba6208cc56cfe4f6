//! Per-connection state machine and handshake tracking.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Track each accepted connection through handshake and installation
//! - Count in-flight handshakes

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for an accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Where an accepted connection is in its setup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Raw connection accepted, nothing started yet.
    Accepted,
    /// Security handshake launched, completion not yet seen.
    HandshakePending,
    /// Handshake succeeded; secured channel available.
    Secured,
    /// Handshake failed; connection dropped.
    Failed,
    /// Protocol transport installed; the connection is no longer ours.
    Installed,
}

impl ConnectionState {
    /// Whether no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Failed | ConnectionState::Installed)
    }

    fn can_advance_to(self, next: ConnectionState) -> bool {
        use ConnectionState::*;
        matches!(
            (self, next),
            (Accepted, HandshakePending)
                | (HandshakePending, Secured)
                | (HandshakePending, Failed)
                | (Secured, Installed)
                | (Secured, Failed)
        )
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{id}: illegal transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub id: ConnectionId,
    pub from: ConnectionState,
    pub to: ConnectionState,
}

/// An accepted connection on its way to becoming a transport.
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    peer: SocketAddr,
    state: ConnectionState,
}

impl Connection {
    pub fn accepted(peer: SocketAddr) -> Self {
        Self {
            id: ConnectionId::new(),
            peer,
            state: ConnectionState::Accepted,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn advance(&mut self, next: ConnectionState) -> Result<(), InvalidTransition> {
        if !self.state.can_advance_to(next) {
            return Err(InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }
        tracing::trace!(connection_id = %self.id, from = ?self.state, to = ?next, "Connection state change");
        self.state = next;
        Ok(())
    }
}

/// Counts handshakes that have been launched but not completed.
#[derive(Debug, Clone, Default)]
pub struct HandshakeTracker {
    in_flight: Arc<AtomicU64>,
}

impl HandshakeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a launched handshake. The returned guard completes it on drop.
    pub fn track(&self, id: ConnectionId) -> HandshakeGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        HandshakeGuard {
            in_flight: Arc::clone(&self.in_flight),
            id,
        }
    }

    pub fn in_flight(&self) -> u64 {
        self.in_flight.load(Ordering::SeqCst)
    }
}

/// Held by a handshake task for its whole lifetime.
#[derive(Debug)]
pub struct HandshakeGuard {
    in_flight: Arc<AtomicU64>,
    id: ConnectionId,
}

impl Drop for HandshakeGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        tracing::trace!(connection_id = %self.id, "Handshake finished");
    }
}
