//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Endpoint string
//!     → resolver.rs (host/port split, name lookup)
//!     → listener.rs (bind every address on one port, accept loops)
//!     → connection.rs (per-connection state, handshake tracking)
//!     → Hand off to the security layer
//!
//! Connection States:
//!     Accepted → HandshakePending → Secured → Installed
//!                                 ↘ Failed
//! ```
//!
//! # Design Decisions
//! - Binding happens at setup; accepting only after `start`
//! - Partial binds are tolerated by the listener; policy lives in the caller

pub mod connection;
pub mod listener;
pub mod resolver;

pub use connection::{Connection, ConnectionId, ConnectionState, HandshakeTracker};
pub use listener::{AcceptCallback, TcpServer};
pub use resolver::{DnsResolver, ResolveError, Resolver, StaticResolver, DEFAULT_SERVICE};
