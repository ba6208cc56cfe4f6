//! Secure listener subsystem for an RPC server.
//!
//! Binds resolved addresses, accepts connections, runs a TLS (or fake)
//! handshake on each and installs a framed protocol transport on success.

pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod security;
pub mod server;
pub mod transport;

pub use config::ServerConfig;
pub use security::{SecurityContext, ServerCredentials};
pub use server::{add_secure_port, add_secure_port_or_zero, AddPortError, Server, ServerBuilder};
