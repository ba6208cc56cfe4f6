//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validated config → Build server → Add secure ports → Start listeners
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Destroy listeners → Close transports → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then ports, then listeners
//! - Ordered shutdown: stop accept first, then transports

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{start_server, StartupError};
