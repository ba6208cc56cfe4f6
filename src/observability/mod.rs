//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Listener, handshake and installer code produce:
//!     → tracing events (logging.rs installs the subscriber)
//!     → metrics.rs (counters and gauges)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape, optional)
//! ```

pub mod logging;
pub mod metrics;
