//! Metrics collection and exposition.
//!
//! # Metrics
//! - `secure_port_connections_accepted_total` (counter): raw connections accepted
//! - `secure_port_handshakes_total` (counter): completed handshakes by `result`
//! - `secure_port_transports_installed_total` (counter): transports installed
//! - `secure_port_active_transports` (gauge): entries in the connection table
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_accept() {
    metrics::counter!("secure_port_connections_accepted_total").increment(1);
}

/// `result` is `ok` or the failure status of the handshake.
pub fn record_handshake(result: &'static str) {
    metrics::counter!("secure_port_handshakes_total", "result" => result).increment(1);
}

pub fn record_transport_installed() {
    metrics::counter!("secure_port_transports_installed_total").increment(1);
}

pub fn set_active_transports(count: usize) {
    metrics::gauge!("secure_port_active_transports").set(count as f64);
}
