//! Secure port server.
//!
//! ```text
//!   config.toml ──▶ ServerConfig ──▶ Server + secure ports
//!
//!   client ──TCP──▶ TcpServer ──▶ SecurityContext::handshake ──▶ install_transport
//!                   (per address)   (TLS or fake)                  (http_server, http filters
//!                                                                   → Dispatcher)
//! ```

use std::path::PathBuf;

use clap::Parser;

use secure_port::config::load_config;
use secure_port::lifecycle::{signals, start_server, Shutdown};
use secure_port::observability::{logging, metrics};
use secure_port::ServerBuilder;

#[derive(Parser)]
#[command(name = "secure-port-server")]
#[command(about = "RPC server exposing TLS-secured ports", long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "secure-port.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    logging::init(&config.observability.log_level)?;
    tracing::info!(config = %cli.config.display(), ports = config.ports.len(), "secure-port-server starting");

    if config.observability.metrics_enabled {
        // Validation guarantees the address parses.
        let addr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr)?;
    }

    let server = start_server(&config, ServerBuilder::from_config(&config)).await?;
    tracing::info!(addresses = ?server.listening_addrs(), "Listening for connections");

    let shutdown = Shutdown::new();
    let mut shutdown_rx = shutdown.subscribe();
    tokio::spawn(async move {
        signals::trigger_on_signal(&shutdown).await;
    });
    let _ = shutdown_rx.recv().await;

    server.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
