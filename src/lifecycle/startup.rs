//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the server from validated configuration
//! - Add every configured secure port
//! - Start the listeners
//!
//! # Design Decisions
//! - Fail fast: any port that cannot be added aborts startup
//! - Listeners start last (traffic only when every port is bound)

use std::sync::Arc;

use thiserror::Error;

use crate::config::ServerConfig;
use crate::server::{add_secure_port, AddPortError, Server, ServerBuilder};

/// Error type for server startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to add port '{address}': {source}")]
    Port {
        address: String,
        #[source]
        source: AddPortError,
    },
}

/// Add every port in `config` to a server built by `builder`, then start it.
pub async fn start_server(config: &ServerConfig, builder: ServerBuilder) -> Result<Arc<Server>, StartupError> {
    let server = builder.build();

    for port_config in &config.ports {
        match add_secure_port(&server, &port_config.address, &port_config.credentials).await {
            Ok(port) => {
                tracing::info!(
                    address = %port_config.address,
                    port,
                    credential_type = %port_config.credentials.credential_type,
                    "Port configured"
                );
            }
            Err(source) => {
                server.shutdown().await;
                return Err(StartupError::Port {
                    address: port_config.address.clone(),
                    source,
                });
            }
        }
    }

    server.start();
    Ok(server)
}
