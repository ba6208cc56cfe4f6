//! Multi-address TCP listener.
//!
//! # Responsibilities
//! - Bind one listening socket per resolved address
//! - Keep every bound socket on one canonical port
//! - Run an accept loop per socket once started
//! - Stop accepting, and join the accept loops, on shutdown
//!
//! # Design Decisions
//! - Binding is synchronous; accepting starts only on `start`
//! - A port-0 address bound after the first socket reuses the first port
//! - The accept callback runs inside the accept loop, so joining the loops
//!   guarantees no callback fires after `shutdown` returns

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Default listen backlog.
pub const DEFAULT_BACKLOG: u32 = 1024;

/// Pause after a failed `accept` (e.g. descriptor exhaustion).
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Invoked once per accepted raw connection.
pub type AcceptCallback = Arc<dyn Fn(TcpStream, SocketAddr) + Send + Sync>;

/// Owns every listening socket bound for one port registration.
pub struct TcpServer {
    /// Bound sockets waiting for `start`.
    pending: Vec<TcpListener>,
    /// Local addresses of every bound socket.
    local_addrs: Vec<SocketAddr>,
    backlog: u32,
    running: Option<AcceptLoops>,
}

struct AcceptLoops {
    stop_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl TcpServer {
    /// Create an empty listener.
    pub fn new() -> Self {
        Self::with_backlog(DEFAULT_BACKLOG)
    }

    pub fn with_backlog(backlog: u32) -> Self {
        Self {
            pending: Vec::new(),
            local_addrs: Vec::new(),
            backlog,
            running: None,
        }
    }

    /// Bind `addr` and return the port it ended up on.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn add_port(&mut self, addr: SocketAddr) -> std::io::Result<u16> {
        let mut addr = addr;
        if addr.port() == 0 {
            if let Some(port) = self.port() {
                addr.set_port(port);
            }
        }

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(self.backlog)?;
        let local_addr = listener.local_addr()?;

        tracing::debug!(address = %local_addr, "Socket bound");

        self.local_addrs.push(local_addr);
        self.pending.push(listener);
        Ok(local_addr.port())
    }

    /// Port shared by the bound sockets, if any are bound.
    pub fn port(&self) -> Option<u16> {
        self.local_addrs.first().map(SocketAddr::port)
    }

    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.local_addrs
    }

    /// Number of bound sockets.
    pub fn len(&self) -> usize {
        self.local_addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.local_addrs.is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Begin accepting on every bound socket.
    pub fn start(&mut self, runtime: &Handle, on_accept: AcceptCallback) {
        if self.running.is_some() {
            tracing::warn!(addresses = ?self.local_addrs, "Listener already started");
            return;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let tasks = self
            .pending
            .drain(..)
            .map(|listener| {
                runtime.spawn(accept_loop(listener, stop_rx.clone(), Arc::clone(&on_accept)))
            })
            .collect();

        tracing::info!(addresses = ?self.local_addrs, "Accepting connections");
        self.running = Some(AcceptLoops { stop_tx, tasks });
    }

    /// Stop accepting and close every socket.
    ///
    /// Returns once every accept loop has exited.
    pub async fn shutdown(mut self) {
        self.pending.clear();
        if let Some(loops) = self.running.take() {
            let _ = loops.stop_tx.send(true);
            for task in loops.tasks {
                if let Err(e) = task.await {
                    tracing::warn!(error = %e, "Accept loop ended abnormally");
                }
            }
        }
        tracing::debug!(addresses = ?self.local_addrs, "Listener shut down");
    }
}

impl Default for TcpServer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        if let Some(loops) = self.running.take() {
            let _ = loops.stop_tx.send(true);
            for task in loops.tasks {
                task.abort();
            }
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut stop_rx: watch::Receiver<bool>,
    on_accept: AcceptCallback,
) {
    loop {
        tokio::select! {
            biased;
            _ = stop_rx.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => on_accept(stream, peer),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept connection");
                    tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            },
        }
    }
}
