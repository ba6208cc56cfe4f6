//! RPC server surface: listener registry, connection table and secure ports.
//!
//! # Data Flow
//! ```text
//! Setup:
//!     add_secure_port → resolve → bind → SecureListener → ListenerRegistry
//!
//! Runtime (after Server::start):
//!     accept → handshake → install_transport → TransportTable
//!
//! Shutdown:
//!     ListenerRegistry::destroy_all → TransportTable::close_all
//! ```
//!
//! # Design Decisions
//! - Listeners hold a `Weak<Server>`; the server outlives them by contract
//! - Registration happens once, on the success path of port setup
//! - Once shut down, the server refuses new listeners

pub mod registry;
pub mod secure_port;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::config::{BindPolicy, ChannelArgs, ListenerConfig, ServerConfig};
use crate::net::{DnsResolver, HandshakeTracker, Resolver};
use crate::transport::{
    Dispatcher, EchoDispatcher, Filter, FilterChain, FramedTransportFactory, TransportFactory, TransportTable,
};

pub use registry::{Listener, ListenerRegistry, RegistryClosed, StartOutcome};
pub use secure_port::{
    add_insecure_port, add_secure_port, add_secure_port_or_zero, add_secure_port_with_context, AddPortError,
    SecureListener,
};

/// The server that secure ports register with.
pub struct Server {
    listener_config: ListenerConfig,
    handshake_timeout: Duration,
    channel_args: ChannelArgs,
    resolver: Arc<dyn Resolver>,
    transport_factory: Arc<dyn TransportFactory>,
    dispatcher: Arc<dyn Dispatcher>,
    required_filters: FilterChain,
    listeners: ListenerRegistry,
    transports: TransportTable,
    handshakes: HandshakeTracker,
}

impl Server {
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Start every registered listener on the current runtime.
    ///
    /// Listeners added afterwards start as soon as they are registered.
    pub fn start(&self) {
        match self.listeners.start_all(&Handle::current()) {
            StartOutcome::Started(listeners) => tracing::info!(listeners, "Server started"),
            StartOutcome::AlreadyRunning => tracing::warn!("Server already started"),
            StartOutcome::Closed => tracing::warn!("Server is shut down; not starting"),
        }
    }

    /// Destroy every listener, then close the remaining transports.
    ///
    /// Listeners offered afterwards are refused.
    pub async fn shutdown(&self) {
        self.listeners.destroy_all().await;
        self.transports.close_all();
        tracing::info!(
            pending_handshakes = self.handshakes.in_flight(),
            "Server shut down"
        );
    }

    /// Hand a fully built listener to the server.
    ///
    /// A running server starts the listener immediately. A shut down server
    /// drops it unstarted.
    pub fn add_listener(&self, listener: Box<dyn Listener>) -> Result<(), RegistryClosed> {
        self.listeners.register(listener)
    }

    pub fn is_started(&self) -> bool {
        self.listeners.is_running()
    }

    pub fn is_shut_down(&self) -> bool {
        self.listeners.is_closed()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Addresses of every registered listener.
    pub fn listening_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.local_addrs()
    }

    pub fn transports(&self) -> &TransportTable {
        &self.transports
    }

    /// Handshakes launched by this server's listeners that have not finished.
    pub fn pending_handshakes(&self) -> u64 {
        self.handshakes.in_flight()
    }

    pub fn channel_args(&self) -> &ChannelArgs {
        &self.channel_args
    }

    pub fn bind_policy(&self) -> BindPolicy {
        self.listener_config.bind_policy
    }

    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    pub fn backlog(&self) -> u32 {
        self.listener_config.backlog
    }

    pub fn resolver(&self) -> &dyn Resolver {
        self.resolver.as_ref()
    }

    pub fn transport_factory(&self) -> &dyn TransportFactory {
        self.transport_factory.as_ref()
    }

    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// Filters every transport gets ahead of the fixed server filters.
    pub fn required_filters(&self) -> &FilterChain {
        &self.required_filters
    }

    pub(crate) fn handshake_tracker(&self) -> &HandshakeTracker {
        &self.handshakes
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("listeners", &self.listeners)
            .field("transports", &self.transports.len())
            .finish()
    }
}

/// Builder for [`Server`].
pub struct ServerBuilder {
    listener_config: ListenerConfig,
    handshake_timeout: Option<Duration>,
    channel_args: ChannelArgs,
    resolver: Arc<dyn Resolver>,
    transport_factory: Arc<dyn TransportFactory>,
    dispatcher: Arc<dyn Dispatcher>,
    required_filters: FilterChain,
}

impl ServerBuilder {
    pub fn new() -> Self {
        Self {
            listener_config: ListenerConfig::default(),
            handshake_timeout: None,
            channel_args: ChannelArgs::default(),
            resolver: Arc::new(DnsResolver),
            transport_factory: Arc::new(FramedTransportFactory),
            dispatcher: Arc::new(EchoDispatcher),
            required_filters: FilterChain::new(),
        }
    }

    /// Builder seeded with the listener and channel settings of `config`.
    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new()
            .listener_config(config.listener.clone())
            .channel_args(config.channel_args.clone())
    }

    pub fn listener_config(mut self, config: ListenerConfig) -> Self {
        self.listener_config = config;
        self
    }

    pub fn bind_policy(mut self, policy: BindPolicy) -> Self {
        self.listener_config.bind_policy = policy;
        self
    }

    /// Override the configured handshake timeout.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = Some(timeout);
        self
    }

    pub fn channel_args(mut self, args: ChannelArgs) -> Self {
        self.channel_args = args;
        self
    }

    pub fn resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transport_factory = factory;
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn Dispatcher>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    /// Add a filter the server requires on every transport.
    pub fn required_filter(mut self, filter: Arc<dyn Filter>) -> Self {
        self.required_filters.push(filter);
        self
    }

    pub fn build(self) -> Arc<Server> {
        let handshake_timeout = self
            .handshake_timeout
            .unwrap_or_else(|| self.listener_config.handshake_timeout());
        Arc::new(Server {
            listener_config: self.listener_config,
            handshake_timeout,
            channel_args: self.channel_args,
            resolver: self.resolver,
            transport_factory: self.transport_factory,
            dispatcher: self.dispatcher,
            required_filters: self.required_filters,
            listeners: ListenerRegistry::new(),
            transports: TransportTable::new(),
            handshakes: HandshakeTracker::new(),
        })
    }
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
