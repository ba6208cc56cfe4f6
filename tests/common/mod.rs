//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::future::Future;
use std::io::Write;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName};
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

use secure_port::net::{ResolveError, Resolver, StaticResolver};
use secure_port::transport::{TransportError, TransportFactory, TransportFuture, TransportId, TransportSetup};
use secure_port::ServerCredentials;

pub fn addr(s: &str) -> SocketAddr {
    s.parse().unwrap()
}

/// A loopback address already held by a listening socket, so binding it
/// fails with `AddrInUse`. Keep the listener alive for the whole test.
pub fn occupied() -> (std::net::TcpListener, SocketAddr) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Resolver that counts lookups before delegating to a fixed table.
#[derive(Default)]
pub struct CountingResolver {
    inner: StaticResolver,
    calls: AtomicUsize,
}

impl CountingResolver {
    pub fn new(inner: StaticResolver) -> Self {
        Self {
            inner,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for CountingResolver {
    async fn resolve(&self, address: &str, default_service: &str) -> Result<Vec<SocketAddr>, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve(address, default_service).await
    }
}

/// What the recording factory saw for one installed transport.
#[derive(Debug, Clone)]
pub struct Installed {
    pub id: TransportId,
    pub filters: Vec<&'static str>,
    pub secure: bool,
    pub alpn: Option<Vec<u8>>,
}

/// Transport factory that reports every installation and then idles until
/// the peer closes.
pub struct RecordingFactory {
    tx: mpsc::UnboundedSender<Installed>,
}

impl RecordingFactory {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Installed>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), rx)
    }
}

impl TransportFactory for RecordingFactory {
    fn create_transport(&self, setup: TransportSetup) -> Result<TransportFuture, TransportError> {
        let _ = self.tx.send(Installed {
            id: setup.id,
            filters: setup.filters.names(),
            secure: setup.endpoint.is_secure(),
            alpn: setup.endpoint.alpn_protocol().map(<[u8]>::to_vec),
        });
        let mut endpoint = setup.endpoint;
        Ok(Box::pin(async move {
            let mut buf = [0u8; 256];
            loop {
                match endpoint.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        }))
    }
}

/// Self-signed certificate for `localhost` written to temporary PEM files.
pub struct TlsFixture {
    pub cert_file: NamedTempFile,
    pub key_file: NamedTempFile,
    pub cert_der: CertificateDer<'static>,
}

impl TlsFixture {
    pub fn generate() -> Self {
        let certified = rcgen::generate_simple_self_signed(vec!["localhost".into()]).unwrap();

        let mut cert_file = NamedTempFile::new().unwrap();
        cert_file.write_all(certified.cert.pem().as_bytes()).unwrap();
        cert_file.flush().unwrap();

        let mut key_file = NamedTempFile::new().unwrap();
        key_file.write_all(certified.key_pair.serialize_pem().as_bytes()).unwrap();
        key_file.flush().unwrap();

        Self {
            cert_file,
            key_file,
            cert_der: certified.cert.der().clone(),
        }
    }

    pub fn credentials(&self) -> ServerCredentials {
        ServerCredentials::ssl(self.cert_file.path(), self.key_file.path())
    }

    pub fn connector(&self) -> TlsConnector {
        let mut roots = RootCertStore::empty();
        roots.add(self.cert_der.clone()).unwrap();
        let mut config = ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
            .with_safe_default_protocol_versions()
            .unwrap()
            .with_root_certificates(roots)
            .with_no_client_auth();
        config.alpn_protocols = vec![b"h2".to_vec()];
        TlsConnector::from(Arc::new(config))
    }

    pub async fn connect(&self, port: u16) -> std::io::Result<TlsStream<TcpStream>> {
        let tcp = TcpStream::connect(("127.0.0.1", port)).await?;
        let domain = ServerName::try_from("localhost").unwrap();
        self.connector().connect(domain, tcp).await
    }
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Await `fut` for at most two seconds.
pub async fn within<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), fut)
        .await
        .expect("timed out")
}

/// Collects the messages of WARN-level events.
#[derive(Clone, Default)]
pub struct WarningCapture {
    messages: Arc<Mutex<Vec<String>>>,
}

impl WarningCapture {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

struct MessageVisitor<'a>(&'a mut String);

impl Visit for MessageVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.0 = format!("{value:?}");
        }
    }
}

impl<S: Subscriber> Layer<S> for WarningCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            let mut message = String::new();
            event.record(&mut MessageVisitor(&mut message));
            self.messages.lock().unwrap().push(message);
        }
    }
}
