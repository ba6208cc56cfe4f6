//! Secured channel produced by a successful handshake.

use std::io;
use std::net::SocketAddr;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;

/// A connection that has completed its security handshake.
#[derive(Debug)]
pub enum SecureEndpoint {
    /// TLS session over TCP.
    Tls(Box<TlsStream<TcpStream>>),
    /// Plain TCP from the fake security mode.
    Insecure(TcpStream),
}

impl SecureEndpoint {
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().peer_addr()
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.tcp().local_addr()
    }

    /// Whether the channel is protected by TLS.
    pub fn is_secure(&self) -> bool {
        matches!(self, SecureEndpoint::Tls(_))
    }

    /// ALPN protocol agreed during the handshake.
    pub fn alpn_protocol(&self) -> Option<&[u8]> {
        match self {
            SecureEndpoint::Tls(stream) => stream.get_ref().1.alpn_protocol(),
            SecureEndpoint::Insecure(_) => None,
        }
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            SecureEndpoint::Tls(stream) => stream.get_ref().0,
            SecureEndpoint::Insecure(stream) => stream,
        }
    }
}

impl AsyncRead for SecureEndpoint {
    fn poll_read(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &mut ReadBuf<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureEndpoint::Tls(stream) => Pin::new(stream.as_mut()).poll_read(cx, buf),
            SecureEndpoint::Insecure(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for SecureEndpoint {
    fn poll_write(self: Pin<&mut Self>, cx: &mut Context<'_>, buf: &[u8]) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SecureEndpoint::Tls(stream) => Pin::new(stream.as_mut()).poll_write(cx, buf),
            SecureEndpoint::Insecure(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureEndpoint::Tls(stream) => Pin::new(stream.as_mut()).poll_flush(cx),
            SecureEndpoint::Insecure(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureEndpoint::Tls(stream) => Pin::new(stream.as_mut()).poll_shutdown(cx),
            SecureEndpoint::Insecure(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}
