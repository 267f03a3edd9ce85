//! Connection transport abstraction.
//!
//! The dispatch handler talks to a connection only through [`Transport`]:
//! read exactly `n` bytes, write bytes, close. [`StreamTransport`] adapts any
//! tokio byte stream (a `TcpStream`, or one half of `tokio::io::duplex` in
//! tests).

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Unique identifier for an accepted connection, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub u64);

impl ConnectionId {
    /// Next process-wide id. Ids start at 1.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One client connection.
///
/// Every method may suspend. Errors are fatal for this connection only.
#[async_trait]
pub trait Transport: Send {
    /// Reads exactly `n` bytes.
    async fn read_exact(&mut self, n: usize) -> io::Result<Bytes>;

    /// Writes all of `bytes` and flushes.
    async fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Closes the connection.
    async fn close(&mut self) -> io::Result<()>;

    /// Remote address, when known.
    fn peer(&self) -> Option<SocketAddr> {
        None
    }
}

/// [`Transport`] over a tokio byte stream.
#[derive(Debug)]
pub struct StreamTransport<S> {
    stream: S,
    peer: Option<SocketAddr>,
}

impl<S> StreamTransport<S> {
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self { stream, peer: None }
    }

    #[must_use]
    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    /// Returns the wrapped stream.
    pub fn into_inner(self) -> S {
        self.stream
    }
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn read_exact(&mut self, n: usize) -> io::Result<Bytes> {
        let mut buf = BytesMut::zeroed(n);
        self.stream.read_exact(&mut buf).await?;
        Ok(buf.freeze())
    }

    async fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes).await?;
        self.stream.flush().await
    }

    async fn close(&mut self) -> io::Result<()> {
        self.stream.shutdown().await
    }

    fn peer(&self) -> Option<SocketAddr> {
        self.peer
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::duplex;

    use super::*;

    #[test]
    fn connection_ids_increase() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert!(b.0 > a.0);
        assert!(a.0 >= 1);
    }

    #[tokio::test]
    async fn reads_exact_byte_counts() {
        let (client, server) = duplex(64);
        let mut client = StreamTransport::new(client);
        let mut server = StreamTransport::new(server);

        client.write(b"hello world").await.unwrap();
        assert_eq!(&server.read_exact(5).await.unwrap()[..], b"hello");
        assert_eq!(&server.read_exact(6).await.unwrap()[..], b" world");
    }

    #[tokio::test]
    async fn short_stream_is_unexpected_eof() {
        let (client, server) = duplex(64);
        let mut client = StreamTransport::new(client);
        let mut server = StreamTransport::new(server);

        client.write(b"abc").await.unwrap();
        client.close().await.unwrap();
        let err = server.read_exact(10).await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[tokio::test]
    async fn close_is_seen_as_eof_by_peer() {
        let (client, server) = duplex(64);
        let mut server = StreamTransport::new(server);
        server.write(b"bye").await.unwrap();
        server.close().await.unwrap();

        let mut client = client;
        let mut out = Vec::new();
        client.read_to_end(&mut out).await.unwrap();
        assert_eq!(out, b"bye");
    }

    #[test]
    fn peer_is_reported_when_set() {
        let (_a, b) = duplex(8);
        let addr: SocketAddr = "10.0.0.1:4000".parse().unwrap();
        assert_eq!(StreamTransport::new(b).with_peer(addr).peer(), Some(addr));
    }
}
