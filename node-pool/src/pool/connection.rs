use crate::error::{PoolError, Result};
use async_trait::async_trait;
use common::{ServerAddr, ServerInfo};
use std::fmt;
use std::time::Duration;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A pooled connection to one node.
///
/// Framing, request correlation and the protocol handshake live behind this
/// trait; the pool only drives the lifecycle.
#[async_trait]
pub trait Connection: Send + Sync + fmt::Debug {
    fn id(&self) -> ConnectionId;

    /// Refreshes a reused connection against the node's current metadata
    /// before it is handed out again.
    async fn revalidate(&self, info: &ServerInfo, timeout: Duration) -> Result<()>;

    /// Lightweight round trip used by the health pinger.
    async fn probe(&self, timeout: Duration) -> Result<()>;

    async fn close(&self);
}

/// Plain TCP connection produced by the default dialer.
///
/// With no protocol layer attached, revalidation and probes check socket
/// liveness only: a peer that hung up or a socket in error fails them.
pub struct TcpConnection {
    id: ConnectionId,
    addr: ServerAddr,
    stream: Mutex<Option<TcpStream>>,
}

impl TcpConnection {
    pub fn new(addr: ServerAddr, stream: TcpStream) -> Self {
        Self {
            id: ConnectionId::new(),
            addr,
            stream: Mutex::new(Some(stream)),
        }
    }

    pub fn addr(&self) -> &ServerAddr {
        &self.addr
    }

    async fn check_alive(&self, limit: Duration) -> Result<()> {
        let guard = self.stream.lock().await;
        let stream = guard.as_ref().ok_or(PoolError::ConnectionClosed)?;
        let ready = timeout(limit, stream.ready(Interest::READABLE | Interest::WRITABLE))
            .await
            .map_err(|_| PoolError::ProbeTimeout(limit))??;
        if ready.is_read_closed() || ready.is_write_closed() || ready.is_error() {
            return Err(PoolError::ConnectionClosed);
        }
        Ok(())
    }
}

impl fmt::Debug for TcpConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpConnection")
            .field("id", &self.id)
            .field("addr", &self.addr.addr)
            .finish()
    }
}

#[async_trait]
impl Connection for TcpConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    async fn revalidate(&self, _info: &ServerInfo, timeout: Duration) -> Result<()> {
        self.check_alive(timeout)
            .await
            .map_err(|e| PoolError::Revalidate(e.to_string()))
    }

    async fn probe(&self, timeout: Duration) -> Result<()> {
        self.check_alive(timeout).await
    }

    async fn close(&self) {
        self.stream.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_connection_ids_are_unique() {
        assert_ne!(ConnectionId::new(), ConnectionId::new());
    }

    #[tokio::test]
    async fn test_tcp_connection_probe_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = TcpStream::connect(local).await.unwrap();
        let (_peer, _) = accept.await.unwrap();

        let conn = TcpConnection::new(ServerAddr::new(local.to_string(), local), stream);
        conn.probe(Duration::from_secs(1)).await.unwrap();
        conn.revalidate(&ServerInfo::default(), Duration::from_secs(1))
            .await
            .unwrap();

        conn.close().await;
        assert!(matches!(
            conn.probe(Duration::from_secs(1)).await,
            Err(PoolError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_tcp_connection_detects_peer_hangup() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let local = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let stream = TcpStream::connect(local).await.unwrap();
        let (peer, _) = accept.await.unwrap();
        drop(peer);

        let conn = TcpConnection::new(ServerAddr::new(local.to_string(), local), stream);
        // The FIN may take a moment to arrive.
        let mut failed = false;
        for _ in 0..50 {
            if conn.probe(Duration::from_millis(100)).await.is_err() {
                failed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(failed);
    }
}
