use super::connection::{Connection, TcpConnection};
use crate::error::{PoolError, Result};
use common::ServerAddr;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpSocket;
use tokio::time::timeout;

pub type DialFn =
    Arc<dyn Fn(ServerAddr) -> BoxFuture<'static, io::Result<Arc<dyn Connection>>> + Send + Sync>;

/// How new connections to a node are established.
#[derive(Clone, Default)]
pub enum Dialer {
    /// TCP connect to the resolved address with keepalive enabled.
    #[default]
    Tcp,
    Custom(DialFn),
}

impl Dialer {
    pub fn custom<F, Fut>(f: F) -> Self
    where
        F: Fn(ServerAddr) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = io::Result<Arc<dyn Connection>>> + Send + 'static,
    {
        Dialer::Custom(Arc::new(move |addr| Box::pin(f(addr))))
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, Dialer::Custom(_))
    }

    /// Establishes one connection. `limit` bounds the connect step only and
    /// a failure is returned as is, never retried here.
    pub async fn dial(&self, addr: &ServerAddr, limit: Duration) -> Result<Arc<dyn Connection>> {
        let attempt = async {
            match self {
                Dialer::Tcp => dial_tcp(addr).await,
                Dialer::Custom(dial) => dial(addr.clone()).await,
            }
        };

        match timeout(limit, attempt).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(source)) => Err(PoolError::Dial {
                addr: addr.addr.clone(),
                source,
            }),
            Err(_) => Err(PoolError::DialTimeout {
                addr: addr.addr.clone(),
                timeout: limit,
            }),
        }
    }
}

async fn dial_tcp(addr: &ServerAddr) -> io::Result<Arc<dyn Connection>> {
    let socket = if addr.resolved.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    socket.set_keepalive(true)?;
    let stream = socket.connect(addr.resolved).await?;
    stream.set_nodelay(true)?;
    Ok(Arc::new(TcpConnection::new(addr.clone(), stream)) as Arc<dyn Connection>)
}

impl fmt::Debug for Dialer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialer::Tcp => f.write_str("Dialer::Tcp"),
            Dialer::Custom(_) => f.write_str("Dialer::Custom"),
        }
    }
}
