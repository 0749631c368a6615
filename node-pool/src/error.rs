use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("server was closed")]
    ServerClosed,

    #[error("per-server connection limit reached")]
    PoolLimitReached,

    #[error("failed to connect to {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("connecting to {addr} timed out after {timeout:?}")]
    DialTimeout { addr: String, timeout: Duration },

    #[error("connection failed revalidation: {0}")]
    Revalidate(String),

    #[error("probe timed out after {0:?}")]
    ProbeTimeout(Duration),

    #[error("connection is closed")]
    ConnectionClosed,

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PoolError {
    /// Expected conditions the caller handles by routing to another node
    /// or backing off, rather than failing the operation outright.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PoolError::ServerClosed | PoolError::PoolLimitReached)
    }
}

pub type Result<T> = std::result::Result<T, PoolError>;
