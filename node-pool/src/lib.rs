pub mod config;
pub mod error;
pub mod health;
pub mod pool;
pub mod registry;
pub mod stats;


pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use pool::{resync_channel, Acquired, Connection, Dialer, ResyncSignal, Server, ServerOptions};
pub use registry::Servers;
