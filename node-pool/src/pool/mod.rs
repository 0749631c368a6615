pub mod connection;
pub mod dialer;
pub mod server;

pub use connection::{Connection, ConnectionId, TcpConnection};
pub use dialer::{DialFn, Dialer};
pub use server::{
    resync_channel, Acquired, ResyncSignal, Server, ServerOptions, DEFAULT_PING_INTERVAL,
};
