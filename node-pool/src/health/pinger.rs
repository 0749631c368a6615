use crate::error::PoolError;
use crate::pool::Server;
use std::sync::Weak;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use tracing::debug;

/// Spawns the background health probe for one server.
///
/// The task holds only a weak reference, so it ends when the server is
/// dropped, when its shutdown signal fires, or when a probe finds the pool
/// closed.
pub(crate) fn spawn(
    server: Weak<Server>,
    interval: Duration,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(run(server, interval, shutdown))
}

async fn run(server: Weak<Server>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
    loop {
        tokio::select! {
            _ = time::sleep(interval) => {}
            _ = shutdown.changed() => break,
        }

        let Some(server) = server.upgrade() else {
            break;
        };
        match server.ping(interval).await {
            Ok(_) => {}
            Err(PoolError::ServerClosed) => break,
            Err(e) => debug!("Ping for {} failed: {}", server.addr(), e),
        }
    }
    debug!("Pinger stopped");
}
