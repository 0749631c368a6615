use super::connection::{Connection, ConnectionId};
use super::dialer::Dialer;
use crate::error::{PoolError, Result};
use crate::health::{pinger, LatencyWindow};
use crate::stats;
use common::{ServerAddr, ServerInfo, TagSet};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(15);

/// Sending half of the single-slot "cluster resync requested" signal.
///
/// Notifications are dropped while one is already pending.
#[derive(Debug, Clone)]
pub struct ResyncSignal {
    tx: mpsc::Sender<()>,
}

impl ResyncSignal {
    /// Returns false when a resync was already pending or nobody listens.
    pub fn notify(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }
}

pub fn resync_channel() -> (ResyncSignal, mpsc::Receiver<()>) {
    let (tx, rx) = mpsc::channel(1);
    (ResyncSignal { tx }, rx)
}

#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub ping_interval: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
        }
    }
}

/// A connection handed out by [`Server::acquire`].
#[derive(Debug)]
pub struct Acquired {
    pub connection: Arc<dyn Connection>,
    /// Whether some connection to this server died abnormally before.
    pub abended: bool,
}

/// Everything a server's lock guards.
pub(crate) struct PoolState {
    idle: Vec<Arc<dyn Connection>>,
    live: Vec<Arc<dyn Connection>>,
    closed: bool,
    abended: bool,
    info: Arc<ServerInfo>,
    latency: LatencyWindow,
}

impl PoolState {
    fn new() -> Self {
        Self {
            idle: Vec::new(),
            live: Vec::new(),
            closed: false,
            abended: false,
            info: Arc::new(ServerInfo::default()),
            latency: LatencyWindow::new(),
        }
    }

    pub(crate) fn info(&self) -> &ServerInfo {
        &self.info
    }

    pub(crate) fn latency(&self) -> Duration {
        self.latency.value()
    }

    /// Connections currently checked out.
    pub(crate) fn in_use(&self) -> usize {
        self.live.len() - self.idle.len()
    }

    fn is_live(&self, id: ConnectionId) -> bool {
        self.live.iter().any(|c| c.id() == id)
    }

    fn is_idle(&self, id: ConnectionId) -> bool {
        self.idle.iter().any(|c| c.id() == id)
    }

    fn remove(&mut self, id: ConnectionId) -> bool {
        let live = self.live.len();
        let idle = self.idle.len();
        self.live.retain(|c| c.id() != id);
        self.idle.retain(|c| c.id() != id);
        self.live.len() != live || self.idle.len() != idle
    }
}

/// One cluster node and its pool of connections.
pub struct Server {
    addr: ServerAddr,
    resolved_addr: String,
    dialer: Dialer,
    resync: ResyncSignal,
    ping_interval: Duration,
    state: RwLock<PoolState>,
    shutdown_tx: watch::Sender<bool>,
    pinger: Mutex<Option<JoinHandle<()>>>,
}

impl Server {
    /// Creates the server and starts its background pinger.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        addr: ServerAddr,
        resync: ResyncSignal,
        dialer: Dialer,
        options: ServerOptions,
    ) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let server = Arc::new(Self {
            resolved_addr: addr.resolved_key(),
            addr,
            dialer,
            resync,
            ping_interval: options.ping_interval,
            state: RwLock::new(PoolState::new()),
            shutdown_tx,
            pinger: Mutex::new(None),
        });

        let handle = pinger::spawn(Arc::downgrade(&server), options.ping_interval, shutdown_rx);
        *server.pinger.lock() = Some(handle);
        server
    }

    pub fn addr(&self) -> &str {
        &self.addr.addr
    }

    pub fn server_addr(&self) -> &ServerAddr {
        &self.addr
    }

    /// Registry key; unique per node.
    pub fn resolved_addr(&self) -> &str {
        &self.resolved_addr
    }

    pub fn ping_interval(&self) -> Duration {
        self.ping_interval
    }

    /// Hands out a pooled connection, reusing an idle one when possible.
    ///
    /// With `pool_limit > 0`, fails with [`PoolError::PoolLimitReached`] as
    /// soon as that many connections are checked out; it never waits for
    /// one to come back.
    pub async fn acquire(&self, pool_limit: usize, timeout: Duration) -> Result<Acquired> {
        loop {
            let (reused, info, abended) = {
                let mut state = self.state.write();
                if state.closed {
                    return Err(PoolError::ServerClosed);
                }
                if pool_limit > 0 && state.in_use() >= pool_limit {
                    return Err(PoolError::PoolLimitReached);
                }
                (state.idle.pop(), Arc::clone(&state.info), state.abended)
            };

            if let Some(connection) = reused {
                match connection.revalidate(&info, timeout).await {
                    Ok(()) => {
                        // A close during revalidation already owns the connection.
                        if self.state.read().closed {
                            return Err(PoolError::ServerClosed);
                        }
                        return Ok(Acquired { connection, abended });
                    }
                    Err(e) => {
                        // The idle set is finite, so this loop ends in a reuse
                        // or a fresh dial.
                        debug!(
                            "Dropping connection {} to {}: {}",
                            connection.id(),
                            self.addr.addr,
                            e
                        );
                        let removed = self.state.write().remove(connection.id());
                        if removed {
                            connection.close().await;
                        }
                        continue;
                    }
                }
            }

            let connection = self.connect(timeout).await?;
            let closed = {
                let mut state = self.state.write();
                if !state.closed {
                    state.live.push(Arc::clone(&connection));
                }
                state.closed
            };
            if closed {
                // Closed while the dial was in flight.
                connection.close().await;
                return Err(PoolError::ServerClosed);
            }
            return Ok(Acquired {
                connection,
                abended,
            });
        }
    }

    /// Dials a new connection without adding it to the pool. Use
    /// [`Server::acquire`] for pooled access.
    pub async fn connect(&self, timeout: Duration) -> Result<Arc<dyn Connection>> {
        let primary = self.state.read().info.primary;

        debug!(
            "Establishing new connection to {} (timeout={:?})...",
            self.addr.addr, timeout
        );
        match self.dialer.dial(&self.addr, timeout).await {
            Ok(connection) => {
                info!("Connection to {} established", self.addr.addr);
                stats::record_dial(primary);
                Ok(connection)
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", self.addr.addr, e);
                Err(e)
            }
        }
    }

    /// Returns a healthy connection to the idle set.
    ///
    /// Connections the pool no longer tracks, including every connection
    /// after [`Server::close`], are ignored.
    pub fn release(&self, connection: &Arc<dyn Connection>) {
        let id = connection.id();
        let recycled = {
            let mut state = self.state.write();
            let recyclable = !state.closed && state.is_live(id) && !state.is_idle(id);
            if recyclable {
                state.idle.push(Arc::clone(connection));
            }
            recyclable
        };
        if !recycled {
            debug!("Not recycling connection {} to {}", id, self.addr.addr);
        }
    }

    /// Discards a connection that failed mid-operation.
    ///
    /// Marks the server abended and asks the topology refresher for a resync.
    /// Unknown connections are a no-op. Returns whether the connection was
    /// tracked.
    pub fn abend(&self, connection: &Arc<dyn Connection>) -> bool {
        let id = connection.id();
        let removed = {
            let mut state = self.state.write();
            let removed = state.remove(id);
            if removed {
                state.abended = true;
            }
            removed
        };
        if removed {
            warn!("Connection {} to {} terminated abnormally", id, self.addr.addr);
            // Maybe just a timeout, but the cluster view may be stale.
            self.resync.notify();
        }
        removed
    }

    /// Closes every connection, checked out or idle, and rejects all later
    /// acquisitions.
    pub async fn close(&self) {
        let (live, idle) = {
            let mut state = self.state.write();
            state.closed = true;
            (mem::take(&mut state.live), mem::take(&mut state.idle))
        };
        self.shutdown_tx.send_replace(true);

        info!(
            "Connections to {} closing ({} live connections)",
            self.addr.addr,
            live.len()
        );
        // Idle connections are a subset of live ones.
        drop(idle);
        for connection in live {
            connection.close().await;
        }
    }

    /// Replaces the node's metadata as a whole.
    pub fn set_info(&self, info: impl Into<Arc<ServerInfo>>) {
        let info = info.into();
        self.state.write().info = info;
    }

    pub fn info(&self) -> Arc<ServerInfo> {
        Arc::clone(&self.state.read().info)
    }

    pub fn has_tags(&self, tag_sets: &[TagSet]) -> bool {
        self.state.read().info.has_tags(tag_sets)
    }

    /// Runs one probe round trip and folds it into the latency window.
    ///
    /// A failed probe drops its connection without marking the server
    /// abended.
    pub async fn ping(&self, timeout: Duration) -> Result<Duration> {
        let Acquired { connection, .. } = self.acquire(0, timeout).await?;

        let start = Instant::now();
        let outcome = match time::timeout(timeout, connection.probe(timeout)).await {
            Ok(result) => result,
            Err(_) => Err(PoolError::ProbeTimeout(timeout)),
        };
        let elapsed = start.elapsed();

        if let Err(e) = outcome {
            let removed = self.state.write().remove(connection.id());
            if removed {
                connection.close().await;
            }
            return Err(e);
        }

        let latency = self.record_latency(elapsed);
        self.release(&connection);
        debug!("Ping for {} is {} ms", self.addr.addr, latency.as_millis());
        Ok(latency)
    }

    pub(crate) fn record_latency(&self, sample: Duration) -> Duration {
        self.state.write().latency.record(sample)
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, PoolState> {
        self.state.read()
    }

    pub fn latency(&self) -> Duration {
        self.state.read().latency.value()
    }

    pub fn latency_samples(&self) -> u32 {
        self.state.read().latency.count()
    }

    pub fn is_closed(&self) -> bool {
        self.state.read().closed
    }

    pub fn is_abended(&self) -> bool {
        self.state.read().abended
    }

    pub fn in_use(&self) -> usize {
        self.state.read().in_use()
    }

    pub fn live_count(&self) -> usize {
        self.state.read().live.len()
    }

    pub fn idle_count(&self) -> usize {
        self.state.read().idle.len()
    }

    pub fn is_pinging(&self) -> bool {
        self.pinger
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("addr", &self.addr.addr)
            .field("resolved_addr", &self.resolved_addr)
            .finish()
    }
}
