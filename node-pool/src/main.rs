use anyhow::{Context, Result};
use common::{ReadMode, ServerAddr};
use node_pool::pool::{resync_channel, Dialer, Server};
use node_pool::{PoolConfig, Servers};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Usage: node-pool [config.toml] [read-mode]
    let mut args = std::env::args().skip(1);
    let mut config = match args.next() {
        Some(path) => PoolConfig::from_file(&path)?,
        None => PoolConfig::default(),
    };
    if let Some(mode) = args.next() {
        config.read_mode = mode.parse::<ReadMode>()?;
    }

    info!("Probing {} seeds", config.seeds.len());

    let (resync, mut resync_rx) = resync_channel();
    let mut servers = Servers::with_latency_tolerance(config.latency_tolerance());
    for seed in &config.seeds {
        let resolved = tokio::net::lookup_host(seed.as_str())
            .await
            .with_context(|| format!("Failed to resolve {}", seed))?;
        for addr in resolved {
            let server = Server::new(
                ServerAddr::new(seed.clone(), addr),
                resync.clone(),
                Dialer::Tcp,
                config.server_options(),
            );
            if let Some(old) = servers.add(server) {
                old.close().await;
            }
        }
    }

    for server in servers.iter() {
        match server.ping(config.dial_timeout()).await {
            Ok(latency) => info!("{} answered in {} ms", server.addr(), latency.as_millis()),
            Err(e) => warn!("{} did not answer: {}", server.addr(), e),
        }
    }

    for mode in ReadMode::ALL {
        match servers.best_fit(mode, &config.tag_sets) {
            Some(server) => info!(
                "Best fit for {}: {} (latency {} ms, {} in use)",
                mode,
                server.resolved_addr(),
                server.latency().as_millis(),
                server.in_use()
            ),
            None => warn!("No server fits {}", mode),
        }
    }

    if let Some(server) = servers.best_fit(config.read_mode, &config.tag_sets) {
        match server.acquire(config.pool_limit, config.dial_timeout()).await {
            Ok(acquired) => {
                info!(
                    "Acquired connection {} to {}",
                    acquired.connection.id(),
                    server.addr()
                );
                server.release(&acquired.connection);
            }
            Err(e) if e.is_retryable() => warn!("{} is unavailable: {}", server.addr(), e),
            Err(e) => warn!("Failed to acquire from {}: {}", server.addr(), e),
        }
    }

    if resync_rx.try_recv().is_ok() {
        info!("A cluster resync was requested");
    }

    for server in servers.iter() {
        server.close().await;
    }
    Ok(())
}
