use anyhow::{ensure, Context};
use common::{ReadMode, TagSet};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::pool::ServerOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Node addresses, "host:port".
    pub seeds: Vec<String>,
    /// Checked-out connections allowed per node; 0 disables the limit.
    pub pool_limit: usize,
    pub dial_timeout_ms: u64,
    pub ping_interval_ms: u64,
    pub latency_tolerance_ms: u64,
    pub read_mode: ReadMode,
    pub tag_sets: Vec<TagSet>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            seeds: vec!["127.0.0.1:27017".to_string()],
            pool_limit: 4096,
            dial_timeout_ms: 10_000,
            ping_interval_ms: 15_000,
            latency_tolerance_ms: 15,
            read_mode: ReadMode::default(),
            tag_sets: Vec::new(),
        }
    }
}

impl PoolConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read pool config: {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid pool config: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse pool config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.dial_timeout_ms > 0, "dial_timeout_ms must be positive");
        ensure!(self.ping_interval_ms > 0, "ping_interval_ms must be positive");
        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_millis(self.dial_timeout_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn latency_tolerance(&self) -> Duration {
        Duration::from_millis(self.latency_tolerance_ms)
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            ping_interval: self.ping_interval(),
        }
    }
}
