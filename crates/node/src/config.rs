//! Node Configuration

use anyhow::Context;
use chain_runtime::EngineConfig;
use rpc_server::RpcServerConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Node configuration, read from a JSON file. Missing fields take
/// their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Directory of the state database
    pub data_dir: PathBuf,
    /// Keep state in memory only
    pub in_memory: bool,
    /// Log a summary every N blocks
    pub log_interval: u32,
    pub engine: EngineConfig,
    pub rpc: RpcServerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            in_memory: false,
            log_interval: 100,
            engine: EngineConfig::default(),
            rpc: RpcServerConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&text).with_context(|| format!("parsing config {}", path.display()))
    }
}
