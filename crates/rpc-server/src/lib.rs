//! RPC Server - JSON-RPC over HTTP for a chain engine
//!
//! - postRequest: queue a request for execution
//! - callView: run a view against the committed state
//! - getChainInfo, findContract, getFeeInfo, getBalance, getBlockInfo,
//!   getBacklogLength, getHealth, getVersion

pub mod http_server;
pub mod methods;

pub use http_server::HttpRpcServer;
pub use methods::{RpcContext, RpcError};

use serde::{Deserialize, Serialize};

/// RPC Server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcServerConfig {
    /// HTTP RPC bind address
    pub http_addr: String,
    /// Serve RPC at all
    pub enabled: bool,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            http_addr: "127.0.0.1:8899".to_string(),
            enabled: true,
        }
    }
}
