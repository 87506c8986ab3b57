//! Engine Configuration

use chain_types::{Address, AgentId, ChainId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::{INTAKE_CAPACITY, MAX_BATCH_SIZE, POLL_INTERVAL_MS, UPDATE_CHANNEL_CAPACITY};

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chain this engine executes
    pub chain_id: ChainId,
    /// Owner recorded by the root contract at genesis
    pub chain_owner: AgentId,
    /// Chain description recorded at genesis
    pub description: String,
    /// Agent credited with validator fees
    pub validator: AgentId,
    /// Scheduler poll interval in milliseconds (default: 50ms)
    pub poll_interval_ms: u64,
    /// Maximum requests per batch
    pub max_batch_size: usize,
    /// Intake channel capacity
    pub intake_capacity: usize,
    /// Batch update broadcast capacity
    pub update_capacity: usize,
    /// Log every batch at info level
    pub verbose: bool,
}

impl EngineConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chain_id: ChainId(Address::from_seed("local-chain")),
            chain_owner: AgentId::Address(Address::from_seed("chain-owner")),
            description: "local chain".to_string(),
            validator: AgentId::Address(Address::from_seed("validator")),
            poll_interval_ms: POLL_INTERVAL_MS,
            max_batch_size: MAX_BATCH_SIZE,
            intake_capacity: INTAKE_CAPACITY,
            update_capacity: UPDATE_CHANNEL_CAPACITY,
            verbose: false,
        }
    }
}
