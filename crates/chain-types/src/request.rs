//! Requests to contracts

use crate::{agent::AgentId, balance::ColoredBalances, hashing::HashValue, hname::Hname, kv::Dict};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a request: ledger transaction id plus index inside it.
/// Never reused.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, BorshSerialize, BorshDeserialize,
    Serialize, Deserialize,
)]
pub struct RequestId {
    pub tx_id: HashValue,
    pub index: u16,
}

impl RequestId {
    pub fn new(tx_id: HashValue, index: u16) -> Self {
        Self { tx_id, index }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.tx_id, self.index)
    }
}

/// A call to a contract entry point, with attached tokens
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub sender: AgentId,
    pub target: Hname,
    pub entry_point: Hname,
    #[serde(default)]
    pub args: Dict,
    #[serde(default)]
    pub transfer: ColoredBalances,
    /// Unix seconds before which the request must not run
    #[serde(default)]
    pub time_lock: Option<u32>,
}

impl Request {
    pub fn new(id: RequestId, sender: AgentId, target: Hname, entry_point: Hname) -> Self {
        Self {
            id,
            sender,
            target,
            entry_point,
            args: Dict::new(),
            transfer: ColoredBalances::new(),
            time_lock: None,
        }
    }

    pub fn with_args(mut self, args: Dict) -> Self {
        self.args = args;
        self
    }

    pub fn with_transfer(mut self, transfer: ColoredBalances) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_time_lock(mut self, unix_secs: u32) -> Self {
        self.time_lock = Some(unix_secs);
        self
    }

    /// Whether the time lock (if any) has expired at `now` (unix seconds)
    pub fn is_ready(&self, now: i64) -> bool {
        match self.time_lock {
            Some(t) => i64::from(t) <= now,
            None => true,
        }
    }
}
