//! Chain Types - shared vocabulary of the execution core
//!
//! Everything that crosses a crate boundary lives here:
//! - Hashes, contract identifiers (hnames), chain and agent ids
//! - Colored token balances and requests
//! - Key/value traits, mutation sets and contract state partitions
//! - The processor and sandbox interfaces contracts are written against

pub mod agent;
pub mod balance;
pub mod codec;
pub mod hashing;
pub mod hname;
pub mod kv;
pub mod request;
pub mod vm;

pub use agent::{Address, AgentId, ChainId, ContractId};
pub use balance::{Color, ColoredBalances};
pub use codec::CodecError;
pub use hashing::{hash_data, hash_strings, HashValue};
pub use hname::Hname;
pub use kv::{BufferedKv, ContractState, ContractStateView, Dict, KvRead, KvStore, Mutation, MutationSet};
pub use request::{Request, RequestId};
pub use vm::{
    ContractError, ContractFunction, ContractInterface, EntryPointKind, Handler, Processor,
    Sandbox, SandboxView,
};

/// Name of the entry point every contract runs once on deployment
pub const FUNC_INIT: &str = "init";
