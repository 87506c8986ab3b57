//! Virtual State - versioned key/value state of a chain
//!
//! - Blocks: ordered mutation lists with strictly increasing indices
//! - Hash chaining: each state hash derives from the previous one and the block
//! - Speculative application on an in-memory copy, then durable commit
//! - Backends: in-memory (`MemoryDb`) and sled (`SledDb`)

pub mod block;
pub mod db;
pub mod error;
pub mod persistence;
pub mod state;

pub use block::Block;
pub use db::{MemoryDb, StateDb};
pub use error::StateError;
pub use persistence::SledDb;
pub use state::VirtualState;

/// Chain-level state variable holding the chain id (null partition)
pub const VAR_CHAIN_ID: &[u8] = b"chainid";
