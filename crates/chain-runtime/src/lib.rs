//! Chain Runtime - deterministic batch execution engine
//!
//! This crate drives the chain state forward:
//! - Request intake from many producers into an ordered backlog
//! - Time-gated batch scheduling on a fixed poll interval
//! - Single-writer batch execution: dispatch, build block, commit
//! - Contract dispatch with fee accounting via the builtin accounts contract

pub mod accounts;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod executor;
pub mod intake;
pub mod processors;
pub mod sandbox;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use dispatcher::{Dispatcher, RequestOutcome, RequestResult};
pub use engine::Engine;
pub use error::RuntimeError;
pub use executor::{BatchExecutor, BatchState, BatchUpdate};
pub use intake::{Backlog, RequestIntake};
pub use processors::ProcessorRegistry;
pub use scheduler::BatchScheduler;

/// Scheduler poll interval in milliseconds
pub const POLL_INTERVAL_MS: u64 = 50;

/// Maximum requests per batch
pub const MAX_BATCH_SIZE: usize = 64;

/// Capacity of the intake channel
pub const INTAKE_CAPACITY: usize = 1024;

/// Capacity of the batch update broadcast channel
pub const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Maximum nesting of contract-to-contract calls
pub const MAX_CALL_DEPTH: u32 = 16;

#[cfg(test)]
mod tests;
