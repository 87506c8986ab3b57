//! Runtime Errors

use chain_types::{ContractError, RequestId};
use thiserror::Error;
use vstate::StateError;

/// Errors surfaced by the engine and its loops
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("duplicate request {0}")]
    DuplicateRequest(RequestId),

    #[error("request intake is closed")]
    IntakeClosed,

    #[error("state error: {0}")]
    State(#[from] StateError),

    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("genesis failed: {0}")]
    Genesis(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
