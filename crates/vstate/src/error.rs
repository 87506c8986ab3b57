//! Virtual state errors

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StateError {
    /// The block index is already applied or committed
    #[error("stale block {index}: block {last} is already committed")]
    StaleBlock { index: u32, last: u32 },

    #[error("block {index} out of order: expected {expected}")]
    BlockOutOfOrder { index: u32, expected: u32 },

    #[error("block {0} was not applied to this state")]
    BlockNotApplied(u32),

    /// Stored bytes that do not decode
    #[error("codec error: {0}")]
    Codec(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl StateError {
    pub fn is_stale(&self) -> bool {
        matches!(self, StateError::StaleBlock { .. })
    }
}

impl From<sled::Error> for StateError {
    fn from(e: sled::Error) -> Self {
        StateError::Storage(e.to_string())
    }
}

impl From<bincode::Error> for StateError {
    fn from(e: bincode::Error) -> Self {
        StateError::Codec(format!("bincode: {}", e))
    }
}

impl From<std::io::Error> for StateError {
    fn from(e: std::io::Error) -> Self {
        StateError::Codec(format!("borsh: {}", e))
    }
}

/// Check that `index` is the successor of the last committed block
pub(crate) fn check_next(last: Option<u32>, index: u32) -> Result<(), StateError> {
    match last {
        Some(last) if index <= last => Err(StateError::StaleBlock { index, last }),
        Some(last) if index != last + 1 => Err(StateError::BlockOutOfOrder {
            index,
            expected: last + 1,
        }),
        None if index != 0 => Err(StateError::BlockOutOfOrder { index, expected: 0 }),
        _ => Ok(()),
    }
}
