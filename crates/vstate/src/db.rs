//! State database trait and in-memory backend

use crate::{
    block::Block,
    error::{check_next, StateError},
};
use chain_types::{hashing::HashValue, Mutation};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeMap;

/// Durable storage for committed blocks and the resulting state
pub trait StateDb: Send + Sync {
    /// Index and state hash of the last committed block
    fn latest(&self) -> Result<Option<(u32, HashValue)>, StateError>;

    /// Atomically store a block, its mutations and the resulting hash.
    /// Rejects indices that are not the direct successor of `latest`.
    fn commit_block(&self, block: &Block, state_hash: &HashValue) -> Result<(), StateError>;

    fn get_block(&self, index: u32) -> Result<Option<Block>, StateError>;

    /// Full key/value state as of the last commit
    fn load_state(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StateError>;
}

/// In-memory database
///
/// Uses DashMap for concurrent reads; commits are serialized by the
/// `latest` lock so the stale check and the write cannot interleave.
#[derive(Default)]
pub struct MemoryDb {
    blocks: DashMap<u32, Block>,
    state: DashMap<Vec<u8>, Vec<u8>>,
    latest: Mutex<Option<(u32, HashValue)>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }
}

impl StateDb for MemoryDb {
    fn latest(&self) -> Result<Option<(u32, HashValue)>, StateError> {
        Ok(*self.latest.lock())
    }

    fn commit_block(&self, block: &Block, state_hash: &HashValue) -> Result<(), StateError> {
        let mut latest = self.latest.lock();
        check_next(latest.map(|(i, _)| i), block.index)?;

        for m in &block.mutations {
            match m {
                Mutation::Set { key, value } => {
                    self.state.insert(key.clone(), value.clone());
                }
                Mutation::Del { key } => {
                    self.state.remove(key);
                }
            }
        }
        self.blocks.insert(block.index, block.clone());
        *latest = Some((block.index, *state_hash));

        Ok(())
    }

    fn get_block(&self, index: u32) -> Result<Option<Block>, StateError> {
        Ok(self.blocks.get(&index).map(|r| r.value().clone()))
    }

    fn load_state(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StateError> {
        Ok(self
            .state
            .iter()
            .map(|r| (r.key().clone(), r.value().clone()))
            .collect())
    }
}
