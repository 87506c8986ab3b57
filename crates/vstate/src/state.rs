//! In-memory virtual state with speculative block application

use crate::{
    block::Block,
    db::StateDb,
    error::{check_next, StateError},
};
use chain_types::{
    hashing::{hash_data, HashValue},
    KvRead, Mutation,
};
use std::collections::BTreeMap;

/// Full key/value state at some block index.
///
/// `apply_block` only touches this in-memory copy; `commit` makes an
/// applied block durable. A working copy that fails to commit is simply
/// dropped.
#[derive(Clone, Debug, Default)]
pub struct VirtualState {
    kv: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Last applied block
    block_index: Option<u32>,
    /// Last block written to the database
    committed_index: Option<u32>,
    state_hash: HashValue,
}

impl VirtualState {
    /// Empty state before the origin block
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the last committed state from a database
    pub fn load(db: &dyn StateDb) -> Result<Option<Self>, StateError> {
        let Some((index, state_hash)) = db.latest()? else {
            return Ok(None);
        };
        let kv = db.load_state()?;
        tracing::info!("Loaded virtual state at block {} ({} keys)", index, kv.len());

        Ok(Some(Self {
            kv,
            block_index: Some(index),
            committed_index: Some(index),
            state_hash,
        }))
    }

    pub fn block_index(&self) -> Option<u32> {
        self.block_index
    }

    pub fn next_block_index(&self) -> u32 {
        self.block_index.map_or(0, |i| i + 1)
    }

    pub fn committed_index(&self) -> Option<u32> {
        self.committed_index
    }

    pub fn state_hash(&self) -> HashValue {
        self.state_hash
    }

    pub fn len(&self) -> usize {
        self.kv.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kv.is_empty()
    }

    /// Apply a block to this copy and return the new state hash.
    ///
    /// The new hash depends only on the previous hash and the block.
    pub fn apply_block(&mut self, block: &Block) -> Result<HashValue, StateError> {
        check_next(self.block_index, block.index)?;

        for m in &block.mutations {
            match m {
                Mutation::Set { key, value } => {
                    self.kv.insert(key.clone(), value.clone());
                }
                Mutation::Del { key } => {
                    self.kv.remove(key);
                }
            }
        }

        self.state_hash = hash_data(&[self.state_hash.as_bytes(), block.essence_hash().as_bytes()]);
        self.block_index = Some(block.index);

        tracing::trace!(
            "Applied block {} ({} mutations) -> {}",
            block.index,
            block.mutations.len(),
            self.state_hash
        );

        Ok(self.state_hash)
    }

    /// Durably write an applied block. Committing an index twice fails
    /// with `StaleBlock`.
    pub fn commit(&mut self, db: &dyn StateDb, block: &Block) -> Result<(), StateError> {
        if self.block_index != Some(block.index) {
            return Err(StateError::BlockNotApplied(block.index));
        }
        check_next(self.committed_index, block.index)?;

        db.commit_block(block, &self.state_hash)?;
        self.committed_index = Some(block.index);

        Ok(())
    }
}

impl KvRead for VirtualState {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(key).cloned()
    }
}
