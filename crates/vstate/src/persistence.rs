//! Persistence Layer for the virtual state
//!
//! Uses sled embedded database. Each block commit is one sled
//! transaction over the `blocks`, `state` and `meta` trees, so a crash
//! never leaves a partially written block behind.

use crate::{
    block::Block,
    db::StateDb,
    error::{check_next, StateError},
};
use chain_types::{hashing::HashValue, Mutation};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sled::{
    transaction::{ConflictableTransactionResult, Transactional},
    Db,
};
use std::{collections::BTreeMap, path::Path};

const META_KEY: &[u8] = b"chain";

/// Metadata about the last committed block
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct ChainMetadata {
    /// Last committed block index
    pub block_index: u32,
    /// State hash after that block
    pub state_hash: [u8; 32],
    /// Number of mutations in that block
    pub mutation_count: u64,
}

/// Persistent storage for the virtual state
pub struct SledDb {
    /// Sled database instance
    db: Db,
    /// Committed blocks by big-endian index
    blocks: sled::Tree,
    /// Current key/value state
    state: sled::Tree,
    /// Metadata tree
    meta: sled::Tree,
    /// Serializes stale check and write
    commit_lock: Mutex<()>,
}

impl SledDb {
    /// Open or create a persistent store at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let db = sled::open(&path)?;
        let blocks = db.open_tree("blocks")?;
        let state = db.open_tree("state")?;
        let meta = db.open_tree("meta")?;

        tracing::info!("Opened state database at {:?}", path.as_ref());

        Ok(Self {
            db,
            blocks,
            state,
            meta,
            commit_lock: Mutex::new(()),
        })
    }

    /// Load chain metadata
    pub fn load_metadata(&self) -> Result<Option<ChainMetadata>, StateError> {
        match self.meta.get(META_KEY)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Flush all pending writes to disk
    pub fn flush(&self) -> Result<(), StateError> {
        self.db.flush()?;
        Ok(())
    }

    /// Number of keys in the current state
    pub fn key_count(&self) -> usize {
        self.state.len()
    }
}

impl StateDb for SledDb {
    fn latest(&self) -> Result<Option<(u32, HashValue)>, StateError> {
        Ok(self
            .load_metadata()?
            .map(|m| (m.block_index, HashValue(m.state_hash))))
    }

    fn commit_block(&self, block: &Block, state_hash: &HashValue) -> Result<(), StateError> {
        let _guard = self.commit_lock.lock();
        check_next(self.latest()?.map(|(i, _)| i), block.index)?;

        let block_bytes = block.to_bytes()?;
        let meta_bytes = bincode::serialize(&ChainMetadata {
            block_index: block.index,
            state_hash: state_hash.0,
            mutation_count: block.mutations.len() as u64,
        })?;
        let index_key = block.index.to_be_bytes();

        (&self.blocks, &self.state, &self.meta)
            .transaction(|(blocks, state, meta)| -> ConflictableTransactionResult<(), ()> {
                blocks.insert(&index_key[..], block_bytes.as_slice())?;
                for m in &block.mutations {
                    match m {
                        Mutation::Set { key, value } => {
                            state.insert(key.as_slice(), value.as_slice())?;
                        }
                        Mutation::Del { key } => {
                            state.remove(key.as_slice())?;
                        }
                    }
                }
                meta.insert(META_KEY, meta_bytes.as_slice())?;
                Ok(())
            })
            .map_err(|e| StateError::Storage(format!("commit of block {}: {:?}", block.index, e)))?;

        self.flush()?;
        tracing::debug!("Persisted block {} ({} mutations)", block.index, block.mutations.len());

        Ok(())
    }

    fn get_block(&self, index: u32) -> Result<Option<Block>, StateError> {
        match self.blocks.get(index.to_be_bytes())? {
            Some(bytes) => Ok(Some(Block::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn load_state(&self) -> Result<BTreeMap<Vec<u8>, Vec<u8>>, StateError> {
        let mut out = BTreeMap::new();
        for result in self.state.iter() {
            let (key, value) = result?;
            out.insert(key.to_vec(), value.to_vec());
        }
        Ok(out)
    }
}
