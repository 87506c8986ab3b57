//! Blocks: one committed unit of state mutation

use crate::VAR_CHAIN_ID;
use borsh::{BorshDeserialize, BorshSerialize};
use chain_types::{hashing::HashValue, kv::prefixed_key, ChainId, Hname, Mutation, MutationSet};
use serde::{Deserialize, Serialize};

/// Ordered mutations applied at one block index
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub struct Block {
    /// Block index (0 = origin)
    pub index: u32,
    /// Mutations in application order
    pub mutations: Vec<Mutation>,
}

impl Block {
    pub fn new(index: u32, mutations: MutationSet) -> Self {
        Self {
            index,
            mutations: mutations.into_ops(),
        }
    }

    /// Origin block: records the chain id in the chain-level partition
    pub fn origin(chain_id: &ChainId) -> Self {
        Self {
            index: 0,
            mutations: vec![Mutation::Set {
                key: prefixed_key(Hname::NULL, VAR_CHAIN_ID),
                value: chain_id.0.as_bytes().to_vec(),
            }],
        }
    }

    /// Hash of the block contents: index, then every mutation in order
    pub fn essence_hash(&self) -> HashValue {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.index.to_le_bytes());
        hasher.update(&(self.mutations.len() as u32).to_le_bytes());

        for m in &self.mutations {
            match m {
                Mutation::Set { key, value } => {
                    hasher.update(&[1u8]);
                    hasher.update(&(key.len() as u32).to_le_bytes());
                    hasher.update(key);
                    hasher.update(&(value.len() as u32).to_le_bytes());
                    hasher.update(value);
                }
                Mutation::Del { key } => {
                    hasher.update(&[0u8]);
                    hasher.update(&(key.len() as u32).to_le_bytes());
                    hasher.update(key);
                }
            }
        }

        HashValue(*hasher.finalize().as_bytes())
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    /// Borsh encoding, as stored and replayed
    pub fn to_bytes(&self) -> std::io::Result<Vec<u8>> {
        borsh::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> std::io::Result<Self> {
        Self::try_from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::Address;

    #[test]
    fn test_essence_depends_on_order_and_index() {
        let mut a = MutationSet::new();
        a.set(b"x", vec![1]);
        a.set(b"y", vec![2]);
        let mut b = MutationSet::new();
        b.set(b"y", vec![2]);
        b.set(b"x", vec![1]);

        let block_a = Block::new(1, a.clone());
        assert_eq!(block_a.essence_hash(), Block::new(1, a.clone()).essence_hash());
        assert_ne!(block_a.essence_hash(), Block::new(1, b).essence_hash());
        assert_ne!(block_a.essence_hash(), Block::new(2, a).essence_hash());
    }

    #[test]
    fn test_set_and_delete_hash_differently() {
        let mut set = MutationSet::new();
        set.set(b"k", vec![]);
        let mut del = MutationSet::new();
        del.del(b"k");
        assert_ne!(Block::new(1, set).essence_hash(), Block::new(1, del).essence_hash());
    }

    #[test]
    fn test_origin_block() {
        let chain_id = ChainId(Address::from_seed("chain"));
        let origin = Block::origin(&chain_id);
        assert_eq!(origin.index, 0);
        assert_eq!(origin.mutations.len(), 1);
        assert_eq!(origin, Block::origin(&chain_id));
    }

    #[test]
    fn test_bytes_reject_truncation() {
        let mut muts = MutationSet::new();
        muts.set(b"k", vec![7; 10]);
        muts.del(b"gone");
        let block = Block::new(3, muts);

        let bytes = block.to_bytes().unwrap();
        assert_eq!(Block::from_bytes(&bytes).unwrap(), block);
        assert!(Block::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }
}
