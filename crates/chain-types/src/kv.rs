//! Key/value access, mutation sets and per-contract state partitions

use crate::{
    agent::AgentId,
    balance::Color,
    codec::{self, CodecError},
    hashing::HashValue,
    hname::{Hname, HNAME_LENGTH},
};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Read access to a key/value state
pub trait KvRead {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>>;

    fn has(&self, key: &[u8]) -> bool {
        self.get(key).is_some()
    }
}

/// Write access to a key/value state
pub trait KvStore: KvRead {
    fn set(&mut self, key: &[u8], value: Vec<u8>);
    fn del(&mut self, key: &[u8]);
}

/// A single state write
#[derive(Debug, Clone, PartialEq, Eq, BorshSerialize, BorshDeserialize, Serialize, Deserialize)]
pub enum Mutation {
    Set { key: Vec<u8>, value: Vec<u8> },
    Del { key: Vec<u8> },
}

impl Mutation {
    pub fn key(&self) -> &[u8] {
        match self {
            Mutation::Set { key, .. } | Mutation::Del { key } => key,
        }
    }
}

/// Ordered list of writes with an index of the latest write per key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationSet {
    ops: Vec<Mutation>,
    latest: HashMap<Vec<u8>, usize>,
}

impl MutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ops(ops: Vec<Mutation>) -> Self {
        let mut set = Self::new();
        for op in ops {
            set.push(op);
        }
        set
    }

    pub fn push(&mut self, op: Mutation) {
        self.latest.insert(op.key().to_vec(), self.ops.len());
        self.ops.push(op);
    }

    pub fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.push(Mutation::Set {
            key: key.to_vec(),
            value,
        });
    }

    pub fn del(&mut self, key: &[u8]) {
        self.push(Mutation::Del { key: key.to_vec() });
    }

    /// `Some(None)` means the key was deleted in this set
    pub fn lookup(&self, key: &[u8]) -> Option<Option<&[u8]>> {
        self.latest.get(key).map(|&i| match &self.ops[i] {
            Mutation::Set { value, .. } => Some(value.as_slice()),
            Mutation::Del { .. } => None,
        })
    }

    /// Append all writes of `other` after ours
    pub fn append(&mut self, other: MutationSet) {
        for op in other.ops {
            self.push(op);
        }
    }

    pub fn ops(&self) -> &[Mutation] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<Mutation> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Write buffer over a read-only base.
///
/// Reads see buffered writes first. Nothing reaches the base; the
/// collected mutations are handed back with `into_mutations`.
#[derive(Clone)]
pub struct BufferedKv<'a> {
    base: &'a dyn KvRead,
    muts: MutationSet,
}

impl<'a> BufferedKv<'a> {
    pub fn new(base: &'a dyn KvRead) -> Self {
        Self {
            base,
            muts: MutationSet::new(),
        }
    }

    pub fn with_mutations(base: &'a dyn KvRead, muts: MutationSet) -> Self {
        Self { base, muts }
    }

    pub fn mutations(&self) -> &MutationSet {
        &self.muts
    }

    pub fn into_mutations(self) -> MutationSet {
        self.muts
    }

    pub fn append(&mut self, muts: MutationSet) {
        self.muts.append(muts);
    }
}

impl KvRead for BufferedKv<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        match self.muts.lookup(key) {
            Some(v) => v.map(|v| v.to_vec()),
            None => self.base.get(key),
        }
    }
}

impl KvStore for BufferedKv<'_> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.muts.set(key, value);
    }

    fn del(&mut self, key: &[u8]) {
        self.muts.del(key);
    }
}

/// Full state key of a contract-local key
pub fn prefixed_key(contract: Hname, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HNAME_LENGTH + key.len());
    out.extend_from_slice(&contract.to_bytes());
    out.extend_from_slice(key);
    out
}

/// Mutable view of one contract's partition of the state
pub struct ContractState<'a> {
    kv: &'a mut dyn KvStore,
    contract: Hname,
}

impl<'a> ContractState<'a> {
    pub fn new(kv: &'a mut dyn KvStore, contract: Hname) -> Self {
        Self { kv, contract }
    }
}

impl KvRead for ContractState<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(&prefixed_key(self.contract, key))
    }
}

impl KvStore for ContractState<'_> {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.kv.set(&prefixed_key(self.contract, key), value);
    }

    fn del(&mut self, key: &[u8]) {
        self.kv.del(&prefixed_key(self.contract, key));
    }
}

/// Read-only view of one contract's partition of the state
pub struct ContractStateView<'a> {
    kv: &'a dyn KvRead,
    contract: Hname,
}

impl<'a> ContractStateView<'a> {
    pub fn new(kv: &'a dyn KvRead, contract: Hname) -> Self {
        Self { kv, contract }
    }
}

impl KvRead for ContractStateView<'_> {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.kv.get(&prefixed_key(self.contract, key))
    }
}

// Named maps stored inside a partition: elements under `name.elem`,
// element count under `name#`.

/// Local key of a map element
pub fn map_elem_key(name: &[u8], elem: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(name.len() + 1 + elem.len());
    key.extend_from_slice(name);
    key.push(b'.');
    key.extend_from_slice(elem);
    key
}

fn map_len_key(name: &[u8]) -> Vec<u8> {
    let mut key = name.to_vec();
    key.push(b'#');
    key
}

pub fn map_get(kv: &dyn KvRead, name: &[u8], elem: &[u8]) -> Option<Vec<u8>> {
    kv.get(&map_elem_key(name, elem))
}

fn decode_len(stored: Option<Vec<u8>>) -> Result<u32, CodecError> {
    match stored {
        Some(bytes) => {
            let mut r = codec::Reader::new(&bytes);
            let n = r.read_u32()?;
            r.finish()?;
            Ok(n)
        }
        None => Ok(0),
    }
}

pub fn map_len(kv: &dyn KvRead, name: &[u8]) -> Result<u32, CodecError> {
    decode_len(kv.get(&map_len_key(name)))
}

/// Insert or overwrite an element; the count grows only for new elements
pub fn map_set(kv: &mut dyn KvStore, name: &[u8], elem: &[u8], value: Vec<u8>) -> Result<(), CodecError> {
    let key = map_elem_key(name, elem);
    if !kv.has(&key) {
        let n = decode_len(kv.get(&map_len_key(name)))?;
        let mut buf = Vec::with_capacity(4);
        codec::write_u32(&mut buf, n + 1);
        kv.set(&map_len_key(name), buf);
    }
    kv.set(&key, value);
    Ok(())
}

/// String-keyed dictionary: call arguments and call results
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, BorshSerialize, BorshDeserialize)]
pub struct Dict(BTreeMap<String, Vec<u8>>);

impl Dict {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: &str, value: Vec<u8>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: &str, value: Vec<u8>) {
        self.0.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.0.get(key).map(|v| v.as_slice())
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<u8>> {
        self.0.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<u8>)> {
        self.0.iter()
    }

    // Typed getters: `Ok(None)` when absent, error when present but malformed.

    pub fn get_i64(&self, key: &str) -> Result<Option<i64>, CodecError> {
        self.get(key).map(codec::decode_i64).transpose()
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, CodecError> {
        self.get(key).map(codec::decode_string).transpose()
    }

    pub fn get_hname(&self, key: &str) -> Result<Option<Hname>, CodecError> {
        self.get(key).map(Hname::from_bytes).transpose()
    }

    pub fn get_hash(&self, key: &str) -> Result<Option<HashValue>, CodecError> {
        self.get(key).map(HashValue::from_bytes).transpose()
    }

    pub fn get_agent_id(&self, key: &str) -> Result<Option<AgentId>, CodecError> {
        self.get(key).map(AgentId::from_bytes).transpose()
    }

    pub fn get_color(&self, key: &str) -> Result<Option<Color>, CodecError> {
        self.get(key).map(Color::from_bytes).transpose()
    }
}

impl FromIterator<(String, Vec<u8>)> for Dict {
    fn from_iter<I: IntoIterator<Item = (String, Vec<u8>)>>(iter: I) -> Self {
        Dict(iter.into_iter().collect())
    }
}
