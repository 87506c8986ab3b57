//! Content hashing (blake3)

use crate::codec::CodecError;
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Hash size in bytes
pub const HASH_SIZE: usize = 32;

/// 32-byte content hash
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize,
    Serialize, Deserialize,
)]
pub struct HashValue(pub [u8; HASH_SIZE]);

impl HashValue {
    /// All-zero hash, used as the parent of the origin block
    pub const NIL: HashValue = HashValue([0u8; HASH_SIZE]);

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; HASH_SIZE] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: HASH_SIZE,
            actual: bytes.len(),
        })?;
        Ok(Self(arr))
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HashValue({})", self.to_base58())
    }
}

impl FromStr for HashValue {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CodecError::Invalid(format!("base58: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Hash a sequence of byte chunks as one stream
pub fn hash_data(chunks: &[&[u8]]) -> HashValue {
    let mut hasher = blake3::Hasher::new();
    for chunk in chunks {
        hasher.update(chunk);
    }
    HashValue(*hasher.finalize().as_bytes())
}

/// Hash the concatenation of strings
pub fn hash_strings(strs: &[&str]) -> HashValue {
    let chunks: Vec<&[u8]> = strs.iter().map(|s| s.as_bytes()).collect();
    hash_data(&chunks)
}
