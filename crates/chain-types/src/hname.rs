//! Hashed names: 4-byte identifiers for contracts and entry points

use crate::{codec::CodecError, hashing::hash_strings};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Encoded size of an hname
pub const HNAME_LENGTH: usize = 4;

/// Identifier derived from a name: first four bytes (LE) of its hash.
///
/// Zero is reserved for "no contract" (chain-level keys, address agents),
/// so a name that hashes to zero is mapped to one.
#[derive(
    Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, BorshSerialize, BorshDeserialize,
    Serialize, Deserialize,
)]
pub struct Hname(pub u32);

impl Hname {
    pub const NULL: Hname = Hname(0);

    /// Derive the hname of a contract or function name
    pub fn of(name: &str) -> Self {
        let hash = hash_strings(&[name]);
        let mut bytes = [0u8; HNAME_LENGTH];
        bytes.copy_from_slice(&hash.as_bytes()[..HNAME_LENGTH]);
        match u32::from_le_bytes(bytes) {
            0 => Hname(1),
            v => Hname(v),
        }
    }

    pub fn is_null(&self) -> bool {
        self.0 == 0
    }

    pub fn to_bytes(&self) -> [u8; HNAME_LENGTH] {
        self.0.to_le_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; HNAME_LENGTH] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: HNAME_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Hname(u32::from_le_bytes(arr)))
    }
}

impl fmt::Display for Hname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl fmt::Debug for Hname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hname({:08x})", self.0)
    }
}

impl FromStr for Hname {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u32::from_str_radix(s, 16)
            .map(Hname)
            .map_err(|e| CodecError::Invalid(format!("hname '{}': {}", s, e)))
    }
}
