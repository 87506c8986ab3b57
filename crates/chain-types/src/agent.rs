//! Actor identities: ledger addresses, chains and contracts

use crate::{
    codec::{CodecError, Reader},
    hashing::hash_strings,
    hname::{Hname, HNAME_LENGTH},
};
use borsh::{BorshDeserialize, BorshSerialize};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Size of a ledger address (1 version byte + 32 byte digest)
pub const ADDRESS_LENGTH: usize = 33;

/// Size of an encoded agent id
pub const AGENT_ID_LENGTH: usize = ADDRESS_LENGTH + HNAME_LENGTH;

/// Opaque ledger address. The core never interprets its bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct Address(pub [u8; ADDRESS_LENGTH]);

impl Address {
    /// Deterministic address for a seed phrase (test chains, local nodes)
    pub fn from_seed(seed: &str) -> Self {
        let digest = hash_strings(&[seed]);
        let mut bytes = [0u8; ADDRESS_LENGTH];
        bytes[1..].copy_from_slice(digest.as_bytes());
        Address(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let arr: [u8; ADDRESS_LENGTH] = bytes.try_into().map_err(|_| CodecError::InvalidLength {
            expected: ADDRESS_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Address(arr))
    }

    pub fn as_bytes(&self) -> &[u8; ADDRESS_LENGTH] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&bs58::encode(self.0).into_string())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = bs58::decode(s)
            .into_vec()
            .map_err(|e| CodecError::Invalid(format!("base58: {}", e)))?;
        Self::from_bytes(&bytes)
    }
}

/// Chain identifier: the ledger address controlled by the chain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, BorshSerialize, BorshDeserialize)]
pub struct ChainId(pub Address);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl fmt::Debug for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainId({})", self.0)
    }
}

impl FromStr for ChainId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(ChainId)
    }
}

/// A contract instance on a specific chain
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub struct ContractId {
    pub chain_id: ChainId,
    pub hname: Hname,
}

impl ContractId {
    pub fn new(chain_id: ChainId, hname: Hname) -> Self {
        Self { chain_id, hname }
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.chain_id, self.hname)
    }
}

/// Uniform actor identity used for callers, owners and balances.
///
/// Encoded as 37 bytes: address or chain id, then the hname. A zero
/// hname marks an address-owned agent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
pub enum AgentId {
    Address(Address),
    Contract(ContractId),
}

impl AgentId {
    pub fn to_bytes(&self) -> [u8; AGENT_ID_LENGTH] {
        let mut out = [0u8; AGENT_ID_LENGTH];
        match self {
            AgentId::Address(addr) => {
                out[..ADDRESS_LENGTH].copy_from_slice(addr.as_bytes());
            }
            AgentId::Contract(cid) => {
                out[..ADDRESS_LENGTH].copy_from_slice(cid.chain_id.0.as_bytes());
                out[ADDRESS_LENGTH..].copy_from_slice(&cid.hname.to_bytes());
            }
        }
        out
    }

    pub fn read(r: &mut Reader<'_>) -> Result<Self, CodecError> {
        let addr = Address(r.read_array::<ADDRESS_LENGTH>()?);
        let hname = Hname::from_bytes(r.read_bytes(HNAME_LENGTH)?)?;
        if hname.is_null() {
            Ok(AgentId::Address(addr))
        } else {
            Ok(AgentId::Contract(ContractId::new(ChainId(addr), hname)))
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != AGENT_ID_LENGTH {
            return Err(CodecError::InvalidLength {
                expected: AGENT_ID_LENGTH,
                actual: bytes.len(),
            });
        }
        Self::read(&mut Reader::new(bytes))
    }

    pub fn is_address(&self) -> bool {
        matches!(self, AgentId::Address(_))
    }
}

impl From<Address> for AgentId {
    fn from(addr: Address) -> Self {
        AgentId::Address(addr)
    }
}

impl From<ContractId> for AgentId {
    fn from(cid: ContractId) -> Self {
        AgentId::Contract(cid)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentId::Address(addr) => write!(f, "A/{}", addr),
            AgentId::Contract(cid) => write!(f, "C/{}", cid),
        }
    }
}

impl FromStr for AgentId {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(addr) = s.strip_prefix("A/") {
            return Ok(AgentId::Address(addr.parse()?));
        }
        if let Some(rest) = s.strip_prefix("C/") {
            let (chain, hname) = rest
                .split_once("::")
                .ok_or_else(|| CodecError::Invalid(format!("contract agent id '{}'", s)))?;
            return Ok(AgentId::Contract(ContractId::new(chain.parse()?, hname.parse()?)));
        }
        Err(CodecError::Invalid(format!("agent id '{}'", s)))
    }
}

// Text form in JSON (config files, RPC).
macro_rules! serde_as_str {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as Deserialize>::deserialize(deserializer)?;
                s.parse().map_err(de::Error::custom)
            }
        }
    };
}

serde_as_str!(Address);
serde_as_str!(ChainId);
serde_as_str!(AgentId);
