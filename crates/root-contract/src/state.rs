//! Root Contract State
//!
//! Record types kept in the root partition.

use chain_types::{
    agent::{Address, AGENT_ID_LENGTH},
    codec::{self, CodecError, Reader},
    hashing::HashValue,
    AgentId, ChainId, Color, Dict, Hname,
};
use serde::{Deserialize, Serialize};

use crate::constants::*;

/// Registry entry of one deployed contract
///
/// Byte layout (little-endian):
/// program hash (32) | u16 len + description | u16 len + name |
/// owner fee (i64) | validator fee (i64) | creator agent id (37)
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractRecord {
    /// Program executed by this contract
    pub program_hash: HashValue,
    pub description: String,
    /// Unique within the chain; the contract's hname is derived from it
    pub name: String,
    /// Owner fee override, 0 = chain default
    pub owner_fee: i64,
    /// Validator fee override, 0 = chain default
    pub validator_fee: i64,
    /// Agent that deployed the contract
    pub creator: AgentId,
}

impl ContractRecord {
    /// Fixed part of the encoding
    pub const MIN_LEN: usize = 32 + 2 + 2 + 8 + 8 + AGENT_ID_LENGTH;

    pub fn new(program_hash: HashValue, name: &str, description: &str, creator: AgentId) -> Self {
        Self {
            program_hash,
            description: description.to_string(),
            name: name.to_string(),
            owner_fee: 0,
            validator_fee: 0,
            creator,
        }
    }

    pub fn hname(&self) -> Hname {
        Hname::of(&self.name)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut buf =
            Vec::with_capacity(Self::MIN_LEN + self.description.len() + self.name.len());
        buf.extend_from_slice(self.program_hash.as_bytes());
        codec::write_string16(&mut buf, &self.description)?;
        codec::write_string16(&mut buf, &self.name)?;
        codec::write_i64(&mut buf, self.owner_fee);
        codec::write_i64(&mut buf, self.validator_fee);
        buf.extend_from_slice(&self.creator.to_bytes());
        Ok(buf)
    }

    /// Decode a record; truncated input and trailing bytes are rejected
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut r = Reader::new(bytes);
        let program_hash = HashValue(r.read_array::<32>()?);
        let description = r.read_string16()?;
        let name = r.read_string16()?;
        let owner_fee = r.read_i64()?;
        let validator_fee = r.read_i64()?;
        let creator = AgentId::read(&mut r)?;
        r.finish()?;

        Ok(Self {
            program_hash,
            description,
            name,
            owner_fee,
            validator_fee,
            creator,
        })
    }
}

/// Chain-level configuration owned by the root contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainInfo {
    pub chain_id: ChainId,
    pub owner: AgentId,
    /// Set by delegation until the delegate claims ownership
    pub delegated_owner: Option<AgentId>,
    pub description: String,
    pub fee_color: Color,
    pub default_owner_fee: i64,
    pub default_validator_fee: i64,
    /// Number of registered contracts
    pub contract_count: u32,
}

impl ChainInfo {
    /// Result dictionary of `getChainInfo`
    pub fn to_dict(&self) -> Dict {
        let mut d = Dict::new()
            .with(PARAM_CHAIN_ID, self.chain_id.0.as_bytes().to_vec())
            .with(PARAM_CHAIN_OWNER, self.owner.to_bytes().to_vec())
            .with(PARAM_DESCRIPTION, codec::encode_string(&self.description))
            .with(PARAM_FEE_COLOR, self.fee_color.0.to_vec())
            .with(PARAM_OWNER_FEE, codec::encode_i64(self.default_owner_fee))
            .with(PARAM_VALIDATOR_FEE, codec::encode_i64(self.default_validator_fee))
            .with(PARAM_CONTRACT_COUNT, codec::encode_i64(i64::from(self.contract_count)));
        if let Some(delegated) = &self.delegated_owner {
            d.set(PARAM_DELEGATED_OWNER, delegated.to_bytes().to_vec());
        }
        d
    }

    pub fn from_dict(d: &Dict) -> Result<Self, CodecError> {
        fn required<T>(v: Result<Option<T>, CodecError>, name: &str) -> Result<T, CodecError> {
            v?.ok_or_else(|| CodecError::Invalid(format!("missing '{}'", name)))
        }

        let chain_id = d
            .get(PARAM_CHAIN_ID)
            .map(Address::from_bytes)
            .transpose()?
            .ok_or_else(|| CodecError::Invalid(format!("missing '{}'", PARAM_CHAIN_ID)))?;
        let count = required(d.get_i64(PARAM_CONTRACT_COUNT), PARAM_CONTRACT_COUNT)?;

        Ok(Self {
            chain_id: ChainId(chain_id),
            owner: required(d.get_agent_id(PARAM_CHAIN_OWNER), PARAM_CHAIN_OWNER)?,
            delegated_owner: d.get_agent_id(PARAM_DELEGATED_OWNER)?,
            description: d.get_string(PARAM_DESCRIPTION)?.unwrap_or_default(),
            fee_color: required(d.get_color(PARAM_FEE_COLOR), PARAM_FEE_COLOR)?,
            default_owner_fee: required(d.get_i64(PARAM_OWNER_FEE), PARAM_OWNER_FEE)?,
            default_validator_fee: required(d.get_i64(PARAM_VALIDATOR_FEE), PARAM_VALIDATOR_FEE)?,
            contract_count: u32::try_from(count)
                .map_err(|_| CodecError::Invalid(format!("contract count {}", count)))?,
        })
    }
}
