//! Typed access to the root partition
//!
//! Used by the root entry points and, read-only, by the dispatcher and
//! engine queries. Every function takes the root partition itself
//! (`ContractState` / `ContractStateView` over `root::hname()`).

use chain_types::{
    codec,
    kv::{map_get, map_len, map_set},
    Address, AgentId, ChainId, Color, ContractError, Dict, Hname, KvRead, KvStore,
};
use serde::{Deserialize, Serialize};

use crate::{
    constants::*,
    state::{ChainInfo, ContractRecord},
};

/// Fees charged for a request to one contract
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeInfo {
    pub color: Color,
    pub owner_fee: i64,
    pub validator_fee: i64,
}

impl FeeInfo {
    pub fn total(&self) -> i64 {
        self.owner_fee.saturating_add(self.validator_fee)
    }

    pub fn to_dict(&self) -> Dict {
        Dict::new()
            .with(PARAM_FEE_COLOR, self.color.0.to_vec())
            .with(PARAM_OWNER_FEE, codec::encode_i64(self.owner_fee))
            .with(PARAM_VALIDATOR_FEE, codec::encode_i64(self.validator_fee))
    }
}

pub fn is_initialized(state: &dyn KvRead) -> bool {
    state.has(VAR_STATE_INITIALIZED)
}

pub fn find_contract(state: &dyn KvRead, hname: Hname) -> Result<Option<ContractRecord>, ContractError> {
    match map_get(state, VAR_CONTRACT_REGISTRY, &hname.to_bytes()) {
        Some(bytes) => Ok(Some(ContractRecord::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Insert or replace a record under its hname
pub fn store_contract(state: &mut dyn KvStore, record: &ContractRecord) -> Result<(), ContractError> {
    let bytes = record.to_bytes()?;
    map_set(state, VAR_CONTRACT_REGISTRY, &record.hname().to_bytes(), bytes)?;
    Ok(())
}

pub fn contract_count(state: &dyn KvRead) -> Result<u32, ContractError> {
    Ok(map_len(state, VAR_CONTRACT_REGISTRY)?)
}

pub fn chain_owner(state: &dyn KvRead) -> Result<AgentId, ContractError> {
    let bytes = state.get(VAR_CHAIN_OWNER).ok_or(ContractError::NotInitialized)?;
    Ok(AgentId::from_bytes(&bytes)?)
}

pub fn delegated_owner(state: &dyn KvRead) -> Result<Option<AgentId>, ContractError> {
    match state.get(VAR_CHAIN_OWNER_DELEGATED) {
        Some(bytes) => Ok(Some(AgentId::from_bytes(&bytes)?)),
        None => Ok(None),
    }
}

/// Fails with `Unauthorized` unless `caller` is the current chain owner
pub fn ensure_owner(state: &dyn KvRead, caller: &AgentId) -> Result<(), ContractError> {
    if chain_owner(state)? != *caller {
        return Err(ContractError::Unauthorized);
    }
    Ok(())
}

fn read_i64(state: &dyn KvRead, key: &[u8]) -> Result<i64, ContractError> {
    match state.get(key) {
        Some(bytes) => Ok(codec::decode_i64(&bytes)?),
        None => Ok(0),
    }
}

fn fee_color(state: &dyn KvRead) -> Result<Color, ContractError> {
    match state.get(VAR_FEE_COLOR) {
        Some(bytes) => Ok(Color::from_bytes(&bytes)?),
        None => Ok(Color::BASE),
    }
}

pub fn get_chain_info(state: &dyn KvRead) -> Result<ChainInfo, ContractError> {
    if !is_initialized(state) {
        return Err(ContractError::NotInitialized);
    }
    let chain_id = state.get(VAR_CHAIN_ID).ok_or(ContractError::NotInitialized)?;
    let description = match state.get(VAR_DESCRIPTION) {
        Some(bytes) => codec::decode_string(&bytes)?,
        None => String::new(),
    };

    Ok(ChainInfo {
        chain_id: ChainId(Address::from_bytes(&chain_id)?),
        owner: chain_owner(state)?,
        delegated_owner: delegated_owner(state)?,
        description,
        fee_color: fee_color(state)?,
        default_owner_fee: read_i64(state, VAR_DEFAULT_OWNER_FEE)?,
        default_validator_fee: read_i64(state, VAR_DEFAULT_VALIDATOR_FEE)?,
        contract_count: contract_count(state)?,
    })
}

/// Effective fees of a contract: a zero override falls back to the
/// chain default, field by field.
pub fn get_fee_info(state: &dyn KvRead, hname: Hname) -> Result<FeeInfo, ContractError> {
    let record = find_contract(state, hname)?.ok_or(ContractError::ContractNotFound(hname))?;
    resolve_fees(state, &record)
}

pub fn resolve_fees(state: &dyn KvRead, record: &ContractRecord) -> Result<FeeInfo, ContractError> {
    let owner_fee = match record.owner_fee {
        0 => read_i64(state, VAR_DEFAULT_OWNER_FEE)?,
        fee => fee,
    };
    let validator_fee = match record.validator_fee {
        0 => read_i64(state, VAR_DEFAULT_VALIDATOR_FEE)?,
        fee => fee,
    };

    Ok(FeeInfo {
        color: fee_color(state)?,
        owner_fee,
        validator_fee,
    })
}
