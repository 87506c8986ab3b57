//! Root Contract Processor
//!
//! Entry points of the root contract. Every function checks caller and
//! params before its first state write, so a rejected call leaves
//! nothing behind.

use chain_types::{
    codec,
    vm::{optional, require},
    ColoredBalances, ContractError, Dict, Hname, KvStore, Sandbox, SandboxView, FUNC_INIT,
};

use crate::{
    constants::*,
    registry,
    state::ContractRecord,
};

/// Genesis: records chain info with the caller as owner and registers
/// the root contract itself
pub fn initialize(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let params = ctx.params().clone();
    let caller = ctx.caller();
    let chain_id = ctx.chain_id();
    let root_hname = ctx.contract();

    if registry::is_initialized(&ctx.state()) {
        return Err(ContractError::AlreadyInitialized);
    }
    if let Some(id) = params.get(PARAM_CHAIN_ID) {
        if id != chain_id.0.as_bytes() {
            return Err(ContractError::invalid_param(PARAM_CHAIN_ID, "does not match the chain"));
        }
    }
    let description = optional(params.get_string(PARAM_DESCRIPTION), PARAM_DESCRIPTION)?.unwrap_or_default();
    let fee_color = optional(params.get_color(PARAM_FEE_COLOR), PARAM_FEE_COLOR)?;

    let root = crate::interface();
    let record = ContractRecord::new(root.program_hash, &root.name, &root.description, caller);
    if record.hname() != root_hname {
        return Err(ContractError::Failed(format!(
            "root contract must run at {}, not {}",
            record.hname(),
            root_hname
        )));
    }

    let mut state = ctx.state();
    state.set(VAR_CHAIN_ID, chain_id.0.as_bytes().to_vec());
    state.set(VAR_CHAIN_OWNER, caller.to_bytes().to_vec());
    state.set(VAR_DESCRIPTION, codec::encode_string(&description));
    if let Some(color) = fee_color {
        state.set(VAR_FEE_COLOR, color.0.to_vec());
    }
    state.set(VAR_DEFAULT_OWNER_FEE, codec::encode_i64(0));
    state.set(VAR_DEFAULT_VALIDATOR_FEE, codec::encode_i64(0));
    registry::store_contract(&mut state, &record)?;
    state.set(VAR_STATE_INITIALIZED, vec![1]);

    tracing::info!("Root initialized: chain {} owner {}", chain_id, caller);
    Ok(Dict::new())
}

/// Register a new contract and run its `init` with the remaining params
pub fn deploy_contract(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let params = ctx.params().clone();
    let caller = ctx.caller();

    let program_hash = require(params.get_hash(PARAM_PROGRAM_HASH), PARAM_PROGRAM_HASH)?;
    let name = require(params.get_string(PARAM_NAME), PARAM_NAME)?;
    let description = optional(params.get_string(PARAM_DESCRIPTION), PARAM_DESCRIPTION)?.unwrap_or_default();
    if name.is_empty() {
        return Err(ContractError::invalid_param(PARAM_NAME, "empty name"));
    }

    let record = ContractRecord::new(program_hash, &name, &description, caller);
    let hname = record.hname();
    {
        let state = ctx.state();
        if !registry::is_initialized(&state) {
            return Err(ContractError::NotInitialized);
        }
        if registry::find_contract(&state, hname)?.is_some() {
            return Err(ContractError::NameCollision(name));
        }
    }
    if !ctx.has_program(&program_hash) {
        return Err(ContractError::UnknownProgram(program_hash));
    }

    registry::store_contract(&mut ctx.state(), &record)?;

    let mut init_args = params;
    init_args.remove(PARAM_PROGRAM_HASH);
    init_args.remove(PARAM_DESCRIPTION);
    ctx.call(hname, Hname::of(FUNC_INIT), init_args, ColoredBalances::new())?;

    tracing::info!("Deployed contract '{}' ({}) program {}", name, hname, program_hash);
    Ok(Dict::new().with(PARAM_HNAME, hname.to_bytes().to_vec()))
}

pub fn find_contract(ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
    let hname = require(ctx.params().get_hname(PARAM_HNAME), PARAM_HNAME)?;
    let record = registry::find_contract(&ctx.state(), hname)?.ok_or(ContractError::ContractNotFound(hname))?;
    Ok(Dict::new().with(PARAM_DATA, record.to_bytes()?))
}

pub fn get_chain_info(ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
    Ok(registry::get_chain_info(&ctx.state())?.to_dict())
}

/// First half of the ownership transfer: the owner names a successor
pub fn delegate_chain_ownership(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let caller = ctx.caller();
    let next = require(ctx.params().get_agent_id(PARAM_CHAIN_OWNER), PARAM_CHAIN_OWNER)?;

    let mut state = ctx.state();
    registry::ensure_owner(&state, &caller)?;
    state.set(VAR_CHAIN_OWNER_DELEGATED, next.to_bytes().to_vec());

    tracing::info!("Chain ownership delegated: {} -> {}", caller, next);
    Ok(Dict::new())
}

/// Second half: only the named successor can take over
pub fn claim_chain_ownership(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let caller = ctx.caller();

    let mut state = ctx.state();
    let previous = registry::chain_owner(&state)?;
    match registry::delegated_owner(&state)? {
        Some(delegated) if delegated == caller => {}
        _ => return Err(ContractError::Unauthorized),
    }
    state.set(VAR_CHAIN_OWNER, caller.to_bytes().to_vec());
    state.del(VAR_CHAIN_OWNER_DELEGATED);

    tracing::info!("Chain ownership claimed: {} -> {}", previous, caller);
    Ok(Dict::new())
}

fn fee_params(params: &Dict) -> Result<(Option<i64>, Option<i64>), ContractError> {
    let owner_fee = optional(params.get_i64(PARAM_OWNER_FEE), PARAM_OWNER_FEE)?;
    let validator_fee = optional(params.get_i64(PARAM_VALIDATOR_FEE), PARAM_VALIDATOR_FEE)?;
    for fee in [owner_fee, validator_fee].into_iter().flatten() {
        if fee < 0 {
            return Err(ContractError::InvalidFee(fee));
        }
    }
    if owner_fee.is_none() && validator_fee.is_none() {
        return Err(ContractError::MissingParam(format!("{} or {}", PARAM_OWNER_FEE, PARAM_VALIDATOR_FEE)));
    }
    Ok((owner_fee, validator_fee))
}

pub fn set_default_fee(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let caller = ctx.caller();
    let (owner_fee, validator_fee) = fee_params(ctx.params())?;

    let mut state = ctx.state();
    registry::ensure_owner(&state, &caller)?;
    if let Some(fee) = owner_fee {
        state.set(VAR_DEFAULT_OWNER_FEE, codec::encode_i64(fee));
    }
    if let Some(fee) = validator_fee {
        state.set(VAR_DEFAULT_VALIDATOR_FEE, codec::encode_i64(fee));
    }

    tracing::debug!("Default fees set: owner {:?} validator {:?}", owner_fee, validator_fee);
    Ok(Dict::new())
}

pub fn set_contract_fee(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let caller = ctx.caller();
    let hname = require(ctx.params().get_hname(PARAM_HNAME), PARAM_HNAME)?;
    let (owner_fee, validator_fee) = fee_params(ctx.params())?;

    let mut state = ctx.state();
    registry::ensure_owner(&state, &caller)?;
    let mut record = registry::find_contract(&state, hname)?.ok_or(ContractError::ContractNotFound(hname))?;
    if let Some(fee) = owner_fee {
        record.owner_fee = fee;
    }
    if let Some(fee) = validator_fee {
        record.validator_fee = fee;
    }
    registry::store_contract(&mut state, &record)?;

    tracing::debug!(
        "Fees of '{}' set: owner {} validator {}",
        record.name,
        record.owner_fee,
        record.validator_fee
    );
    Ok(Dict::new())
}

pub fn get_fee_info(ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
    let hname = require(ctx.params().get_hname(PARAM_HNAME), PARAM_HNAME)?;
    Ok(registry::get_fee_info(&ctx.state(), hname)?.to_dict())
}
