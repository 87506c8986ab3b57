//! Root Contract - chain-level registry
//!
//! Every chain carries this contract at hname `Hname::of("root")`. It owns:
//! - ChainInfo: chain id, owner, pending delegated owner, fee defaults
//! - The contract registry: one `ContractRecord` per deployed contract
//!
//! All of it is ordinary contract state in the root partition, written
//! only by the entry points below.

use chain_types::{ContractFunction, ContractInterface, Hname};

pub mod processor;
pub mod registry;
pub mod state;

pub use registry::FeeInfo;
pub use state::{ChainInfo, ContractRecord};

/// Contract name
pub const NAME: &str = "root";
/// Program version
pub const VERSION: &str = "0.1";
/// Contract description
pub const DESCRIPTION: &str = "Root Contract";

/// Hname of the root contract
pub fn hname() -> Hname {
    Hname::of(NAME)
}

/// Root contract interface: entry point table and program hash
pub fn interface() -> ContractInterface {
    use constants::*;
    use processor::*;

    ContractInterface::new(NAME, VERSION, DESCRIPTION).with_functions(
        initialize,
        vec![
            ContractFunction::func(FUNC_DEPLOY_CONTRACT, deploy_contract),
            ContractFunction::view(FUNC_FIND_CONTRACT, find_contract),
            ContractFunction::view(FUNC_GET_CHAIN_INFO, get_chain_info),
            ContractFunction::func(FUNC_DELEGATE_CHAIN_OWNERSHIP, delegate_chain_ownership),
            ContractFunction::func(FUNC_CLAIM_CHAIN_OWNERSHIP, claim_chain_ownership),
            ContractFunction::func(FUNC_SET_DEFAULT_FEE, set_default_fee),
            ContractFunction::func(FUNC_SET_CONTRACT_FEE, set_contract_fee),
            ContractFunction::view(FUNC_GET_FEE_INFO, get_fee_info),
        ],
    )
}

/// Constants
pub mod constants {
    // Entry points
    pub const FUNC_DEPLOY_CONTRACT: &str = "deployContract";
    pub const FUNC_FIND_CONTRACT: &str = "findContract";
    pub const FUNC_GET_CHAIN_INFO: &str = "getChainInfo";
    pub const FUNC_DELEGATE_CHAIN_OWNERSHIP: &str = "delegateChainOwnership";
    pub const FUNC_CLAIM_CHAIN_OWNERSHIP: &str = "claimChainOwnership";
    pub const FUNC_SET_DEFAULT_FEE: &str = "setDefaultFee";
    pub const FUNC_SET_CONTRACT_FEE: &str = "setContractFee";
    pub const FUNC_GET_FEE_INFO: &str = "getFeeInfo";

    // State variables (root partition)
    /// Set once by `init`
    pub const VAR_STATE_INITIALIZED: &[u8] = b"i";
    pub const VAR_CHAIN_ID: &[u8] = b"c";
    pub const VAR_CHAIN_OWNER: &[u8] = b"o";
    /// Pending owner set by delegation, cleared by claim
    pub const VAR_CHAIN_OWNER_DELEGATED: &[u8] = b"n";
    pub const VAR_DESCRIPTION: &[u8] = b"d";
    pub const VAR_FEE_COLOR: &[u8] = b"f";
    pub const VAR_DEFAULT_OWNER_FEE: &[u8] = b"do";
    pub const VAR_DEFAULT_VALIDATOR_FEE: &[u8] = b"dv";
    /// Registry map name: elements keyed by hname, count under `r#`
    pub const VAR_CONTRACT_REGISTRY: &[u8] = b"r";

    // Params and results
    pub const PARAM_CHAIN_ID: &str = "chainID";
    pub const PARAM_CHAIN_OWNER: &str = "chainOwner";
    pub const PARAM_DELEGATED_OWNER: &str = "delegatedOwner";
    pub const PARAM_DESCRIPTION: &str = "description";
    pub const PARAM_FEE_COLOR: &str = "feeColor";
    pub const PARAM_OWNER_FEE: &str = "ownerFee";
    pub const PARAM_VALIDATOR_FEE: &str = "validatorFee";
    pub const PARAM_PROGRAM_HASH: &str = "programHash";
    pub const PARAM_NAME: &str = "name";
    pub const PARAM_HNAME: &str = "hname";
    pub const PARAM_DATA: &str = "data";
    pub const PARAM_CONTRACT_COUNT: &str = "contractCount";
}

#[cfg(test)]
mod tests;
