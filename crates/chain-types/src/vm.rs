//! Processor and sandbox interfaces
//!
//! A processor is the executable form of a program. The runtime hands
//! each entry point a sandbox: the only way a contract sees its caller,
//! its params, its tokens and its own state partition.

use crate::{
    agent::{AgentId, ChainId, ContractId},
    balance::ColoredBalances,
    codec::CodecError,
    hashing::{hash_strings, HashValue},
    hname::Hname,
    kv::{ContractState, ContractStateView, Dict},
    FUNC_INIT,
};
use std::collections::BTreeMap;
use thiserror::Error;

/// Errors raised by contracts and by the dispatch path into them
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContractError {
    #[error("contract name '{0}' is already registered")]
    NameCollision(String),

    #[error("no processor registered for program {0}")]
    UnknownProgram(HashValue),

    #[error("contract {0} not found")]
    ContractNotFound(Hname),

    #[error("unauthorized")]
    Unauthorized,

    #[error("malformed record: {0}")]
    MalformedRecord(#[from] CodecError),

    #[error("entry point {0} not found")]
    EntryPointNotFound(Hname),

    #[error("entry point {0} is a view and cannot be called by a request")]
    NotAFunction(Hname),

    #[error("entry point {0} is not a view")]
    NotAView(Hname),

    #[error("missing parameter '{0}'")]
    MissingParam(String),

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("invalid fee {0}: fees must be non-negative")]
    InvalidFee(i64),

    #[error("not enough fees: required {required}, available {available}")]
    NotEnoughFees { required: i64, available: i64 },

    #[error("contract already initialized")]
    AlreadyInitialized,

    #[error("contract not initialized")]
    NotInitialized,

    #[error("{0}")]
    Failed(String),
}

impl ContractError {
    pub fn invalid_param(name: &str, reason: impl ToString) -> Self {
        ContractError::InvalidParam {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Unwrap a typed param that must be present
pub fn require<T>(value: Result<Option<T>, CodecError>, name: &str) -> Result<T, ContractError> {
    optional(value, name)?.ok_or_else(|| ContractError::MissingParam(name.to_string()))
}

/// Unwrap an optional typed param, rejecting malformed values
pub fn optional<T>(value: Result<Option<T>, CodecError>, name: &str) -> Result<Option<T>, ContractError> {
    value.map_err(|e| ContractError::invalid_param(name, e))
}

/// Context of a read-only call
pub trait SandboxView {
    fn chain_id(&self) -> ChainId;
    fn contract(&self) -> Hname;
    fn params(&self) -> &Dict;
    fn state(&self) -> ContractStateView<'_>;
}

/// Context of a state-changing call
pub trait Sandbox {
    fn chain_id(&self) -> ChainId;

    /// Hname of the contract being executed
    fn contract(&self) -> Hname;

    /// Agent that sent the request, or the calling contract
    fn caller(&self) -> AgentId;

    fn params(&self) -> &Dict;

    /// Tokens credited to this contract by the current call (after fees)
    fn incoming(&self) -> &ColoredBalances;

    fn state(&mut self) -> ContractState<'_>;

    /// Whether the chain can execute the given program
    fn has_program(&self, program_hash: &HashValue) -> bool;

    /// Call another contract inside the same request
    fn call(
        &mut self,
        target: Hname,
        entry_point: Hname,
        args: Dict,
        transfer: ColoredBalances,
    ) -> Result<Dict, ContractError>;

    fn my_agent_id(&self) -> AgentId {
        AgentId::Contract(ContractId::new(self.chain_id(), self.contract()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryPointKind {
    Func,
    View,
}

/// Executable capability behind a program hash
pub trait Processor: Send + Sync {
    fn kind(&self, entry_point: Hname) -> Option<EntryPointKind>;

    fn call(&self, entry_point: Hname, ctx: &mut dyn Sandbox) -> Result<Dict, ContractError>;

    fn call_view(&self, entry_point: Hname, ctx: &dyn SandboxView) -> Result<Dict, ContractError>;
}

pub type FuncHandler = fn(&mut dyn Sandbox) -> Result<Dict, ContractError>;
pub type ViewHandler = fn(&dyn SandboxView) -> Result<Dict, ContractError>;

#[derive(Clone, Copy)]
pub enum Handler {
    Func(FuncHandler),
    View(ViewHandler),
}

/// One row of a contract's entry point table
#[derive(Clone)]
pub struct ContractFunction {
    pub name: &'static str,
    pub hname: Hname,
    pub handler: Handler,
}

impl ContractFunction {
    pub fn func(name: &'static str, handler: FuncHandler) -> Self {
        Self {
            name,
            hname: Hname::of(name),
            handler: Handler::Func(handler),
        }
    }

    pub fn view(name: &'static str, handler: ViewHandler) -> Self {
        Self {
            name,
            hname: Hname::of(name),
            handler: Handler::View(handler),
        }
    }
}

/// Native contract: metadata plus an explicit entry point table
pub struct ContractInterface {
    pub name: String,
    pub description: String,
    pub program_hash: HashValue,
    functions: BTreeMap<Hname, ContractFunction>,
}

impl ContractInterface {
    /// Program hash is the hash of `name-version`
    pub fn new(name: &str, version: &str, description: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            program_hash: hash_strings(&[name, "-", version]),
            functions: BTreeMap::new(),
        }
    }

    /// Register `init` and the given functions
    pub fn with_functions(mut self, init: FuncHandler, functions: Vec<ContractFunction>) -> Self {
        let init = ContractFunction::func(FUNC_INIT, init);
        self.functions.insert(init.hname, init);
        for f in functions {
            self.functions.insert(f.hname, f);
        }
        self
    }

    /// Hname of the default instance of this contract
    pub fn hname(&self) -> Hname {
        Hname::of(&self.name)
    }

    pub fn function(&self, entry_point: Hname) -> Option<&ContractFunction> {
        self.functions.get(&entry_point)
    }

    pub fn functions(&self) -> impl Iterator<Item = &ContractFunction> {
        self.functions.values()
    }
}

impl Processor for ContractInterface {
    fn kind(&self, entry_point: Hname) -> Option<EntryPointKind> {
        self.function(entry_point).map(|f| match f.handler {
            Handler::Func(_) => EntryPointKind::Func,
            Handler::View(_) => EntryPointKind::View,
        })
    }

    fn call(&self, entry_point: Hname, ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
        match self.function(entry_point).map(|f| f.handler) {
            Some(Handler::Func(f)) => f(ctx),
            Some(Handler::View(_)) => Err(ContractError::NotAFunction(entry_point)),
            None => Err(ContractError::EntryPointNotFound(entry_point)),
        }
    }

    fn call_view(&self, entry_point: Hname, ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
        match self.function(entry_point).map(|f| f.handler) {
            Some(Handler::View(f)) => f(ctx),
            Some(Handler::Func(_)) => Err(ContractError::NotAView(entry_point)),
            None => Err(ContractError::EntryPointNotFound(entry_point)),
        }
    }
}
