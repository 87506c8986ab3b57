//! Contract Dispatcher
//!
//! Routes one request to its contract: registry lookup, processor
//! lookup, entry point check, fee accounting, then the call itself.
//! A failed call leaves only its fee and refund bookkeeping behind.

use chain_types::{
    AgentId, BufferedKv, ChainId, ColoredBalances, ContractError, ContractId, ContractState,
    ContractStateView, Dict, EntryPointKind, Hname, KvRead, Processor, Request, RequestId, FUNC_INIT,
};
use root_contract::{registry, ContractRecord, FeeInfo};
use std::{
    any::Any,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use crate::{
    accounts,
    processors::ProcessorRegistry,
    sandbox::{CallContext, ViewContext},
    MAX_CALL_DEPTH,
};

/// Result of one request inside a batch
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestOutcome {
    Success(Dict),
    RequestFailed(ContractError),
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestResult {
    pub request_id: RequestId,
    pub outcome: RequestOutcome,
}

/// Stateless router from requests to processors
pub struct Dispatcher {
    chain_id: ChainId,
    /// Receives validator fees
    validator: AgentId,
    processors: ProcessorRegistry,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn accounts_state<'k>(kv: &'k mut BufferedKv<'_>) -> ContractState<'k> {
    ContractState::new(kv, accounts::hname())
}

impl Dispatcher {
    pub fn new(chain_id: ChainId, validator: AgentId, processors: ProcessorRegistry) -> Self {
        Self {
            chain_id,
            validator,
            processors,
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn processors(&self) -> &ProcessorRegistry {
        &self.processors
    }

    fn contract_agent(&self, hname: Hname) -> AgentId {
        AgentId::Contract(ContractId::new(self.chain_id, hname))
    }

    /// Execute one request against `kv`. Never fails as a whole: errors
    /// become `RequestFailed`.
    pub fn dispatch(&self, kv: &mut BufferedKv<'_>, req: &Request) -> RequestOutcome {
        match self.try_dispatch(kv, req) {
            Ok(result) => {
                tracing::debug!("Request {} -> {}::{} ok", req.id, req.target, req.entry_point);
                RequestOutcome::Success(result)
            }
            Err(e) => {
                tracing::debug!("Request {} -> {}::{} failed: {}", req.id, req.target, req.entry_point, e);
                RequestOutcome::RequestFailed(e)
            }
        }
    }

    fn try_dispatch(&self, kv: &mut BufferedKv<'_>, req: &Request) -> Result<Dict, ContractError> {
        accounts::check_amounts(&req.transfer)?;

        let resolved = self
            .resolve(&*kv, &req.sender, req.target, req.entry_point)
            .and_then(|(record, processor)| Ok((self.fees(&*kv, &record)?, processor)));
        let (fees, processor) = match resolved {
            Ok(r) => r,
            Err(e) => {
                self.refund(kv, &req.sender, &req.transfer)?;
                return Err(e);
            }
        };

        let available = req.transfer.get(&fees.color);
        if available < fees.total() {
            self.refund(kv, &req.sender, &req.transfer)?;
            return Err(ContractError::NotEnoughFees {
                required: fees.total(),
                available,
            });
        }

        if fees.owner_fee > 0 {
            let owner = registry::chain_owner(&ContractStateView::new(&*kv, root_contract::hname()))?;
            let fee = ColoredBalances::from_iter([(fees.color, fees.owner_fee)]);
            accounts::credit(&mut accounts_state(kv), &owner, &fee)?;
        }
        if fees.validator_fee > 0 {
            let fee = ColoredBalances::from_iter([(fees.color, fees.validator_fee)]);
            accounts::credit(&mut accounts_state(kv), &self.validator, &fee)?;
        }

        let mut remainder = req.transfer.clone();
        remainder
            .checked_add(fees.color, -fees.total())
            .ok_or_else(|| ContractError::Failed("fee exceeds transfer".to_string()))?;

        let checkpoint = kv.clone();
        let credited = accounts::credit(&mut accounts_state(kv), &self.contract_agent(req.target), &remainder);
        let result = match credited {
            Ok(()) => self.invoke(
                kv,
                processor.as_ref(),
                req.target,
                req.entry_point,
                req.sender,
                req.args.clone(),
                remainder.clone(),
                0,
            ),
            Err(e) => Err(e),
        };

        if result.is_err() {
            *kv = checkpoint;
            self.refund(kv, &req.sender, &remainder)?;
        }
        result
    }

    /// Call made by a contract: no fees, tokens move from the caller's
    /// account to the target's
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn call_nested(
        &self,
        kv: &mut BufferedKv<'_>,
        caller: AgentId,
        target: Hname,
        entry_point: Hname,
        args: Dict,
        transfer: ColoredBalances,
        depth: u32,
    ) -> Result<Dict, ContractError> {
        if depth > MAX_CALL_DEPTH {
            return Err(ContractError::Failed(format!("call depth {} exceeded", MAX_CALL_DEPTH)));
        }
        let (_, processor) = self.resolve(&*kv, &caller, target, entry_point)?;

        let checkpoint = kv.clone();
        let moved = accounts::transfer(&mut accounts_state(kv), &caller, &self.contract_agent(target), &transfer);
        let result = match moved {
            Ok(()) => self.invoke(kv, processor.as_ref(), target, entry_point, caller, args, transfer, depth),
            Err(e) => Err(e),
        };

        if result.is_err() {
            *kv = checkpoint;
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke(
        &self,
        kv: &mut BufferedKv<'_>,
        processor: &dyn Processor,
        contract: Hname,
        entry_point: Hname,
        caller: AgentId,
        params: Dict,
        incoming: ColoredBalances,
        depth: u32,
    ) -> Result<Dict, ContractError> {
        let mut ctx = CallContext {
            dispatcher: self,
            kv,
            contract,
            caller,
            params,
            incoming,
            depth,
        };
        // a panicking contract fails its call; callers roll the overlay back
        match panic::catch_unwind(AssertUnwindSafe(|| processor.call(entry_point, &mut ctx))) {
            Ok(result) => result,
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::warn!("Contract {}::{} panicked: {}", contract, entry_point, reason);
                Err(ContractError::Failed(format!("contract panicked: {}", reason)))
            }
        }
    }

    /// Run a view against a read-only state
    pub fn call_view(
        &self,
        state: &dyn KvRead,
        target: Hname,
        entry_point: Hname,
        params: Dict,
    ) -> Result<Dict, ContractError> {
        let root = ContractStateView::new(state, root_contract::hname());
        let record = registry::find_contract(&root, target)?.ok_or(ContractError::ContractNotFound(target))?;
        let processor = self
            .processors
            .get(&record.program_hash)
            .ok_or(ContractError::UnknownProgram(record.program_hash))?;

        let ctx = ViewContext {
            chain_id: self.chain_id,
            kv: state,
            contract: target,
            params,
        };
        processor.call_view(entry_point, &ctx)
    }

    /// Registry record and processor of a callable entry point.
    ///
    /// `init` of a contract is reserved to the root contract deploying
    /// it. Root's own `init` guards itself against a second run.
    fn resolve(
        &self,
        state: &dyn KvRead,
        caller: &AgentId,
        target: Hname,
        entry_point: Hname,
    ) -> Result<(ContractRecord, Arc<dyn Processor>), ContractError> {
        let root = ContractStateView::new(state, root_contract::hname());
        let record = match registry::find_contract(&root, target)? {
            Some(record) => record,
            // before genesis the root contract is reachable without a record
            None if target == root_contract::hname() && !registry::is_initialized(&root) => {
                let itf = root_contract::interface();
                ContractRecord::new(itf.program_hash, &itf.name, &itf.description, self.contract_agent(target))
            }
            None => return Err(ContractError::ContractNotFound(target)),
        };

        let processor = self
            .processors
            .get(&record.program_hash)
            .ok_or(ContractError::UnknownProgram(record.program_hash))?;
        match processor.kind(entry_point) {
            Some(EntryPointKind::Func)
                if entry_point == Hname::of(FUNC_INIT)
                    && target != root_contract::hname()
                    && *caller != self.contract_agent(root_contract::hname()) =>
            {
                Err(ContractError::Unauthorized)
            }
            Some(EntryPointKind::Func) => Ok((record, processor)),
            Some(EntryPointKind::View) => Err(ContractError::NotAFunction(entry_point)),
            None => Err(ContractError::EntryPointNotFound(entry_point)),
        }
    }

    /// Effective fees; zero before genesis
    fn fees(&self, state: &dyn KvRead, record: &ContractRecord) -> Result<FeeInfo, ContractError> {
        let root = ContractStateView::new(state, root_contract::hname());
        if !registry::is_initialized(&root) {
            return Ok(FeeInfo {
                color: chain_types::Color::BASE,
                owner_fee: 0,
                validator_fee: 0,
            });
        }
        registry::resolve_fees(&root, record)
    }

    fn refund(&self, kv: &mut BufferedKv<'_>, sender: &AgentId, amounts: &ColoredBalances) -> Result<(), ContractError> {
        accounts::credit(&mut accounts_state(kv), sender, amounts)
    }
}
