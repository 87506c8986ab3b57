//! Sandbox implementations handed to contract entry points

use chain_types::{
    AgentId, BufferedKv, ChainId, ColoredBalances, ContractError, ContractState, ContractStateView,
    Dict, HashValue, Hname, KvRead, Sandbox, SandboxView,
};

use crate::dispatcher::Dispatcher;

/// Context of one state-changing call: a request, or a nested call
/// made by another contract. Writes go to the request overlay.
pub struct CallContext<'a, 'b> {
    pub(crate) dispatcher: &'a Dispatcher,
    pub(crate) kv: &'a mut BufferedKv<'b>,
    pub(crate) contract: Hname,
    pub(crate) caller: AgentId,
    pub(crate) params: Dict,
    pub(crate) incoming: ColoredBalances,
    pub(crate) depth: u32,
}

impl Sandbox for CallContext<'_, '_> {
    fn chain_id(&self) -> ChainId {
        self.dispatcher.chain_id()
    }

    fn contract(&self) -> Hname {
        self.contract
    }

    fn caller(&self) -> AgentId {
        self.caller
    }

    fn params(&self) -> &Dict {
        &self.params
    }

    fn incoming(&self) -> &ColoredBalances {
        &self.incoming
    }

    fn state(&mut self) -> ContractState<'_> {
        ContractState::new(&mut *self.kv, self.contract)
    }

    fn has_program(&self, program_hash: &HashValue) -> bool {
        self.dispatcher.processors().contains(program_hash)
    }

    fn call(
        &mut self,
        target: Hname,
        entry_point: Hname,
        args: Dict,
        transfer: ColoredBalances,
    ) -> Result<Dict, ContractError> {
        let me = self.my_agent_id();
        self.dispatcher
            .call_nested(&mut *self.kv, me, target, entry_point, args, transfer, self.depth + 1)
    }
}

/// Context of a view call over a read-only state
pub struct ViewContext<'a> {
    pub(crate) chain_id: ChainId,
    pub(crate) kv: &'a dyn KvRead,
    pub(crate) contract: Hname,
    pub(crate) params: Dict,
}

impl SandboxView for ViewContext<'_> {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn contract(&self) -> Hname {
        self.contract
    }

    fn params(&self) -> &Dict {
        &self.params
    }

    fn state(&self) -> ContractStateView<'_> {
        ContractStateView::new(self.kv, self.contract)
    }
}
