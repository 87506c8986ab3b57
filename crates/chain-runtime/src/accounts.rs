//! Accounts Contract - on-chain token balances
//!
//! Builtin contract holding one `ColoredBalances` per agent. Balances
//! change only through the credit/debit helpers, which the dispatcher
//! uses for fees, refunds and transfers between contracts.

use chain_types::{
    kv::{map_elem_key, map_get, map_set},
    vm::require,
    AgentId, ColoredBalances, ContractError, ContractFunction, ContractInterface, Dict, Hname,
    KvRead, KvStore, Sandbox, SandboxView,
};

pub const NAME: &str = "accounts";
pub const VERSION: &str = "0.1";
pub const DESCRIPTION: &str = "Chain account ledger";

pub const FUNC_GET_BALANCE: &str = "getBalance";
pub const FUNC_GET_TOTAL_ASSETS: &str = "getTotalAssets";

pub const PARAM_AGENT_ID: &str = "agentID";
pub const PARAM_BALANCES: &str = "balances";

/// Balances map, keyed by encoded agent id
const VAR_BALANCES: &[u8] = b"b";
/// Sum of all balances
const VAR_TOTAL_ASSETS: &[u8] = b"t";

pub fn hname() -> Hname {
    Hname::of(NAME)
}

pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, VERSION, DESCRIPTION).with_functions(
        initialize,
        vec![
            ContractFunction::view(FUNC_GET_BALANCE, get_balance),
            ContractFunction::view(FUNC_GET_TOTAL_ASSETS, get_total_assets),
        ],
    )
}

fn initialize(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    tracing::debug!("accounts contract initialized at {}", ctx.contract());
    Ok(Dict::new())
}

fn get_balance(ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
    let agent = require(ctx.params().get_agent_id(PARAM_AGENT_ID), PARAM_AGENT_ID)?;
    let balances = balance_of(&ctx.state(), &agent)?;
    Ok(Dict::new().with(PARAM_BALANCES, balances.to_bytes()))
}

fn get_total_assets(ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
    Ok(Dict::new().with(PARAM_BALANCES, total_assets(&ctx.state())?.to_bytes()))
}

fn read_balances(bytes: Option<Vec<u8>>) -> Result<ColoredBalances, ContractError> {
    match bytes {
        Some(bytes) => Ok(ColoredBalances::from_bytes(&bytes)?),
        None => Ok(ColoredBalances::new()),
    }
}

/// Balance of one agent; `state` is the accounts partition
pub fn balance_of(state: &dyn KvRead, agent: &AgentId) -> Result<ColoredBalances, ContractError> {
    read_balances(map_get(state, VAR_BALANCES, &agent.to_bytes()))
}

pub fn total_assets(state: &dyn KvRead) -> Result<ColoredBalances, ContractError> {
    read_balances(state.get(VAR_TOTAL_ASSETS))
}

/// Reject negative amounts
pub fn check_amounts(amounts: &ColoredBalances) -> Result<(), ContractError> {
    match amounts.iter().find(|(_, v)| **v < 0) {
        Some((color, v)) => Err(ContractError::invalid_param(
            "transfer",
            format!("negative amount {} of {}", v, color),
        )),
        None => Ok(()),
    }
}

/// Add tokens to an agent's account
pub fn credit(state: &mut dyn KvStore, agent: &AgentId, amounts: &ColoredBalances) -> Result<(), ContractError> {
    if amounts.is_empty() {
        return Ok(());
    }
    check_amounts(amounts)?;

    let key = map_elem_key(VAR_BALANCES, &agent.to_bytes());
    let overflow = || ContractError::Failed(format!("balance overflow crediting {}", agent));
    let balances = read_balances(state.get(&key))?.checked_sum(amounts).ok_or_else(overflow)?;
    let total = read_balances(state.get(VAR_TOTAL_ASSETS))?
        .checked_sum(amounts)
        .ok_or_else(overflow)?;

    map_set(state, VAR_BALANCES, &agent.to_bytes(), balances.to_bytes())?;
    state.set(VAR_TOTAL_ASSETS, total.to_bytes());
    Ok(())
}

/// Remove tokens from an agent's account; fails without writing if any
/// color is short
pub fn debit(state: &mut dyn KvStore, agent: &AgentId, amounts: &ColoredBalances) -> Result<(), ContractError> {
    if amounts.is_empty() {
        return Ok(());
    }
    check_amounts(amounts)?;

    let key = map_elem_key(VAR_BALANCES, &agent.to_bytes());
    let mut balances = read_balances(state.get(&key))?;
    for (color, amount) in amounts.iter() {
        if balances.get(color) < *amount {
            return Err(ContractError::Failed(format!(
                "insufficient funds: {} has {} of {}, needs {}",
                agent,
                balances.get(color),
                color,
                amount
            )));
        }
    }
    let mut total = read_balances(state.get(VAR_TOTAL_ASSETS))?;
    for (color, amount) in amounts.iter() {
        balances
            .checked_add(*color, -*amount)
            .and_then(|_| total.checked_add(*color, -*amount))
            .ok_or_else(|| ContractError::Failed(format!("balance underflow debiting {}", agent)))?;
    }
    map_set(state, VAR_BALANCES, &agent.to_bytes(), balances.to_bytes())?;
    state.set(VAR_TOTAL_ASSETS, total.to_bytes());
    Ok(())
}

/// Move tokens between two accounts
pub fn transfer(
    state: &mut dyn KvStore,
    from: &AgentId,
    to: &AgentId,
    amounts: &ColoredBalances,
) -> Result<(), ContractError> {
    debit(state, from, amounts)?;
    credit(state, to, amounts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::{Address, BufferedKv, Color, ContractState};

    struct Empty;

    impl KvRead for Empty {
        fn get(&self, _key: &[u8]) -> Option<Vec<u8>> {
            None
        }
    }

    fn agent(seed: &str) -> AgentId {
        AgentId::Address(Address::from_seed(seed))
    }

    #[test]
    fn test_credit_and_debit() {
        let mut kv = BufferedKv::new(&Empty);
        let mut state = ContractState::new(&mut kv, hname());
        let alice = agent("alice");
        let bob = agent("bob");

        credit(&mut state, &alice, &ColoredBalances::base(100)).unwrap();
        transfer(&mut state, &alice, &bob, &ColoredBalances::base(30)).unwrap();

        assert_eq!(balance_of(&state, &alice).unwrap().get(&Color::BASE), 70);
        assert_eq!(balance_of(&state, &bob).unwrap().get(&Color::BASE), 30);
        assert_eq!(total_assets(&state).unwrap().get(&Color::BASE), 100);

        debit(&mut state, &bob, &ColoredBalances::base(30)).unwrap();
        assert!(balance_of(&state, &bob).unwrap().is_empty());
        assert_eq!(total_assets(&state).unwrap().get(&Color::BASE), 70);
    }

    #[test]
    fn test_overdraft_rejected_without_writes() {
        let mut kv = BufferedKv::new(&Empty);
        {
            let mut state = ContractState::new(&mut kv, hname());
            credit(&mut state, &agent("alice"), &ColoredBalances::base(5)).unwrap();
        }
        let before = kv.mutations().len();

        let mut state = ContractState::new(&mut kv, hname());
        assert!(matches!(
            debit(&mut state, &agent("alice"), &ColoredBalances::base(6)),
            Err(ContractError::Failed(_))
        ));
        drop(state);
        assert_eq!(kv.mutations().len(), before);
    }

    #[test]
    fn test_overflowing_credit_rejected_without_writes() {
        let mut kv = BufferedKv::new(&Empty);
        {
            let mut state = ContractState::new(&mut kv, hname());
            credit(&mut state, &agent("alice"), &ColoredBalances::base(i64::MAX)).unwrap();
        }
        let before = kv.mutations().len();

        let mut state = ContractState::new(&mut kv, hname());
        // bob's own balance fits, the chain total does not
        assert!(matches!(
            credit(&mut state, &agent("bob"), &ColoredBalances::base(1)),
            Err(ContractError::Failed(_))
        ));
        assert!(balance_of(&state, &agent("bob")).unwrap().is_empty());
        assert_eq!(total_assets(&state).unwrap().get(&Color::BASE), i64::MAX);
        drop(state);
        assert_eq!(kv.mutations().len(), before);
    }

    #[test]
    fn test_negative_amounts_rejected() {
        let mut kv = BufferedKv::new(&Empty);
        let mut state = ContractState::new(&mut kv, hname());
        let bad: ColoredBalances = [(Color::BASE, -1)].into_iter().collect();
        assert!(matches!(
            credit(&mut state, &agent("alice"), &bad),
            Err(ContractError::InvalidParam { .. })
        ));
    }
}
