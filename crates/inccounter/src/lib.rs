//! Increment counter contract
//!
//! Holds one signed counter. `init` takes an optional starting value,
//! `incCounter` adds one, `getCounter` reads it.

use chain_types::{
    codec,
    vm::optional,
    ContractError, ContractFunction, ContractInterface, Dict, KvRead, KvStore, Sandbox,
    SandboxView,
};

pub const NAME: &str = "inccounter";
pub const VERSION: &str = "0.1";
pub const DESCRIPTION: &str = "Increment counter";

pub const FUNC_INC_COUNTER: &str = "incCounter";
pub const FUNC_GET_COUNTER: &str = "getCounter";

/// State variable and param name
pub const VAR_COUNTER: &str = "counter";

pub fn interface() -> ContractInterface {
    ContractInterface::new(NAME, VERSION, DESCRIPTION).with_functions(
        initialize,
        vec![
            ContractFunction::func(FUNC_INC_COUNTER, inc_counter),
            ContractFunction::view(FUNC_GET_COUNTER, get_counter),
        ],
    )
}

fn read_counter(state: &dyn KvRead) -> Result<i64, ContractError> {
    match state.get(VAR_COUNTER.as_bytes()) {
        Some(bytes) => Ok(codec::decode_i64(&bytes)?),
        None => Ok(0),
    }
}

fn initialize(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let value = optional(ctx.params().get_i64(VAR_COUNTER), VAR_COUNTER)?.unwrap_or(0);
    ctx.state().set(VAR_COUNTER.as_bytes(), codec::encode_i64(value));

    tracing::debug!("inccounter {} initialized with {}", ctx.contract(), value);
    Ok(Dict::new())
}

fn inc_counter(ctx: &mut dyn Sandbox) -> Result<Dict, ContractError> {
    let mut state = ctx.state();
    let value = read_counter(&state)?
        .checked_add(1)
        .ok_or_else(|| ContractError::Failed("counter overflow".to_string()))?;
    state.set(VAR_COUNTER.as_bytes(), codec::encode_i64(value));

    Ok(Dict::new().with(VAR_COUNTER, codec::encode_i64(value)))
}

fn get_counter(ctx: &dyn SandboxView) -> Result<Dict, ContractError> {
    let value = read_counter(&ctx.state())?;
    Ok(Dict::new().with(VAR_COUNTER, codec::encode_i64(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chain_types::{hash_strings, EntryPointKind, Hname, Processor};

    #[test]
    fn test_interface() {
        let itf = interface();
        assert_eq!(itf.program_hash, hash_strings(&["inccounter-0.1"]));
        assert_eq!(itf.kind(Hname::of("init")), Some(EntryPointKind::Func));
        assert_eq!(itf.kind(Hname::of(FUNC_INC_COUNTER)), Some(EntryPointKind::Func));
        assert_eq!(itf.kind(Hname::of(FUNC_GET_COUNTER)), Some(EntryPointKind::View));
    }
}
