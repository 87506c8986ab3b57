//! Engine scenario tests
//!
//! Full chains over `MemoryDb` or `SledDb`: genesis, contract calls with
//! fees, ownership handover, the running loops and persistence.

mod engine_test;

use std::sync::Arc;

use chain_types::{
    codec, hash_strings, Address, AgentId, ChainId, Color, ContractId, Dict, Hname, Request,
    RequestId,
};
use root_contract::constants::*;
use vstate::{MemoryDb, StateDb};

use crate::{Engine, EngineConfig, ProcessorRegistry, RequestOutcome};

pub(crate) fn config() -> EngineConfig {
    EngineConfig {
        poll_interval_ms: 10,
        ..EngineConfig::default()
    }
}

pub(crate) fn owner() -> AgentId {
    config().chain_owner
}

pub(crate) fn user(seed: &str) -> AgentId {
    AgentId::Address(Address::from_seed(seed))
}

pub(crate) fn processors() -> ProcessorRegistry {
    ProcessorRegistry::new().with(inccounter::interface())
}

pub(crate) fn engine_on(db: Arc<dyn StateDb>) -> Engine {
    Engine::new(config(), db, processors()).unwrap()
}

pub(crate) fn engine() -> Engine {
    engine_on(Arc::new(MemoryDb::new()))
}

pub(crate) fn request(n: u16, sender: AgentId, target: &str, ep: &str) -> Request {
    Request::new(
        RequestId::new(hash_strings(&["scenario"]), n),
        sender,
        Hname::of(target),
        Hname::of(ep),
    )
}

pub(crate) fn deploy_counter(n: u16, name: &str, start: i64) -> Request {
    request(n, owner(), root_contract::NAME, FUNC_DEPLOY_CONTRACT).with_args(
        Dict::new()
            .with(PARAM_PROGRAM_HASH, inccounter::interface().program_hash.as_bytes().to_vec())
            .with(PARAM_NAME, codec::encode_string(name))
            .with(inccounter::VAR_COUNTER, codec::encode_i64(start)),
    )
}

pub(crate) fn counter(engine: &Engine, name: &str) -> i64 {
    let res = engine
        .call_view(Hname::of(name), Hname::of(inccounter::FUNC_GET_COUNTER), Dict::new())
        .unwrap();
    codec::decode_i64(res.get(inccounter::VAR_COUNTER).unwrap()).unwrap()
}

pub(crate) fn base_balance(engine: &Engine, agent: &AgentId) -> i64 {
    engine.balance(agent).unwrap().get(&Color::BASE)
}

pub(crate) fn contract_agent(chain_id: ChainId, name: &str) -> AgentId {
    AgentId::Contract(ContractId::new(chain_id, Hname::of(name)))
}

/// Run one batch and return its outcomes
pub(crate) fn run(engine: &Engine, batch: Vec<Request>) -> Vec<RequestOutcome> {
    let update = engine.run_batch(batch).unwrap();
    assert!(update.is_done());
    update.results.into_iter().map(|r| r.outcome).collect()
}
