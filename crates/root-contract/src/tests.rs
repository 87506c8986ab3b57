//! Root contract tests against an in-memory sandbox

use std::collections::BTreeMap;

use chain_types::{
    codec, Address, AgentId, ChainId, Color, ColoredBalances, ContractError, ContractState,
    ContractStateView, Dict, HashValue, Hname, KvRead, KvStore, Processor, Sandbox, SandboxView,
};

use crate::{constants::*, registry, ContractRecord};

/// Flat key/value map
#[derive(Default, Clone, Debug, PartialEq)]
pub struct MapKv(pub BTreeMap<Vec<u8>, Vec<u8>>);

impl KvRead for MapKv {
    fn get(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.0.get(key).cloned()
    }
}

impl KvStore for MapKv {
    fn set(&mut self, key: &[u8], value: Vec<u8>) {
        self.0.insert(key.to_vec(), value);
    }

    fn del(&mut self, key: &[u8]) {
        self.0.remove(key);
    }
}

/// Sandbox running root entry points over a flat map. Nested calls are
/// recorded, not executed.
pub struct MockSandbox {
    pub kv: MapKv,
    pub chain_id: ChainId,
    pub caller: AgentId,
    pub params: Dict,
    pub incoming: ColoredBalances,
    pub programs: Vec<HashValue>,
    pub calls: Vec<(Hname, Hname, Dict)>,
}

impl MockSandbox {
    pub fn new() -> Self {
        Self {
            kv: MapKv::default(),
            chain_id: ChainId(Address::from_seed("chain")),
            caller: owner(),
            params: Dict::new(),
            incoming: ColoredBalances::new(),
            programs: vec![counter_program()],
            calls: Vec::new(),
        }
    }

    pub fn initialized() -> Self {
        let mut sb = Self::new();
        sb.func(owner(), "init", Dict::new()).unwrap();
        sb
    }

    pub fn func(&mut self, caller: AgentId, name: &str, params: Dict) -> Result<Dict, ContractError> {
        self.caller = caller;
        self.params = params;
        crate::interface().call(Hname::of(name), self)
    }

    pub fn view(&mut self, name: &str, params: Dict) -> Result<Dict, ContractError> {
        self.params = params;
        crate::interface().call_view(Hname::of(name), &*self)
    }

    pub fn root_state(&self) -> ContractStateView<'_> {
        ContractStateView::new(&self.kv, crate::hname())
    }
}

impl Sandbox for MockSandbox {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn contract(&self) -> Hname {
        crate::hname()
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
        ContractState::new(&mut self.kv, crate::hname())
    }

    fn has_program(&self, program_hash: &HashValue) -> bool {
        self.programs.contains(program_hash)
    }

    fn call(
        &mut self,
        target: Hname,
        entry_point: Hname,
        args: Dict,
        _transfer: ColoredBalances,
    ) -> Result<Dict, ContractError> {
        self.calls.push((target, entry_point, args));
        Ok(Dict::new())
    }
}

impl SandboxView for MockSandbox {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    fn contract(&self) -> Hname {
        crate::hname()
    }

    fn params(&self) -> &Dict {
        &self.params
    }

    fn state(&self) -> ContractStateView<'_> {
        ContractStateView::new(&self.kv, crate::hname())
    }
}

pub fn owner() -> AgentId {
    AgentId::Address(Address::from_seed("owner"))
}

fn agent(seed: &str) -> AgentId {
    AgentId::Address(Address::from_seed(seed))
}

fn counter_program() -> HashValue {
    chain_types::hash_strings(&["inccounter-0.1"])
}

fn deploy_params(name: &str) -> Dict {
    Dict::new()
        .with(PARAM_PROGRAM_HASH, counter_program().as_bytes().to_vec())
        .with(PARAM_NAME, codec::encode_string(name))
        .with(PARAM_DESCRIPTION, codec::encode_string("counter"))
        .with("counter", codec::encode_i64(42))
}

fn hname_param(name: &str) -> Dict {
    Dict::new().with(PARAM_HNAME, Hname::of(name).to_bytes().to_vec())
}

fn fee_params(owner_fee: Option<i64>, validator_fee: Option<i64>) -> Dict {
    let mut d = Dict::new();
    if let Some(fee) = owner_fee {
        d.set(PARAM_OWNER_FEE, codec::encode_i64(fee));
    }
    if let Some(fee) = validator_fee {
        d.set(PARAM_VALIDATOR_FEE, codec::encode_i64(fee));
    }
    d
}

#[test]
fn test_init_registers_root() {
    let mut sb = MockSandbox::initialized();

    let info = registry::get_chain_info(&sb.root_state()).unwrap();
    assert_eq!(info.owner, owner());
    assert_eq!(info.chain_id, sb.chain_id);
    assert_eq!(info.fee_color, Color::BASE);
    assert_eq!(info.contract_count, 1);

    let rec = registry::find_contract(&sb.root_state(), crate::hname()).unwrap().unwrap();
    assert_eq!(rec.name, "root");
    assert_eq!(rec.program_hash, chain_types::hash_strings(&["root-0.1"]));

    let before = sb.kv.clone();
    assert_eq!(sb.func(owner(), "init", Dict::new()), Err(ContractError::AlreadyInitialized));
    assert_eq!(sb.kv, before);
}

#[test]
fn test_init_rejects_foreign_chain_id() {
    let mut sb = MockSandbox::new();
    let params = Dict::new().with(PARAM_CHAIN_ID, Address::from_seed("other").as_bytes().to_vec());
    assert!(matches!(
        sb.func(owner(), "init", params),
        Err(ContractError::InvalidParam { .. })
    ));
    assert!(sb.kv.0.is_empty());
}

#[test]
fn test_deploy_contract() {
    let mut sb = MockSandbox::initialized();
    let creator = agent("creator");

    let res = sb.func(creator, FUNC_DEPLOY_CONTRACT, deploy_params("inccounter1")).unwrap();
    assert_eq!(res.get_hname(PARAM_HNAME).unwrap(), Some(Hname::of("inccounter1")));

    let state = sb.root_state();
    assert_eq!(registry::contract_count(&state).unwrap(), 2);
    let rec = registry::find_contract(&state, Hname::of("inccounter1")).unwrap().unwrap();
    assert_eq!(rec.creator, creator);
    assert_eq!(rec.owner_fee, 0);
    assert_eq!(rec.description, "counter");

    // init runs with the remaining params
    let (target, ep, args) = &sb.calls[0];
    assert_eq!(*target, Hname::of("inccounter1"));
    assert_eq!(*ep, Hname::of("init"));
    assert_eq!(args.get_i64("counter").unwrap(), Some(42));
    assert!(!args.contains(PARAM_PROGRAM_HASH));
}

#[test]
fn test_deploy_name_collision_keeps_count() {
    let mut sb = MockSandbox::initialized();
    sb.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("inccounter1")).unwrap();
    let before = sb.kv.clone();

    assert_eq!(
        sb.func(agent("other"), FUNC_DEPLOY_CONTRACT, deploy_params("inccounter1")),
        Err(ContractError::NameCollision("inccounter1".to_string()))
    );
    assert_eq!(sb.kv, before);
    assert_eq!(registry::contract_count(&sb.root_state()).unwrap(), 2);
    assert_eq!(sb.calls.len(), 1);
}

#[test]
fn test_deploy_unknown_program() {
    let mut sb = MockSandbox::initialized();
    let before = sb.kv.clone();
    let params = deploy_params("x").with(PARAM_PROGRAM_HASH, HashValue([7; 32]).as_bytes().to_vec());

    assert_eq!(
        sb.func(owner(), FUNC_DEPLOY_CONTRACT, params),
        Err(ContractError::UnknownProgram(HashValue([7; 32])))
    );
    assert_eq!(sb.kv, before);
    assert!(sb.calls.is_empty());
}

#[test]
fn test_deploy_param_validation() {
    let mut sb = MockSandbox::initialized();
    let mut params = deploy_params("x");
    params.remove(PARAM_NAME);
    assert_eq!(
        sb.func(owner(), FUNC_DEPLOY_CONTRACT, params),
        Err(ContractError::MissingParam(PARAM_NAME.to_string()))
    );

    let params = deploy_params("x").with(PARAM_PROGRAM_HASH, vec![1, 2, 3]);
    assert!(matches!(
        sb.func(owner(), FUNC_DEPLOY_CONTRACT, params),
        Err(ContractError::InvalidParam { .. })
    ));

    let mut fresh = MockSandbox::new();
    assert_eq!(
        fresh.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("x")),
        Err(ContractError::NotInitialized)
    );
}

#[test]
fn test_find_contract_view() {
    let mut sb = MockSandbox::initialized();
    sb.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("inccounter1")).unwrap();

    let res = sb.view(FUNC_FIND_CONTRACT, hname_param("inccounter1")).unwrap();
    let rec = ContractRecord::from_bytes(res.get(PARAM_DATA).unwrap()).unwrap();
    assert_eq!(rec.name, "inccounter1");

    assert_eq!(
        sb.view(FUNC_FIND_CONTRACT, hname_param("nope")),
        Err(ContractError::ContractNotFound(Hname::of("nope")))
    );
}

#[test]
fn test_views_are_not_functions() {
    let mut sb = MockSandbox::initialized();
    assert_eq!(
        sb.func(owner(), FUNC_GET_CHAIN_INFO, Dict::new()),
        Err(ContractError::NotAFunction(Hname::of(FUNC_GET_CHAIN_INFO)))
    );
    assert_eq!(
        sb.func(owner(), "noSuchFunction", Dict::new()),
        Err(ContractError::EntryPointNotFound(Hname::of("noSuchFunction")))
    );
}

#[test]
fn test_two_phase_ownership() {
    let mut sb = MockSandbox::initialized();
    let next = agent("next");
    let intruder = agent("intruder");

    // claim before any delegation
    assert_eq!(sb.func(next, FUNC_CLAIM_CHAIN_OWNERSHIP, Dict::new()), Err(ContractError::Unauthorized));

    // only the owner can delegate
    let delegate = Dict::new().with(PARAM_CHAIN_OWNER, next.to_bytes().to_vec());
    assert_eq!(
        sb.func(intruder, FUNC_DELEGATE_CHAIN_OWNERSHIP, delegate.clone()),
        Err(ContractError::Unauthorized)
    );
    sb.func(owner(), FUNC_DELEGATE_CHAIN_OWNERSHIP, delegate).unwrap();

    let info = registry::get_chain_info(&sb.root_state()).unwrap();
    assert_eq!(info.owner, owner());
    assert_eq!(info.delegated_owner, Some(next));

    assert_eq!(sb.func(intruder, FUNC_CLAIM_CHAIN_OWNERSHIP, Dict::new()), Err(ContractError::Unauthorized));
    assert_eq!(sb.func(owner(), FUNC_CLAIM_CHAIN_OWNERSHIP, Dict::new()), Err(ContractError::Unauthorized));
    sb.func(next, FUNC_CLAIM_CHAIN_OWNERSHIP, Dict::new()).unwrap();

    let info = registry::get_chain_info(&sb.root_state()).unwrap();
    assert_eq!(info.owner, next);
    assert_eq!(info.delegated_owner, None);

    // the old owner lost its rights
    assert_eq!(
        sb.func(owner(), FUNC_SET_DEFAULT_FEE, fee_params(Some(1), None)),
        Err(ContractError::Unauthorized)
    );
}

#[test]
fn test_fee_settings() {
    let mut sb = MockSandbox::initialized();
    sb.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("inccounter1")).unwrap();

    sb.func(owner(), FUNC_SET_DEFAULT_FEE, fee_params(Some(10), Some(3))).unwrap();
    let res = sb.view(FUNC_GET_FEE_INFO, hname_param("inccounter1")).unwrap();
    assert_eq!(res.get_i64(PARAM_OWNER_FEE).unwrap(), Some(10));
    assert_eq!(res.get_i64(PARAM_VALIDATOR_FEE).unwrap(), Some(3));

    // override one field, the other keeps falling back
    let params = hname_param("inccounter1").with(PARAM_OWNER_FEE, codec::encode_i64(5));
    sb.func(owner(), FUNC_SET_CONTRACT_FEE, params).unwrap();
    let res = sb.view(FUNC_GET_FEE_INFO, hname_param("inccounter1")).unwrap();
    assert_eq!(res.get_i64(PARAM_OWNER_FEE).unwrap(), Some(5));
    assert_eq!(res.get_i64(PARAM_VALIDATOR_FEE).unwrap(), Some(3));

    // absent param leaves the default unchanged
    sb.func(owner(), FUNC_SET_DEFAULT_FEE, fee_params(None, Some(4))).unwrap();
    let info = registry::get_chain_info(&sb.root_state()).unwrap();
    assert_eq!((info.default_owner_fee, info.default_validator_fee), (10, 4));

    // a later default change reaches only the fields without an override
    sb.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("inccounter2")).unwrap();
    sb.func(owner(), FUNC_SET_DEFAULT_FEE, fee_params(Some(20), None)).unwrap();
    let res = sb.view(FUNC_GET_FEE_INFO, hname_param("inccounter1")).unwrap();
    assert_eq!(res.get_i64(PARAM_OWNER_FEE).unwrap(), Some(5));
    assert_eq!(res.get_i64(PARAM_VALIDATOR_FEE).unwrap(), Some(4));
    let res = sb.view(FUNC_GET_FEE_INFO, hname_param("inccounter2")).unwrap();
    assert_eq!(res.get_i64(PARAM_OWNER_FEE).unwrap(), Some(20));
    assert_eq!(res.get_i64(PARAM_VALIDATOR_FEE).unwrap(), Some(4));
}

#[test]
fn test_fee_validation() {
    let mut sb = MockSandbox::initialized();
    let before = sb.kv.clone();

    assert_eq!(
        sb.func(owner(), FUNC_SET_DEFAULT_FEE, fee_params(Some(1), Some(-2))),
        Err(ContractError::InvalidFee(-2))
    );
    assert_eq!(
        sb.func(agent("x"), FUNC_SET_DEFAULT_FEE, fee_params(Some(1), None)),
        Err(ContractError::Unauthorized)
    );
    let params = hname_param("missing").with(PARAM_OWNER_FEE, codec::encode_i64(1));
    assert_eq!(
        sb.func(owner(), FUNC_SET_CONTRACT_FEE, params),
        Err(ContractError::ContractNotFound(Hname::of("missing")))
    );
    assert_eq!(sb.kv, before);
}

#[test]
fn test_chain_info_view() {
    let mut sb = MockSandbox::initialized();
    sb.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("a")).unwrap();
    sb.func(owner(), FUNC_DEPLOY_CONTRACT, deploy_params("b")).unwrap();

    let res = sb.view(FUNC_GET_CHAIN_INFO, Dict::new()).unwrap();
    let info = crate::ChainInfo::from_dict(&res).unwrap();
    assert_eq!(info.contract_count, 3);
    assert_eq!(info.owner, owner());
}
