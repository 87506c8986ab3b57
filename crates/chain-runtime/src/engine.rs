//! Engine
//!
//! Wires intake, scheduler and executor around one chain state. A fresh
//! database gets the origin block and the genesis batch; an existing one
//! is loaded and checked against the configured chain id.

use chain_types::{
    codec, hash_data, kv::prefixed_key, AgentId, ChainId, ColoredBalances, ContractError,
    ContractStateView, Dict, HashValue, Hname, KvRead, Request, RequestId, FUNC_INIT,
};
use parking_lot::Mutex;
use root_contract::{constants::*, registry, ChainInfo, ContractRecord, FeeInfo};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::{sync::broadcast, task::JoinHandle};
use vstate::{Block, StateDb, VirtualState};

use crate::{
    accounts,
    clock::{Clock, SystemClock},
    config::EngineConfig,
    dispatcher::Dispatcher,
    error::RuntimeError,
    executor::{BatchExecutor, BatchUpdate},
    intake::{Backlog, RequestIntake},
    processors::ProcessorRegistry,
    scheduler::BatchScheduler,
};

/// Interval between checks in `wait_empty_backlog`
const WAIT_POLL: Duration = Duration::from_millis(50);

pub struct Engine {
    config: EngineConfig,
    clock: Arc<dyn Clock>,
    backlog: Arc<Backlog>,
    intake: Arc<RequestIntake>,
    executor: Arc<BatchExecutor>,
    in_flight: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        db: Arc<dyn StateDb>,
        processors: ProcessorRegistry,
    ) -> Result<Self, RuntimeError> {
        Self::with_clock(config, db, processors, Arc::new(SystemClock))
    }

    /// Engine with a custom time source for time-locked requests
    pub fn with_clock(
        config: EngineConfig,
        db: Arc<dyn StateDb>,
        processors: ProcessorRegistry,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, RuntimeError> {
        let (state, fresh) = match VirtualState::load(db.as_ref())? {
            Some(state) => {
                check_chain_id(&state, &config.chain_id)?;
                (state, false)
            }
            None => {
                let mut state = VirtualState::new();
                let origin = Block::origin(&config.chain_id);
                state.apply_block(&origin)?;
                state.commit(db.as_ref(), &origin)?;
                tracing::info!("Committed origin block of chain {}", config.chain_id);
                (state, true)
            }
        };

        let dispatcher = Arc::new(Dispatcher::new(config.chain_id, config.validator, processors));
        let backlog = Arc::new(Backlog::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let executor = Arc::new(BatchExecutor::new(
            dispatcher,
            db,
            state,
            backlog.clone(),
            in_flight.clone(),
            config.update_capacity,
            config.poll_interval(),
            config.verbose,
        ));
        let intake = Arc::new(RequestIntake::new(config.intake_capacity.max(1), backlog.clone()));

        let engine = Self {
            config,
            clock,
            backlog,
            intake,
            executor,
            in_flight,
            running: Arc::new(AtomicBool::new(false)),
            tasks: Mutex::new(Vec::new()),
        };

        let genesis = engine.genesis_requests();
        for req in &genesis {
            engine.intake.mark_seen(req.id);
        }
        if fresh {
            engine.run_genesis(genesis)?;
        } else {
            tracing::info!(
                "Resumed chain {} at block {:?}",
                engine.config.chain_id,
                engine.block_index()
            );
        }

        Ok(engine)
    }

    /// Root `init` followed by the deployment of the accounts contract,
    /// both sent by the chain owner
    fn genesis_requests(&self) -> Vec<Request> {
        let chain_id = self.config.chain_id;
        let tx_id = hash_data(&[b"genesis".as_slice(), chain_id.0.as_bytes().as_slice()]);
        let owner = self.config.chain_owner;

        let init = Request::new(RequestId::new(tx_id, 0), owner, root_contract::hname(), Hname::of(FUNC_INIT))
            .with_args(
                Dict::new()
                    .with(PARAM_CHAIN_ID, chain_id.0.as_bytes().to_vec())
                    .with(PARAM_DESCRIPTION, codec::encode_string(&self.config.description)),
            );

        let accounts_itf = accounts::interface();
        let deploy = Request::new(
            RequestId::new(tx_id, 1),
            owner,
            root_contract::hname(),
            Hname::of(FUNC_DEPLOY_CONTRACT),
        )
        .with_args(
            Dict::new()
                .with(PARAM_PROGRAM_HASH, accounts_itf.program_hash.as_bytes().to_vec())
                .with(PARAM_NAME, codec::encode_string(accounts::NAME))
                .with(PARAM_DESCRIPTION, codec::encode_string(&accounts_itf.description)),
        );

        vec![init, deploy]
    }

    fn run_genesis(&self, genesis: Vec<Request>) -> Result<(), RuntimeError> {
        let update = self.executor.execute(genesis)?;
        for result in &update.results {
            if let crate::RequestOutcome::RequestFailed(e) = &result.outcome {
                return Err(RuntimeError::Genesis(format!("request {}: {}", result.request_id, e)));
            }
        }
        tracing::info!(
            "Genesis of chain {} committed at block {} ({})",
            self.config.chain_id,
            update.block_index,
            update.state_hash
        );
        Ok(())
    }

    /// Spawn the intake thread and the scheduler and executor tasks.
    /// Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<(), RuntimeError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if let Err(e) = self.intake.start() {
            self.running.store(false, Ordering::SeqCst);
            return Err(e.into());
        }

        // one batch at a time between scheduler and executor
        let (batch_tx, batch_rx) = tokio::sync::mpsc::channel(1);
        let scheduler = BatchScheduler::new(
            self.backlog.clone(),
            self.clock.clone(),
            self.config.poll_interval(),
            self.config.max_batch_size,
            self.in_flight.clone(),
        );

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(scheduler.run(batch_tx, self.running.clone())));
        tasks.push(tokio::spawn(self.executor.clone().run(batch_rx)));

        tracing::info!("Engine started for chain {}", self.config.chain_id);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal every loop to stop; see `join`
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.intake.stop();
    }

    /// Stop and wait for all loops. Requests still in the backlog stay
    /// there; later posts are refused.
    pub async fn join(&self) {
        self.stop();

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::error!("Engine task failed: {}", e);
            }
        }

        let intake = self.intake.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || intake.join()).await {
            tracing::error!("Intake join failed: {}", e);
        }
        tracing::info!("Engine stopped at block {:?}", self.block_index());
    }

    /// Queue a request for execution
    pub fn post_request(&self, req: Request) -> Result<(), RuntimeError> {
        self.intake.post(req)
    }

    /// Requests waiting in the backlog, including accepted posts not yet moved there
    pub fn backlog_len(&self) -> usize {
        self.intake.backlog_len()
    }

    /// Wait until the backlog is empty and no batch is executing.
    ///
    /// Returns false if `timeout` passes first. Time-locked requests keep
    /// the backlog non-empty until they run.
    pub async fn wait_empty_backlog(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut polls: u64 = 0;

        loop {
            let backlog = self.backlog_len();
            let in_flight = self.in_flight.load(Ordering::SeqCst);
            if backlog == 0 && in_flight == 0 {
                return true;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                tracing::warn!(
                    "Backlog not empty after {:?}: {} waiting, {} in flight",
                    timeout.unwrap_or_default(),
                    backlog,
                    in_flight
                );
                return false;
            }

            polls += 1;
            if polls % 40 == 0 {
                tracing::debug!("Waiting for backlog: {} waiting, {} in flight", backlog, in_flight);
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }

    /// Execute a batch directly, bypassing intake and scheduler
    pub fn run_batch(&self, batch: Vec<Request>) -> Result<BatchUpdate, RuntimeError> {
        for req in &batch {
            self.intake.mark_seen(req.id);
        }
        self.executor.execute(batch)
    }

    /// Call a view entry point against the last committed state
    pub fn call_view(&self, target: Hname, entry_point: Hname, params: Dict) -> Result<Dict, ContractError> {
        let snapshot = self.executor.snapshot();
        self.executor
            .dispatcher()
            .call_view(snapshot.as_ref(), target, entry_point, params)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BatchUpdate> {
        self.executor.subscribe()
    }

    pub fn chain_id(&self) -> ChainId {
        self.config.chain_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn block_index(&self) -> Option<u32> {
        self.executor.snapshot().block_index()
    }

    pub fn state_hash(&self) -> HashValue {
        self.executor.snapshot().state_hash()
    }

    /// Raw committed value of a full state key
    pub fn get_state(&self, key: &[u8]) -> Option<Vec<u8>> {
        self.executor.snapshot().get(key)
    }

    pub fn chain_info(&self) -> Result<ChainInfo, ContractError> {
        let snapshot = self.executor.snapshot();
        registry::get_chain_info(&ContractStateView::new(snapshot.as_ref(), root_contract::hname()))
    }

    pub fn find_contract(&self, hname: Hname) -> Result<Option<ContractRecord>, ContractError> {
        let snapshot = self.executor.snapshot();
        registry::find_contract(&ContractStateView::new(snapshot.as_ref(), root_contract::hname()), hname)
    }

    pub fn fee_info(&self, hname: Hname) -> Result<FeeInfo, ContractError> {
        let snapshot = self.executor.snapshot();
        registry::get_fee_info(&ContractStateView::new(snapshot.as_ref(), root_contract::hname()), hname)
    }

    pub fn balance(&self, agent: &AgentId) -> Result<ColoredBalances, ContractError> {
        let snapshot = self.executor.snapshot();
        accounts::balance_of(&ContractStateView::new(snapshot.as_ref(), accounts::hname()), agent)
    }
}

/// A loaded database must belong to the configured chain
fn check_chain_id(state: &VirtualState, chain_id: &ChainId) -> Result<(), RuntimeError> {
    match state.get(&prefixed_key(Hname::NULL, vstate::VAR_CHAIN_ID)) {
        Some(stored) if stored[..] == chain_id.0.as_bytes()[..] => Ok(()),
        Some(_) => Err(RuntimeError::Genesis(format!(
            "database belongs to another chain than {}",
            chain_id
        ))),
        None => Err(RuntimeError::Genesis("database has no origin block".to_string())),
    }
}
