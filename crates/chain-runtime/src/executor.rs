//! Batch Executor
//!
//! The single writer of chain state. Each batch is dispatched request by
//! request over the current snapshot, collected into one block, applied
//! to a copy of the snapshot and committed. The snapshot is only
//! replaced once the commit succeeded; a failed batch goes back to the
//! front of the backlog.

use chain_types::{BufferedKv, HashValue, Request};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::{broadcast, mpsc};
use vstate::{Block, StateDb, VirtualState};

use crate::{
    dispatcher::{Dispatcher, RequestResult},
    error::RuntimeError,
    intake::Backlog,
};

/// Lifecycle of one batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum BatchState {
    Pending,
    Dispatching,
    Committing,
    Done,
    Failed,
}

/// Batch result sent to subscribers
#[derive(Clone, Debug)]
pub struct BatchUpdate {
    /// Index of the block built from the batch
    pub block_index: u32,
    /// State hash after the batch (unchanged if it failed)
    pub state_hash: HashValue,
    /// `Done` or `Failed`
    pub state: BatchState,
    /// One result per request, in batch order
    pub results: Vec<RequestResult>,
    /// Mutations in the block
    pub mutation_count: usize,
    /// Batch execution time in microseconds
    pub processing_time_us: u64,
    /// Commit error of a failed batch
    pub error: Option<String>,
}

impl BatchUpdate {
    pub fn is_done(&self) -> bool {
        self.state == BatchState::Done
    }
}

pub struct BatchExecutor {
    dispatcher: Arc<Dispatcher>,
    db: Arc<dyn StateDb>,
    /// Last committed state; readers clone the Arc
    snapshot: RwLock<Arc<VirtualState>>,
    /// Held for the whole of a batch
    writer: Mutex<()>,
    backlog: Arc<Backlog>,
    in_flight: Arc<AtomicUsize>,
    update_sender: broadcast::Sender<BatchUpdate>,
    /// Batches slower than this are logged
    slow_batch: Duration,
    verbose: bool,
}

impl BatchExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        db: Arc<dyn StateDb>,
        state: VirtualState,
        backlog: Arc<Backlog>,
        in_flight: Arc<AtomicUsize>,
        update_capacity: usize,
        slow_batch: Duration,
        verbose: bool,
    ) -> Self {
        let (update_sender, _) = broadcast::channel(update_capacity.max(1));
        Self {
            dispatcher,
            db,
            snapshot: RwLock::new(Arc::new(state)),
            writer: Mutex::new(()),
            backlog,
            in_flight,
            update_sender,
            slow_batch,
            verbose,
        }
    }

    /// Last committed state
    pub fn snapshot(&self) -> Arc<VirtualState> {
        self.snapshot.read().clone()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Subscribe to batch updates
    pub fn subscribe(&self) -> broadcast::Receiver<BatchUpdate> {
        self.update_sender.subscribe()
    }

    fn transition(&self, block_index: u32, state: &mut BatchState, next: BatchState) {
        tracing::trace!("Batch for block {}: {:?} -> {:?}", block_index, state, next);
        *state = next;
    }

    /// Execute a batch and commit it as the next block.
    ///
    /// Request failures are part of a successful batch. An error means
    /// the block could not be committed: the batch is back in the backlog
    /// and the snapshot is unchanged (or resynced from the database if
    /// another writer got there first).
    pub fn execute(&self, batch: Vec<Request>) -> Result<BatchUpdate, RuntimeError> {
        let started = Instant::now();
        let _writer = self.writer.lock();

        let base = self.snapshot();
        let block_index = base.next_block_index();
        let mut state = BatchState::Pending;

        self.transition(block_index, &mut state, BatchState::Dispatching);
        let mut pending = BufferedKv::new(base.as_ref());
        let mut results = Vec::with_capacity(batch.len());
        for req in &batch {
            let mut overlay = BufferedKv::new(&pending);
            let outcome = self.dispatcher.dispatch(&mut overlay, req);
            let mutations = overlay.into_mutations();
            pending.append(mutations);
            results.push(RequestResult {
                request_id: req.id,
                outcome,
            });
        }

        self.transition(block_index, &mut state, BatchState::Committing);
        let block = Block::new(block_index, pending.into_mutations());
        let mutation_count = block.mutations.len();
        let mut next = VirtualState::clone(&base);
        let committed = match next.apply_block(&block) {
            Ok(_) => next.commit(self.db.as_ref(), &block),
            Err(e) => Err(e),
        };

        let (update, result) = match committed {
            Ok(()) => {
                let state_hash = next.state_hash();
                *self.snapshot.write() = Arc::new(next);
                self.transition(block_index, &mut state, BatchState::Done);

                let update = BatchUpdate {
                    block_index,
                    state_hash,
                    state,
                    results,
                    mutation_count,
                    processing_time_us: started.elapsed().as_micros() as u64,
                    error: None,
                };
                (update.clone(), Ok(update))
            }
            Err(e) => {
                tracing::error!("Commit of block {} failed: {}", block_index, e);
                self.transition(block_index, &mut state, BatchState::Failed);
                if e.is_stale() {
                    self.resync();
                }
                self.backlog.requeue_front(batch);

                let update = BatchUpdate {
                    block_index,
                    state_hash: base.state_hash(),
                    state,
                    results,
                    mutation_count,
                    processing_time_us: started.elapsed().as_micros() as u64,
                    error: Some(e.to_string()),
                };
                (update, Err(RuntimeError::State(e)))
            }
        };

        self.report(&update);
        let _ = self.update_sender.send(update);
        result
    }

    fn report(&self, update: &BatchUpdate) {
        let failed = update.results.iter().filter(|r| !r.outcome.is_success()).count();
        if self.verbose {
            tracing::info!(
                "Block {}: {} requests ({} failed), {} mutations, {:?}",
                update.block_index,
                update.results.len(),
                failed,
                update.mutation_count,
                update.state
            );
        } else {
            tracing::debug!(
                "Block {}: {} requests ({} failed), {:?}",
                update.block_index,
                update.results.len(),
                failed,
                update.state
            );
        }

        let elapsed = Duration::from_micros(update.processing_time_us);
        if elapsed > self.slow_batch {
            tracing::warn!(
                "Block {} took {:.2}ms (poll interval: {}ms)",
                update.block_index,
                elapsed.as_secs_f64() * 1000.0,
                self.slow_batch.as_millis()
            );
        }
    }

    /// Reload the snapshot from the database after losing a commit race
    fn resync(&self) {
        match VirtualState::load(self.db.as_ref()) {
            Ok(Some(state)) => {
                tracing::warn!("Resynced state to committed block {:?}", state.block_index());
                *self.snapshot.write() = Arc::new(state);
            }
            Ok(None) => tracing::error!("Resync found an empty database"),
            Err(e) => tracing::error!("Resync failed: {}", e),
        }
    }

    /// Execute batches from the scheduler until its channel closes
    pub async fn run(self: Arc<Self>, mut batches: mpsc::Receiver<Vec<Request>>) {
        tracing::info!("Batch executor started");

        while let Some(batch) = batches.recv().await {
            let retry = batch.clone();
            let executor = self.clone();
            let outcome = tokio::task::spawn_blocking(move || executor.execute(batch)).await;

            match outcome {
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::warn!("Batch requeued: {}", e),
                Err(e) => {
                    // nothing was committed; the snapshot is still the last block
                    tracing::error!("Batch execution panicked, requeueing {} requests: {}", retry.len(), e);
                    self.backlog.requeue_front(retry);
                }
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        tracing::info!("Batch executor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dispatcher::RequestOutcome, processors::ProcessorRegistry};
    use chain_types::{hash_strings, Address, AgentId, ChainId, Dict, Hname, RequestId};
    use vstate::MemoryDb;

    fn executor() -> (Arc<BatchExecutor>, Arc<MemoryDb>, Arc<Backlog>) {
        let chain_id = ChainId(Address::from_seed("chain"));
        let db = Arc::new(MemoryDb::new());
        let mut state = VirtualState::new();
        let origin = Block::origin(&chain_id);
        state.apply_block(&origin).unwrap();
        state.commit(db.as_ref(), &origin).unwrap();

        let dispatcher = Arc::new(Dispatcher::new(
            chain_id,
            AgentId::Address(Address::from_seed("validator")),
            ProcessorRegistry::new(),
        ));
        let backlog = Arc::new(Backlog::new());
        let executor = BatchExecutor::new(
            dispatcher,
            db.clone(),
            state,
            backlog.clone(),
            Arc::new(AtomicUsize::new(0)),
            8,
            Duration::from_secs(1),
            false,
        );
        (Arc::new(executor), db, backlog)
    }

    fn request(n: u16, target: &str, ep: &str) -> Request {
        Request::new(
            RequestId::new(hash_strings(&["exec"]), n),
            AgentId::Address(Address::from_seed("owner")),
            Hname::of(target),
            Hname::of(ep),
        )
    }

    #[test]
    fn test_failed_requests_still_commit() {
        let (executor, db, _) = executor();
        let mut updates = executor.subscribe();

        let update = executor
            .execute(vec![request(0, "root", "init"), request(1, "nobody", "x")])
            .unwrap();
        assert!(update.is_done());
        assert_eq!(update.block_index, 1);
        assert!(update.results[0].outcome.is_success());
        assert_eq!(
            update.results[1].outcome,
            RequestOutcome::RequestFailed(chain_types::ContractError::ContractNotFound(Hname::of("nobody")))
        );

        assert_eq!(db.latest().unwrap(), Some((1, update.state_hash)));
        assert_eq!(executor.snapshot().state_hash(), update.state_hash);
        assert_eq!(updates.try_recv().unwrap().block_index, 1);
    }

    #[test]
    fn test_stale_commit_requeues_and_resyncs() {
        let (executor, db, backlog) = executor();
        let before = executor.snapshot();

        // another writer commits block 1 behind the executor's back
        let mut other = VirtualState::clone(&before);
        let mut muts = chain_types::MutationSet::new();
        muts.set(b"other", vec![1]);
        let block = Block::new(1, muts);
        other.apply_block(&block).unwrap();
        other.commit(db.as_ref(), &block).unwrap();

        let err = executor.execute(vec![request(0, "root", "init")]).unwrap_err();
        assert!(matches!(err, RuntimeError::State(ref e) if e.is_stale()));
        assert_eq!(backlog.len(), 1);
        assert_eq!(executor.snapshot().block_index(), Some(1));
        assert_eq!(executor.snapshot().state_hash(), other.state_hash());

        let retry = backlog.take_ready(0, 10);
        let update = executor.execute(retry).unwrap();
        assert_eq!(update.block_index, 2);
        assert!(update.results[0].outcome.is_success());
    }

    #[test]
    fn test_view_reads_committed_snapshot() {
        let (executor, _, _) = executor();
        executor.execute(vec![request(0, "root", "init")]).unwrap();

        let snapshot = executor.snapshot();
        let info = executor
            .dispatcher()
            .call_view(
                snapshot.as_ref(),
                root_contract::hname(),
                Hname::of(root_contract::constants::FUNC_GET_CHAIN_INFO),
                Dict::new(),
            )
            .unwrap();
        assert!(info.contains(root_contract::constants::PARAM_CHAIN_ID));
    }
}
