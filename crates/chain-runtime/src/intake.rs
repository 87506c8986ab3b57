//! Request Intake
//!
//! Producers post requests into a bounded crossbeam channel; a dedicated
//! thread drains it into the ordered backlog. Posting never waits for
//! execution.

use chain_types::{Request, RequestId};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use dashmap::DashSet;
use parking_lot::{Condvar, Mutex};
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread::JoinHandle,
    time::Duration,
};

use crate::error::RuntimeError;

/// How long the intake thread blocks before re-checking the running flag
const RECV_TIMEOUT: Duration = Duration::from_millis(50);

/// Ordered queue of requests waiting for a batch
#[derive(Default)]
pub struct Backlog {
    queue: Mutex<VecDeque<Request>>,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, req: Request) {
        self.queue.lock().push_back(req);
    }

    /// Put requests back at the front, keeping their order
    pub fn requeue_front(&self, reqs: Vec<Request>) {
        let mut queue = self.queue.lock();
        for req in reqs.into_iter().rev() {
            queue.push_front(req);
        }
    }

    /// Remove up to `max` requests whose time lock expired at `now`.
    ///
    /// Locked requests and the overflow stay in the backlog, in order.
    pub fn take_ready(&self, now: i64, max: usize) -> Vec<Request> {
        let mut queue = self.queue.lock();
        let mut ready = Vec::new();
        let mut kept = VecDeque::with_capacity(queue.len());

        for req in queue.drain(..) {
            if ready.len() < max && req.is_ready(now) {
                ready.push(req);
            } else {
                kept.push_back(req);
            }
        }
        *queue = kept;
        ready
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

/// Requests posted but not yet in the backlog
#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    drained: Condvar,
}

impl InFlight {
    fn add(&self) {
        *self.count.lock() += 1;
    }

    fn done(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.drained.notify_all();
        }
    }

    fn wait_drained(&self, timeout: Duration) -> bool {
        let mut count = self.count.lock();
        while *count > 0 {
            if self.drained.wait_for(&mut count, timeout).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

/// Multi-producer front door of the engine
pub struct RequestIntake {
    sender: Sender<Request>,
    receiver: Receiver<Request>,
    backlog: Arc<Backlog>,
    /// Ids ever accepted; ids are never reused
    seen: Arc<DashSet<RequestId>>,
    posted: Arc<InFlight>,
    running: Arc<AtomicBool>,
    /// Set once joined; later posts are refused
    closed: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl RequestIntake {
    pub fn new(capacity: usize, backlog: Arc<Backlog>) -> Self {
        let (sender, receiver) = bounded(capacity);
        Self {
            sender,
            receiver,
            backlog,
            seen: Arc::new(DashSet::new()),
            posted: Arc::new(InFlight::default()),
            running: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            handle: Mutex::new(None),
        }
    }

    /// Accept a request. Rejects ids seen before.
    ///
    /// Blocks only while the channel is full.
    pub fn post(&self, req: Request) -> Result<(), RuntimeError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RuntimeError::IntakeClosed);
        }
        let id = req.id;
        if !self.seen.insert(id) {
            return Err(RuntimeError::DuplicateRequest(id));
        }

        self.posted.add();
        let sent = match self.sender.try_send(req) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(req)) => {
                if !self.is_running() {
                    // nobody else drains before start
                    self.drain_now();
                }
                self.sender.send(req).map_err(|_| ())
            }
            Err(TrySendError::Disconnected(_)) => Err(()),
        };
        if sent.is_err() {
            self.posted.done();
            self.seen.remove(&id);
            return Err(RuntimeError::IntakeClosed);
        }

        tracing::trace!("Request {} posted", id);
        Ok(())
    }

    /// Record ids of requests that entered the chain another way (genesis)
    pub fn mark_seen(&self, id: RequestId) {
        self.seen.insert(id);
    }

    /// Backlog length once every accepted post has been queued
    pub fn backlog_len(&self) -> usize {
        if self.is_running() {
            if !self.posted.wait_drained(Duration::from_secs(1)) {
                tracing::warn!("Intake still draining after 1s");
            }
        } else {
            self.drain_now();
        }
        self.backlog.len()
    }

    /// Move everything in the channel to the backlog on the caller's thread
    fn drain_now(&self) {
        while let Ok(req) = self.receiver.try_recv() {
            self.backlog.push(req);
            self.posted.done();
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the intake thread
    pub fn start(&self) -> std::io::Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let receiver = self.receiver.clone();
        let backlog = self.backlog.clone();
        let posted = self.posted.clone();
        let running = self.running.clone();

        let handle = std::thread::Builder::new()
            .name("request-intake".to_string())
            .spawn(move || {
                tracing::info!("Request intake started");
                while running.load(Ordering::SeqCst) {
                    match receiver.recv_timeout(RECV_TIMEOUT) {
                        Ok(req) => {
                            backlog.push(req);
                            posted.done();
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                tracing::info!("Request intake stopped");
            })?;

        *self.handle.lock() = Some(handle);
        Ok(())
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the intake thread; leftovers are moved to the backlog
    pub fn join(&self) {
        self.stop();
        self.closed.store(true, Ordering::SeqCst);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("Request intake thread panicked");
            }
        }
        self.drain_now();
    }
}
