//! Batch Scheduler
//!
//! Polls the backlog on a fixed interval and hands ready requests to
//! the executor. The clock is sampled once per poll; time-locked
//! requests stay in the backlog until a later poll finds them ready.

use chain_types::Request;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};

use crate::{clock::Clock, intake::Backlog};

pub struct BatchScheduler {
    backlog: Arc<Backlog>,
    clock: Arc<dyn Clock>,
    poll_interval: Duration,
    max_batch_size: usize,
    /// Batches taken from the backlog and not finished yet
    in_flight: Arc<AtomicUsize>,
}

impl BatchScheduler {
    pub fn new(
        backlog: Arc<Backlog>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        max_batch_size: usize,
        in_flight: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            backlog,
            clock,
            poll_interval,
            max_batch_size: max_batch_size.max(1),
            in_flight,
        }
    }

    /// Take the next batch: ready requests in backlog order, capped at
    /// the batch size. A non-empty batch counts as in flight until the
    /// executor is done with it.
    pub fn next_batch(&self) -> Vec<Request> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        let now = self.clock.now();
        let batch = self.backlog.take_ready(now, self.max_batch_size);

        if batch.is_empty() {
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
        } else {
            tracing::debug!(
                "Collated batch of {} requests at {} ({} left in backlog)",
                batch.len(),
                now,
                self.backlog.len()
            );
        }
        batch
    }

    /// Run the poll loop until `running` clears or the executor goes away
    pub async fn run(self, batches: mpsc::Sender<Vec<Request>>, running: Arc<AtomicBool>) {
        let mut interval = time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Batch scheduler started ({}ms poll, max {} requests)",
            self.poll_interval.as_millis(),
            self.max_batch_size
        );

        while running.load(Ordering::SeqCst) {
            interval.tick().await;
            if !running.load(Ordering::SeqCst) {
                break;
            }

            let batch = self.next_batch();
            if batch.is_empty() {
                continue;
            }
            if let Err(mpsc::error::SendError(batch)) = batches.send(batch).await {
                tracing::warn!("Executor gone, returning {} requests to the backlog", batch.len());
                self.backlog.requeue_front(batch);
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
                break;
            }
        }

        tracing::info!("Batch scheduler stopped");
    }
}
