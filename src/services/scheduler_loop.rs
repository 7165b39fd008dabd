//! Scheduler loop: turns due scheduled events into action queue items.
//!
//! Runs on its own thread. The configuration mutex is held only while the
//! due batch is taken from the time view; pushing to the action queue and
//! deleting fired one-shots from the definition store happen outside it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::domain::ports::DefinitionStore;
use crate::services::action_queue::{ActionQueue, QueueError};
use crate::services::registry::EventRegistry;
use crate::services::schedule_store::DueFire;
use crate::services::stats::EngineCounters;

pub struct SchedulerLoop {
    registry: Arc<EventRegistry>,
    queue: Arc<ActionQueue>,
    store: Arc<dyn DefinitionStore>,
    counters: Arc<EngineCounters>,
    running: Arc<AtomicBool>,
    poll: Duration,
}

impl SchedulerLoop {
    pub fn new(
        registry: Arc<EventRegistry>,
        queue: Arc<ActionQueue>,
        store: Arc<dyn DefinitionStore>,
        counters: Arc<EngineCounters>,
        running: Arc<AtomicBool>,
        poll: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            store,
            counters,
            running,
            poll,
        }
    }

    pub fn run(&self) {
        tracing::info!(poll_ms = self.poll.as_millis() as u64, "scheduler loop started");
        let mut last_retry = Instant::now();

        while self.running.load(Ordering::SeqCst) {
            for fire in self.registry.take_due_or_wait(self.poll) {
                self.enqueue(fire);
            }

            if last_retry.elapsed() >= self.poll {
                let ready = self.registry.retry_unscheduled();
                if ready > 0 {
                    tracing::info!(count = ready, "unscheduled events now have a fire time");
                }
                last_retry = Instant::now();
            }
        }

        tracing::info!("scheduler loop stopped");
    }

    fn enqueue(&self, fire: DueFire) {
        let DueFire { item, finished } = fire;
        let path = item.path.clone();

        // A dropped fire still counts as this period's fire; a closed queue
        // means the engine is stopping and the fire never happened.
        let consumed = match self.queue.push(item) {
            Ok(()) => {
                EngineCounters::incr(&self.counters.scheduled_fires);
                tracing::debug!(path = %path, "scheduled event queued");
                true
            }
            Err(QueueError::Full { capacity, .. }) => {
                EngineCounters::incr(&self.counters.dropped);
                tracing::warn!(path = %path, capacity, "action queue full, scheduled fire dropped");
                true
            }
            Err(QueueError::Closed) => {
                tracing::debug!(path = %path, "action queue closed, scheduled fire discarded");
                false
            }
        };

        if !finished {
            return;
        }
        if consumed {
            if let Err(e) = self.store.delete(&path) {
                tracing::warn!(path = %path, error = %e, "failed to delete fired one-shot definition");
            }
        } else {
            tracing::info!(path = %path, "one-shot discarded at shutdown, definition kept in store");
        }
    }
}
