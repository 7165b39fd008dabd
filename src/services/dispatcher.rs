//! Dispatcher: moves items from the action queue onto workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::ActionSource;
use crate::services::action_queue::ActionQueue;
use crate::services::worker_pool::{Placement, WorkerPool};

pub struct Dispatcher {
    queue: Arc<ActionQueue>,
    pool: Arc<WorkerPool>,
    running: Arc<AtomicBool>,
    poll: Duration,
}

impl Dispatcher {
    pub fn new(queue: Arc<ActionQueue>, pool: Arc<WorkerPool>, running: Arc<AtomicBool>, poll: Duration) -> Self {
        Self {
            queue,
            pool,
            running,
            poll,
        }
    }

    pub fn run(&self) {
        tracing::info!(workers = self.pool.size(), "dispatcher started");

        while self.running.load(Ordering::SeqCst) {
            let Some(item) = self.queue.pop_timeout(self.poll) else {
                if self.queue.is_closed() && self.queue.is_empty() {
                    break;
                }
                continue;
            };

            let path = item.path.clone();
            let due_at = match &item.source {
                ActionSource::Scheduled { due_at } => Some(*due_at),
                ActionSource::Triggered { .. } => None,
            };

            match self.pool.place(item, self.poll) {
                Ok(Placement::Started(worker)) => {
                    tracing::trace!(path = %path, worker, ?due_at, "dispatched to idle worker");
                }
                Ok(Placement::Appended(worker)) => {
                    tracing::debug!(path = %path, worker, "serialized event queued behind running instance");
                }
                Err(_) => {
                    tracing::warn!(path = %path, "worker pool stopping, action discarded");
                    break;
                }
            }
        }

        let mut leftover = 0usize;
        while self.queue.pop_timeout(Duration::ZERO).is_some() {
            leftover += 1;
        }
        if leftover > 0 {
            tracing::warn!(dropped = leftover, "dispatcher stopped with queued actions");
        }
        tracing::info!("dispatcher stopped");
    }
}
