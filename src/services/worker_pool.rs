//! Fixed pool of worker threads executing actions.
//!
//! Every worker owns a private FIFO, an `active` flag and a control signal.
//! All of that lives on one scoreboard guarded by a single mutex shared by
//! the dispatcher and the workers (and nothing else). `active` is true iff
//! the worker's private queue is non-empty or it is executing; `path` names
//! the event the worker is currently serving so the dispatcher can route
//! further serialized items for that path to the same worker.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

use crate::domain::models::ActionQueueItem;
use crate::domain::ports::{ActionEngine, RuntimeContext};

#[derive(Debug, Default)]
struct WorkerSlot {
    queue: VecDeque<ActionQueueItem>,
    active: bool,
    executing: bool,
    path: Option<String>,
}

#[derive(Debug)]
struct Scoreboard {
    slots: Vec<WorkerSlot>,
    shutdown: bool,
}

impl Scoreboard {
    fn busy_with(&self, path: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.active && s.path.as_deref() == Some(path))
    }

    fn idle(&self) -> Option<usize> {
        self.slots.iter().position(|s| !s.active)
    }
}

/// Where the dispatcher put an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Handed to an idle worker, which was woken.
    Started(usize),
    /// Appended to the private queue of the worker already serving the
    /// same serialized path.
    Appended(usize),
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolSnapshot {
    pub workers: usize,
    pub active: usize,
    pub executing: usize,
    pub queued: usize,
    pub executed: u64,
    pub failed: u64,
    pub peak_concurrency: usize,
}

pub struct WorkerPool {
    board: Mutex<Scoreboard>,
    signals: Vec<Condvar>,
    worker_free: Condvar,
    engine: Arc<dyn ActionEngine>,
    executing_now: AtomicUsize,
    peak_concurrency: AtomicUsize,
    executed: AtomicU64,
    failed: AtomicU64,
}

impl WorkerPool {
    pub fn new(size: usize, engine: Arc<dyn ActionEngine>) -> Self {
        let size = size.max(1);
        Self {
            board: Mutex::new(Scoreboard {
                slots: (0..size).map(|_| WorkerSlot::default()).collect(),
                shutdown: false,
            }),
            signals: (0..size).map(|_| Condvar::new()).collect(),
            worker_free: Condvar::new(),
            engine,
            executing_now: AtomicUsize::new(0),
            peak_concurrency: AtomicUsize::new(0),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.signals.len()
    }

    /// Route one item to a worker.
    ///
    /// Serialized items whose path is already being served are appended to
    /// that worker's queue. Everything else goes to an idle worker; when
    /// none is idle this waits on the worker-free signal, re-checking every
    /// `poll`. The item is only handed back if the pool is shutting down.
    pub fn place(&self, item: ActionQueueItem, poll: Duration) -> Result<Placement, ActionQueueItem> {
        let mut board = self.board.lock();
        loop {
            if board.shutdown {
                return Err(item);
            }

            if item.is_serialized() {
                if let Some(index) = board.busy_with(&item.path) {
                    board.slots[index].queue.push_back(item);
                    return Ok(Placement::Appended(index));
                }
            }

            if let Some(index) = board.idle() {
                let slot = &mut board.slots[index];
                slot.active = true;
                slot.path = Some(item.path.clone());
                slot.queue.push_back(item);
                self.signals[index].notify_one();
                return Ok(Placement::Started(index));
            }

            let _ = self.worker_free.wait_for(&mut board, poll);
        }
    }

    /// Body of worker thread `index`. Returns once shutdown is requested
    /// and the current action, if any, has finished.
    pub fn run_worker(&self, index: usize) {
        tracing::debug!(worker = index, "worker started");
        loop {
            let item = {
                let mut board = self.board.lock();
                loop {
                    if board.shutdown {
                        let slot = &mut board.slots[index];
                        if !slot.queue.is_empty() {
                            tracing::warn!(
                                worker = index,
                                dropped = slot.queue.len(),
                                "worker stopping with queued actions"
                            );
                            slot.queue.clear();
                        }
                        slot.active = false;
                        slot.path = None;
                        tracing::debug!(worker = index, "worker stopped");
                        return;
                    }
                    if let Some(item) = board.slots[index].queue.pop_front() {
                        board.slots[index].executing = true;
                        break item;
                    }
                    self.signals[index].wait(&mut board);
                }
            };

            self.execute(index, &item);
            drop(item);

            let mut board = self.board.lock();
            let slot = &mut board.slots[index];
            slot.executing = false;
            if slot.queue.is_empty() {
                slot.active = false;
                slot.path = None;
                drop(board);
                self.worker_free.notify_all();
            }
        }
    }

    fn execute(&self, index: usize, item: &ActionQueueItem) {
        let context = RuntimeContext {
            path: item.path.clone(),
            kind: item.kind_str(),
            worker: index,
            trigger: item.trigger().cloned(),
        };

        let running = self.executing_now.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_concurrency.fetch_max(running, Ordering::SeqCst);
        let started = Instant::now();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.engine.execute(&item.action, &context)
        }));

        self.executing_now.fetch_sub(1, Ordering::SeqCst);
        let elapsed_ms = started.elapsed().as_millis();

        match outcome {
            Ok(Ok(())) => {
                self.executed.fetch_add(1, Ordering::Relaxed);
                if item.is_loggable() {
                    tracing::info!(worker = index, path = %item.path, kind = item.kind_str(), elapsed_ms, "action executed");
                } else {
                    tracing::debug!(worker = index, path = %item.path, kind = item.kind_str(), elapsed_ms, "action executed");
                }
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(worker = index, path = %item.path, error = %e, elapsed_ms, "action failed");
            }
            Err(payload) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| (*s).to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                tracing::error!(worker = index, path = %item.path, panic = %message, "action panicked");
            }
        }
    }

    /// Ask every worker to exit after its current action, and release a
    /// dispatcher waiting for a free worker.
    pub fn shutdown(&self) {
        self.board.lock().shutdown = true;
        for signal in &self.signals {
            signal.notify_all();
        }
        self.worker_free.notify_all();
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let board = self.board.lock();
        PoolSnapshot {
            workers: board.slots.len(),
            active: board.slots.iter().filter(|s| s.active).count(),
            executing: board.slots.iter().filter(|s| s.executing).count(),
            queued: board.slots.iter().map(|s| s.queue.len()).sum(),
            executed: self.executed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            peak_concurrency: self.peak_concurrency.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActionContent, TriggerNotification};
    use crate::domain::ports::ActionError;
    use std::sync::atomic::AtomicBool;

    fn serialized(path: &str) -> ActionQueueItem {
        let trigger = Arc::new(TriggerNotification::new("s", "k", serde_json::Value::Null));
        ActionQueueItem::triggered(path, ActionContent::new(path), trigger, true, false)
    }

    fn blocking_engine(gate: Arc<AtomicBool>) -> Arc<dyn ActionEngine> {
        Arc::new(move |_: &ActionContent, _: &RuntimeContext| -> Result<(), ActionError> {
            while !gate.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        })
    }

    #[test]
    fn test_serialized_item_joins_busy_worker() {
        let pool = WorkerPool::new(4, blocking_engine(Arc::new(AtomicBool::new(false))));
        let first = pool.place(serialized("/User/Foo"), Duration::from_millis(10)).unwrap();
        let second = pool.place(serialized("/User/Foo"), Duration::from_millis(10)).unwrap();
        let other = pool.place(serialized("/User/Bar"), Duration::from_millis(10)).unwrap();

        let Placement::Started(index) = first else {
            panic!("first item should start a worker");
        };
        assert_eq!(second, Placement::Appended(index));
        assert!(matches!(other, Placement::Started(i) if i != index));
        let snap = pool.snapshot();
        assert_eq!(snap.active, 2);
        assert_eq!(snap.queued, 3);
    }

    #[test]
    fn test_place_returns_item_on_shutdown() {
        let pool = WorkerPool::new(1, blocking_engine(Arc::new(AtomicBool::new(false))));
        pool.place(serialized("/a"), Duration::from_millis(5)).unwrap();
        pool.shutdown();
        let back = pool.place(serialized("/b"), Duration::from_millis(5)).unwrap_err();
        assert_eq!(back.path, "/b");
    }

    #[test]
    fn test_worker_survives_failures_and_panics() {
        let engine: Arc<dyn ActionEngine> = Arc::new(
            |action: &ActionContent, _: &RuntimeContext| -> Result<(), ActionError> {
                match action.as_str() {
                    "fail" => Err(ActionError::new("boom")),
                    "panic" => panic!("action panicked"),
                    _ => Ok(()),
                }
            },
        );
        let pool = Arc::new(WorkerPool::new(1, engine));
        let worker = {
            let pool = pool.clone();
            std::thread::spawn(move || pool.run_worker(0))
        };

        for action in ["fail", "panic", "ok"] {
            let item = ActionQueueItem::scheduled("/x", ActionContent::new(action), chrono::Utc::now());
            pool.place(item, Duration::from_millis(50)).unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.snapshot().executed + pool.snapshot().failed < 3 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        let snap = pool.snapshot();
        assert_eq!(snap.failed, 2);
        assert_eq!(snap.executed, 1);
        assert_eq!(snap.active, 0);

        pool.shutdown();
        worker.join().unwrap();
    }
}
