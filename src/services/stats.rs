//! Engine-wide counters and the stats snapshot.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters bumped by the producer threads.
#[derive(Debug, Default)]
pub struct EngineCounters {
    pub scheduled_fires: AtomicU64,
    pub trigger_matches: AtomicU64,
    /// Items a producer gave up on because the action queue stayed full.
    pub dropped: AtomicU64,
    /// Notifications lost because the trigger listener fell behind the feed.
    pub lagged: AtomicU64,
}

impl EngineCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::Relaxed)
    }
}

/// Point-in-time view of a running engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub change_serial: u64,
    pub scheduled_events: usize,
    pub triggered_events: usize,
    pub monitors_running: usize,
    /// Items waiting in the action queue.
    pub queued: usize,
    /// Items waiting in worker private queues.
    pub worker_queued: usize,
    pub active_workers: usize,
    pub executing: usize,
    pub peak_concurrency: usize,
    pub scheduled_fires: u64,
    pub trigger_matches: u64,
    pub executed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub lagged: u64,
}
