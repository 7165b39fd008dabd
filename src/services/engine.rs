//! Engine lifecycle: wiring, thread startup and cooperative shutdown.
//!
//! Thread layout: `scheduler`, `trigger-listener`, `dispatcher` and
//! `worker-0..N`, plus one thread per running event monitor. The
//! configuration mutex lives in [`EventRegistry`]; the worker scoreboard
//! mutex lives in [`WorkerPool`]. No code path holds both.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;

use crate::domain::errors::DomainError;
use crate::domain::models::{Config, EventKind, Location};
use crate::domain::ports::{ActionEngine, DefinitionStore, MonitorRuntime, TriggerFeed};
use crate::services::action_queue::ActionQueue;
use crate::services::dispatcher::Dispatcher;
use crate::services::management::EventManager;
use crate::services::monitor_host::MonitorHost;
use crate::services::registry::EventRegistry;
use crate::services::scheduler_loop::SchedulerLoop;
use crate::services::stats::{EngineCounters, EngineStats};
use crate::services::trigger_listener::TriggerListener;
use crate::services::worker_pool::WorkerPool;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to load event definitions: {0}")]
    Load(#[from] DomainError),
}

/// External collaborators the engine drives.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DefinitionStore>,
    pub actions: Arc<dyn ActionEngine>,
    pub feed: Arc<dyn TriggerFeed>,
    pub monitors: Arc<dyn MonitorRuntime>,
}

#[derive(Default)]
struct ThreadGroup {
    handles: Vec<(String, JoinHandle<()>)>,
}

impl ThreadGroup {
    fn spawn<F>(&mut self, name: impl Into<String>, body: F) -> Result<(), EngineError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = name.into();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(body)
            .map_err(|source| EngineError::Spawn {
                name: name.clone(),
                source,
            })?;
        self.handles.push((name, handle));
        Ok(())
    }

    /// Join every thread that exits before `deadline`. Returns the names of
    /// threads still running at the deadline; those are detached.
    fn join_until(self, deadline: Instant) -> Vec<String> {
        let mut pending = self.handles;
        loop {
            let (finished, running): (Vec<_>, Vec<_>) =
                pending.into_iter().partition(|(_, h)| h.is_finished());
            for (name, handle) in finished {
                if handle.join().is_err() {
                    tracing::error!(thread = %name, "engine thread panicked");
                }
            }
            pending = running;
            if pending.is_empty() || Instant::now() >= deadline {
                return pending.into_iter().map(|(name, _)| name).collect();
            }
            thread::sleep(Duration::from_millis(5));
        }
    }
}

pub struct Engine {
    manager: Arc<EventManager>,
    registry: Arc<EventRegistry>,
    queue: Arc<ActionQueue>,
    pool: Arc<WorkerPool>,
    monitors: Arc<MonitorHost>,
    counters: Arc<EngineCounters>,
    running: Arc<AtomicBool>,
    threads: Mutex<Option<ThreadGroup>>,
    shutdown_timeout: Duration,
}

impl Engine {
    /// Load every definition from the store and start all engine threads.
    pub fn start(config: &Config, collaborators: Collaborators) -> Result<Self, EngineError> {
        let engine_config = &config.engine;
        let shutdown_timeout = Duration::from_millis(engine_config.shutdown_timeout_ms);

        let registry = Arc::new(EventRegistry::new());
        let monitors = Arc::new(MonitorHost::new(collaborators.monitors.clone(), shutdown_timeout));
        let manager = Arc::new(EventManager::new(
            registry.clone(),
            collaborators.store.clone(),
            monitors.clone(),
            engine_config.root_scope.clone(),
        ));

        if let (Some(latitude), Some(longitude)) = (config.location.latitude, config.location.longitude) {
            registry.set_location(Location::new(latitude, longitude)?);
        }
        let serial = manager.load_all()?;

        let engine = Self {
            manager,
            registry: registry.clone(),
            queue: Arc::new(ActionQueue::new(engine_config.action_queue_capacity)),
            pool: Arc::new(WorkerPool::new(engine_config.worker_count, collaborators.actions.clone())),
            monitors,
            counters: Arc::new(EngineCounters::default()),
            running: Arc::new(AtomicBool::new(true)),
            threads: Mutex::new(None),
            shutdown_timeout,
        };

        let mut threads = ThreadGroup::default();
        if let Err(e) = engine.spawn_threads(&mut threads, config, &collaborators) {
            *engine.threads.lock() = Some(threads);
            engine.shutdown();
            return Err(e);
        }
        *engine.threads.lock() = Some(threads);

        tracing::info!(
            workers = engine.pool.size(),
            capacity = engine.queue.capacity(),
            scheduled = registry.paths(EventKind::Scheduled).len(),
            triggered = registry.paths(EventKind::Triggered).len(),
            monitors = engine.monitors.running().len(),
            serial,
            "engine started"
        );
        Ok(engine)
    }

    fn spawn_threads(
        &self,
        threads: &mut ThreadGroup,
        config: &Config,
        collaborators: &Collaborators,
    ) -> Result<(), EngineError> {
        let engine_config = &config.engine;

        for index in 0..self.pool.size() {
            let pool = self.pool.clone();
            threads.spawn(format!("worker-{index}"), move || pool.run_worker(index))?;
        }

        let dispatcher = Dispatcher::new(
            self.queue.clone(),
            self.pool.clone(),
            self.running.clone(),
            Duration::from_millis(engine_config.dispatcher_poll_ms),
        );
        threads.spawn("dispatcher", move || dispatcher.run())?;

        let listener = TriggerListener::new(
            self.registry.clone(),
            self.queue.clone(),
            self.counters.clone(),
            self.running.clone(),
            Duration::from_millis(engine_config.trigger_poll_ms),
            Duration::from_millis(engine_config.trigger_backpressure_ms),
        );
        let subscription = collaborators.feed.subscribe();
        threads.spawn("trigger-listener", move || listener.run(subscription))?;

        let scheduler = SchedulerLoop::new(
            self.registry.clone(),
            self.queue.clone(),
            collaborators.store.clone(),
            self.counters.clone(),
            self.running.clone(),
            Duration::from_millis(engine_config.scheduler_poll_ms),
        );
        threads.spawn("scheduler", move || scheduler.run())?;

        Ok(())
    }

    /// The configuration mutation API of this engine.
    pub fn manager(&self) -> &Arc<EventManager> {
        &self.manager
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop producers and the dispatcher, let workers finish their current
    /// action, stop monitors, and wait up to the configured timeout for
    /// every thread. Returns whether all threads exited in time. Calling
    /// it again is a no-op that returns `true`.
    pub fn shutdown(&self) -> bool {
        let Some(threads) = self.threads.lock().take() else {
            return true;
        };
        tracing::info!("engine shutting down");
        let deadline = Instant::now() + self.shutdown_timeout;

        self.running.store(false, Ordering::SeqCst);
        self.queue.close();
        self.registry.wake_scheduler();
        self.pool.shutdown();

        let monitors_stopped = self.monitors.stop_all(self.shutdown_timeout);
        let stuck = threads.join_until(deadline);

        if !stuck.is_empty() {
            tracing::warn!(threads = ?stuck, "engine threads did not exit before the shutdown timeout");
        }
        let clean = stuck.is_empty() && monitors_stopped;
        tracing::info!(clean, "engine stopped");
        clean
    }

    pub fn stats(&self) -> EngineStats {
        let pool = self.pool.snapshot();
        EngineStats {
            change_serial: self.registry.serial(),
            scheduled_events: self.registry.paths(EventKind::Scheduled).len(),
            triggered_events: self.registry.paths(EventKind::Triggered).len(),
            monitors_running: self.monitors.running().len(),
            queued: self.queue.len(),
            worker_queued: pool.queued,
            active_workers: pool.active,
            executing: pool.executing,
            peak_concurrency: pool.peak_concurrency,
            scheduled_fires: EngineCounters::get(&self.counters.scheduled_fires),
            trigger_matches: EngineCounters::get(&self.counters.trigger_matches),
            executed: pool.executed,
            failed: pool.failed,
            dropped: EngineCounters::get(&self.counters.dropped),
            lagged: EngineCounters::get(&self.counters.lagged),
        }
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if self.threads.get_mut().is_some() {
            self.shutdown();
        }
    }
}
