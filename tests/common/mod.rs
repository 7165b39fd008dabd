//! Common test utilities for integration tests
//!
//! Provides shared fixtures, a recording action engine, and definition
//! builders used across multiple integration test files.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use eventcore::adapters::{LoggingMonitorRuntime, MemoryDefinitionStore, TriggerBus};
use eventcore::domain::models::{ActionContent, Config, EventKind};
use eventcore::domain::ports::{ActionEngine, ActionError, DefinitionStore, RuntimeContext};
use eventcore::services::{Collaborators, Engine};
use parking_lot::Mutex;
use tempfile::TempDir;

/// Create a temporary directory for test isolation
pub fn temp_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

/// Setup test logging
///
/// Call this at the beginning of tests that need log output.
pub fn setup_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}

/// Poll `predicate` every 5ms until it holds or `timeout` elapses.
pub fn wait_for<F>(mut predicate: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Engine configuration with short poll intervals for tests.
pub fn test_config(workers: usize) -> Config {
    let mut config = Config::default();
    config.engine.worker_count = workers;
    config.engine.scheduler_poll_ms = 20;
    config.engine.dispatcher_poll_ms = 20;
    config.engine.trigger_poll_ms = 20;
    config.engine.trigger_backpressure_ms = 50;
    config.engine.shutdown_timeout_ms = 3000;
    config
}

/// One completed action execution.
#[derive(Debug, Clone)]
pub struct Execution {
    pub path: String,
    pub action: String,
    pub worker: usize,
    pub trigger_source: Option<String>,
    pub started: Instant,
    pub finished: Instant,
}

#[derive(Default)]
struct RecorderState {
    executions: Vec<Execution>,
    running: usize,
    max_running: usize,
}

/// Action engine that records every execution. Actions of the form
/// `work:<ms>` sleep that long; `fail` returns an error; `panic` panics.
#[derive(Clone, Default)]
pub struct RecordingEngine {
    state: Arc<Mutex<RecorderState>>,
}

impl RecordingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.state.lock().executions.clone()
    }

    pub fn executions_for(&self, path: &str) -> Vec<Execution> {
        self.executions().into_iter().filter(|e| e.path == path).collect()
    }

    pub fn count(&self) -> usize {
        self.state.lock().executions.len()
    }

    pub fn max_running(&self) -> usize {
        self.state.lock().max_running
    }

    pub fn running(&self) -> usize {
        self.state.lock().running
    }
}

impl ActionEngine for RecordingEngine {
    fn execute(&self, action: &ActionContent, context: &RuntimeContext) -> Result<(), ActionError> {
        let started = Instant::now();
        {
            let mut state = self.state.lock();
            state.running += 1;
            state.max_running = state.max_running.max(state.running);
        }

        let text = action.as_str();
        if let Some(ms) = text.strip_prefix("work:").and_then(|ms| ms.parse().ok()) {
            std::thread::sleep(Duration::from_millis(ms));
        }

        let mut state = self.state.lock();
        state.running -= 1;
        state.executions.push(Execution {
            path: context.path.clone(),
            action: text.to_string(),
            worker: context.worker,
            trigger_source: context.trigger.as_ref().map(|t| t.source.clone()),
            started,
            finished: Instant::now(),
        });
        drop(state);

        match text {
            "fail" => Err(ActionError::new("requested failure")),
            "panic" => panic!("requested panic"),
            _ => Ok(()),
        }
    }
}

/// Everything a test needs to drive a running engine.
pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryDefinitionStore>,
    pub bus: Arc<TriggerBus>,
    pub actions: RecordingEngine,
}

/// Start an engine over a pre-populated in-memory store.
pub fn start_engine(config: &Config, store: Arc<MemoryDefinitionStore>) -> Harness {
    let bus = Arc::new(TriggerBus::default());
    let actions = RecordingEngine::new();
    let engine = Engine::start(
        config,
        Collaborators {
            store: store.clone(),
            actions: Arc::new(actions.clone()),
            feed: bus.clone(),
            monitors: Arc::new(LoggingMonitorRuntime),
        },
    )
    .expect("engine should start");
    Harness {
        engine,
        store,
        bus,
        actions,
    }
}

pub fn interval_body(every_ms: u64, action: &str) -> String {
    serde_json::json!({
        "kind": "scheduled",
        "schedule": {"type": "interval", "every_ms": every_ms},
        "action": action,
    })
    .to_string()
}

pub fn once_body(at: chrono::DateTime<chrono::Utc>, action: &str) -> String {
    serde_json::json!({
        "kind": "scheduled",
        "schedule": {"type": "once", "at": at},
        "action": action,
    })
    .to_string()
}

pub fn sun_body(event: &str, offset_minutes: i32, action: &str) -> String {
    serde_json::json!({
        "kind": "scheduled",
        "schedule": {"type": "sun", "event": event, "offset_minutes": offset_minutes},
        "action": action,
    })
    .to_string()
}

pub fn triggered_body(source: &str, action: &str, serialized: bool) -> String {
    serde_json::json!({
        "kind": "triggered",
        "filter": {"sources": [source]},
        "action": action,
        "serialized": serialized,
    })
    .to_string()
}

pub fn monitor_body(script: &str, poll_ms: u64) -> String {
    serde_json::json!({
        "kind": "monitor",
        "script": script,
        "poll_ms": poll_ms,
    })
    .to_string()
}

/// Write a definition, panicking on failure.
pub fn put(store: &MemoryDefinitionStore, path: &str, kind: EventKind, body: &str) {
    store.write(path, kind, body).expect("store write");
}
