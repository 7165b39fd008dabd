//! Collaborators that only log, used by the `run` command when no real
//! action interpreter or scripting runtime is attached.

use std::time::Duration;

use crate::domain::models::{ActionContent, EventMonitor};
use crate::domain::ports::{ActionEngine, ActionError, MonitorRuntime, RuntimeContext, StopSignal};

/// Logs each action it is asked to execute. An optional artificial delay
/// makes concurrency visible when experimenting with pool sizes.
#[derive(Debug, Clone, Default)]
pub struct LoggingActionEngine {
    delay: Option<Duration>,
}

impl LoggingActionEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }
}

impl ActionEngine for LoggingActionEngine {
    fn execute(&self, action: &ActionContent, context: &RuntimeContext) -> Result<(), ActionError> {
        if action.as_str().trim().is_empty() {
            return Err(ActionError::new("empty action"));
        }
        tracing::info!(
            path = %context.path,
            kind = context.kind,
            worker = context.worker,
            trigger = context.trigger.as_ref().map(|t| t.source.as_str()),
            action = %action,
            "executing action"
        );
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        Ok(())
    }
}

/// Emits a heartbeat log line every poll interval until stopped.
#[derive(Debug, Clone, Default)]
pub struct LoggingMonitorRuntime;

impl MonitorRuntime for LoggingMonitorRuntime {
    fn run(&self, monitor: &EventMonitor, stop: &StopSignal) {
        let mut ticks: u64 = 0;
        while !stop.wait_timeout(monitor.poll_interval) {
            ticks += 1;
            tracing::debug!(path = %monitor.path, ticks, script = %monitor.script, "monitor poll");
        }
    }
}
