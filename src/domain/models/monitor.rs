//! Event monitor model.
//!
//! Monitors are long-running scripted watchers. The engine only starts,
//! stops and reconfigures them; the script itself is run by the monitor
//! runtime collaborator on the monitor's own thread.

use std::time::Duration;

/// A configured event monitor, keyed by its path.
#[derive(Debug, Clone, PartialEq)]
pub struct EventMonitor {
    pub path: String,
    pub script: String,
    pub poll_interval: Duration,
    pub paused: bool,
}

impl EventMonitor {
    pub fn new(path: impl Into<String>, script: impl Into<String>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            script: script.into(),
            poll_interval,
            paused: false,
        }
    }
}
