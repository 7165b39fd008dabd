//! Port for the scripting runtime that drives event monitors.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

use crate::domain::models::EventMonitor;

/// Cooperative stop request shared between the monitor host and one
/// monitor thread.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        let (flag, cvar) = &*self.inner;
        *flag.lock() = true;
        cvar.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.inner.0.lock()
    }

    /// Sleep up to `timeout`, returning early with `true` once stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let (flag, cvar) = &*self.inner;
        let mut stopped = flag.lock();
        if !*stopped {
            let _ = cvar.wait_for(&mut stopped, timeout);
        }
        *stopped
    }
}

/// Runs one monitor until its stop signal fires. Called on the monitor's
/// dedicated thread; returning ends the thread.
pub trait MonitorRuntime: Send + Sync {
    fn run(&self, monitor: &EventMonitor, stop: &StopSignal);
}
