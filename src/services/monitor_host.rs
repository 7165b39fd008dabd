//! Starts and stops event-monitor threads.
//!
//! Each running monitor owns one named OS thread driven by the
//! `MonitorRuntime` collaborator. The host only manages lifetimes; what a
//! monitor does on its thread is opaque here.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::models::EventMonitor;
use crate::domain::ports::{MonitorRuntime, StopSignal};

struct MonitorThread {
    stop: StopSignal,
    handle: JoinHandle<()>,
}

pub struct MonitorHost {
    runtime: Arc<dyn MonitorRuntime>,
    threads: Mutex<HashMap<String, MonitorThread>>,
    stop_timeout: Duration,
}

impl MonitorHost {
    pub fn new(runtime: Arc<dyn MonitorRuntime>, stop_timeout: Duration) -> Self {
        Self {
            runtime,
            threads: Mutex::new(HashMap::new()),
            stop_timeout,
        }
    }

    /// Bring the running thread in line with the definition: start it if
    /// active and not running, stop it if paused.
    pub fn sync(&self, monitor: &EventMonitor) -> std::io::Result<()> {
        if monitor.paused {
            self.stop(&monitor.path);
            return Ok(());
        }
        if self.is_running(&monitor.path) {
            return Ok(());
        }
        self.start(monitor)
    }

    /// Stop the current thread, if any, and start a fresh one.
    pub fn restart(&self, monitor: &EventMonitor) -> std::io::Result<()> {
        self.stop(&monitor.path);
        self.sync(monitor)
    }

    fn start(&self, monitor: &EventMonitor) -> std::io::Result<()> {
        let stop = StopSignal::new();
        let runtime = self.runtime.clone();
        let owned = monitor.clone();
        let signal = stop.clone();

        let handle = thread::Builder::new()
            .name(format!("monitor:{}", monitor.path))
            .spawn(move || {
                tracing::info!(path = %owned.path, "monitor started");
                runtime.run(&owned, &signal);
                tracing::info!(path = %owned.path, "monitor stopped");
            })?;

        self.threads
            .lock()
            .insert(monitor.path.clone(), MonitorThread { stop, handle });
        Ok(())
    }

    /// Signal one monitor to stop and wait a bounded time for its thread.
    /// Returns whether the thread exited in time.
    pub fn stop(&self, path: &str) -> bool {
        let Some(thread) = self.threads.lock().remove(path) else {
            return true;
        };
        thread.stop.stop();
        join_within(path, thread.handle, Instant::now() + self.stop_timeout)
    }

    /// Stop every monitor, sharing one deadline.
    pub fn stop_all(&self, timeout: Duration) -> bool {
        let threads: Vec<(String, MonitorThread)> = self.threads.lock().drain().collect();
        for (_, thread) in &threads {
            thread.stop.stop();
        }
        let deadline = Instant::now() + timeout;
        threads
            .into_iter()
            .map(|(path, thread)| join_within(&path, thread.handle, deadline))
            .fold(true, |all, exited| all && exited)
    }

    pub fn is_running(&self, path: &str) -> bool {
        self.threads
            .lock()
            .get(path)
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn running(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.threads.lock().keys().cloned().collect();
        paths.sort();
        paths
    }
}

fn join_within(path: &str, handle: JoinHandle<()>, deadline: Instant) -> bool {
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            tracing::warn!(path = %path, "monitor did not stop in time, detaching");
            return false;
        }
        thread::sleep(Duration::from_millis(5));
    }
    if handle.join().is_err() {
        tracing::error!(path = %path, "monitor thread panicked");
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRuntime {
        runs: AtomicUsize,
    }

    impl MonitorRuntime for CountingRuntime {
        fn run(&self, monitor: &EventMonitor, stop: &StopSignal) {
            self.runs.fetch_add(1, Ordering::SeqCst);
            while !stop.wait_timeout(monitor.poll_interval) {}
        }
    }

    fn host() -> (MonitorHost, Arc<CountingRuntime>) {
        let runtime = Arc::new(CountingRuntime {
            runs: AtomicUsize::new(0),
        });
        (MonitorHost::new(runtime.clone(), Duration::from_secs(2)), runtime)
    }

    #[test]
    fn test_sync_starts_once_and_pause_stops() {
        let (host, runtime) = host();
        let mut monitor = EventMonitor::new("/M/boiler", "watch boiler", Duration::from_millis(10));
        host.sync(&monitor).unwrap();
        host.sync(&monitor).unwrap();
        assert!(host.is_running("/M/boiler"));

        monitor.paused = true;
        host.sync(&monitor).unwrap();
        assert!(!host.is_running("/M/boiler"));
        assert_eq!(runtime.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_all() {
        let (host, _) = host();
        for path in ["/a", "/b", "/c"] {
            host.sync(&EventMonitor::new(path, "", Duration::from_millis(10))).unwrap();
        }
        assert_eq!(host.running().len(), 3);
        assert!(host.stop_all(Duration::from_secs(2)));
        assert!(host.running().is_empty());
    }
}
