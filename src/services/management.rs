//! Configuration mutation API.
//!
//! The definition store is the source of truth and is edited by its owner;
//! these calls tell the running engine to pick up those edits. `AddEvent`,
//! `UpdateEvent` and `ReloadList` read definitions from the store, the
//! other mutations act on the live lists only. `define_event` and
//! `remove_event` are conveniences that edit the store and notify the
//! engine in one call. Every mutation returns the change serial.

use std::sync::Arc;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{path, EventDefinition, EventKind, Location, ScheduleInfo};
use crate::domain::ports::DefinitionStore;
use crate::services::monitor_host::MonitorHost;
use crate::services::registry::{EventRegistry, Registration, ReloadOutcome};

pub struct EventManager {
    registry: Arc<EventRegistry>,
    store: Arc<dyn DefinitionStore>,
    monitors: Arc<MonitorHost>,
    root_scope: String,
}

impl EventManager {
    pub fn new(
        registry: Arc<EventRegistry>,
        store: Arc<dyn DefinitionStore>,
        monitors: Arc<MonitorHost>,
        root_scope: impl Into<String>,
    ) -> Self {
        Self {
            registry,
            store,
            monitors,
            root_scope: root_scope.into(),
        }
    }

    pub fn registry(&self) -> &Arc<EventRegistry> {
        &self.registry
    }

    /// Liveness probe; returns the current change serial.
    pub fn ping(&self) -> u64 {
        self.registry.serial()
    }

    pub fn add_event(&self, kind: EventKind, event_path: &str) -> DomainResult<u64> {
        let event_path = path::normalize(event_path)?;
        let definition = self.read_definition(kind, &event_path)?;
        let registration = self.registry.add(&event_path, definition)?;
        self.after_registration(kind, &event_path, registration)
    }

    pub fn update_event(&self, kind: EventKind, event_path: &str) -> DomainResult<u64> {
        let event_path = path::normalize(event_path)?;
        let definition = self.read_definition(kind, &event_path)?;
        let registration = self.registry.update(&event_path, definition)?;
        if kind == EventKind::Monitor {
            self.monitors.stop(&event_path);
        }
        self.after_registration(kind, &event_path, registration)
    }

    pub fn delete_event(&self, kind: EventKind, event_path: &str) -> DomainResult<u64> {
        let event_path = path::normalize(event_path)?;
        let serial = self.registry.delete(kind, &event_path)?;
        if kind == EventKind::Monitor {
            self.monitors.stop(&event_path);
        }
        tracing::info!(kind = %kind, path = %event_path, serial, "event deleted");
        Ok(serial)
    }

    pub fn pause_event(&self, kind: EventKind, event_path: &str, paused: bool) -> DomainResult<u64> {
        let event_path = path::normalize(event_path)?;
        let serial = self.registry.set_paused(kind, &event_path, paused)?;
        if kind == EventKind::Monitor {
            self.sync_monitor(&event_path);
        }
        tracing::info!(kind = %kind, path = %event_path, paused, serial, "event pause state set");
        Ok(serial)
    }

    pub fn rename_event(&self, kind: EventKind, parent: &str, old_name: &str, new_name: &str) -> DomainResult<u64> {
        let old = path::join(parent, old_name)?;
        let new = path::join(parent, new_name)?;
        let serial = self.registry.rename(kind, &old, &new)?;
        if kind == EventKind::Monitor && old != new {
            self.monitors.stop(&old);
            self.sync_monitor(&new);
        }
        tracing::info!(kind = %kind, from = %old, to = %new, serial, "event renamed");
        Ok(serial)
    }

    /// Rename a folder: every event of `kind` beneath `parent/old_name`
    /// moves beneath `parent/new_name`.
    pub fn rename_scope(&self, kind: EventKind, parent: &str, old_name: &str, new_name: &str) -> DomainResult<u64> {
        let old_scope = path::join(parent, old_name)?;
        let new_scope = path::join(parent, new_name)?;
        let (serial, moved) = self.registry.rename_scope(kind, &old_scope, &new_scope)?;
        if kind == EventKind::Monitor {
            for running in self.monitors.running() {
                if let Some(target) = path::rebase(&running, &old_scope, &new_scope) {
                    self.monitors.stop(&running);
                    self.sync_monitor(&target);
                }
            }
        }
        tracing::info!(kind = %kind, from = %old_scope, to = %new_scope, moved, serial, "scope renamed");
        Ok(serial)
    }

    /// Re-read every definition of `kind` from the store and replace the
    /// live list wholesale. Entries that fail to read or decode are logged
    /// and skipped; only a failure to list the store is an error.
    pub fn reload_list(&self, kind: EventKind) -> DomainResult<u64> {
        let paths = self.store.list_paths(&self.root_scope, kind)?;
        let mut definitions = Vec::with_capacity(paths.len());
        let mut unreadable = 0usize;

        for event_path in paths {
            match self.read_definition(kind, &event_path) {
                Ok(definition) => definitions.push((event_path, definition)),
                Err(e) => {
                    unreadable += 1;
                    tracing::warn!(kind = %kind, path = %event_path, error = %e, "skipping unreadable definition");
                }
            }
        }

        let outcome = self.registry.replace_all(kind, definitions);
        self.purge_expired(&outcome);
        if kind == EventKind::Monitor {
            self.resync_monitors();
        }

        tracing::info!(
            kind = %kind,
            loaded = outcome.loaded,
            skipped = outcome.skipped.len() + unreadable,
            expired = outcome.expired.len(),
            serial = outcome.serial,
            "event list reloaded"
        );
        Ok(outcome.serial)
    }

    /// Reload every kind. Used at startup.
    pub fn load_all(&self) -> DomainResult<u64> {
        let mut serial = self.registry.serial();
        for kind in EventKind::ALL {
            serial = self.reload_list(kind)?;
        }
        Ok(serial)
    }

    pub fn query_schedule_info(&self, event_path: &str) -> DomainResult<ScheduleInfo> {
        let event_path = path::normalize(event_path)?;
        self.registry.schedule_info(&event_path)
    }

    pub fn set_location_info(&self, latitude: f64, longitude: f64) -> DomainResult<u64> {
        let location = Location::new(latitude, longitude)?;
        let serial = self.registry.set_location(location);
        tracing::info!(latitude, longitude, serial, "location set");
        Ok(serial)
    }

    /// Write a definition to the store and register it, adding or
    /// replacing as needed.
    pub fn define_event(&self, event_path: &str, definition: &EventDefinition) -> DomainResult<u64> {
        let event_path = path::normalize(event_path)?;
        definition.validate(&event_path)?;
        let kind = definition.kind();
        self.store.write(&event_path, kind, &definition.encode()?)?;
        if self.registry.contains(kind, &event_path) {
            self.update_event(kind, &event_path)
        } else {
            self.add_event(kind, &event_path)
        }
    }

    /// Unregister an event and delete its definition from the store.
    pub fn remove_event(&self, kind: EventKind, event_path: &str) -> DomainResult<u64> {
        let serial = self.delete_event(kind, event_path)?;
        self.store.delete(&path::normalize(event_path)?)?;
        Ok(serial)
    }

    fn read_definition(&self, kind: EventKind, event_path: &str) -> DomainResult<EventDefinition> {
        let stored = self.store.read(event_path)?;
        if stored.kind != kind {
            return Err(DomainError::KindMismatch {
                path: event_path.to_string(),
                expected: kind,
                found: stored.kind,
            });
        }
        stored.decode()
    }

    fn after_registration(&self, kind: EventKind, event_path: &str, registration: Registration) -> DomainResult<u64> {
        match registration {
            Registration::Registered(serial) => {
                if kind == EventKind::Monitor {
                    self.sync_monitor(event_path);
                }
                tracing::info!(kind = %kind, path = %event_path, serial, "event registered");
                Ok(serial)
            }
            Registration::Expired => {
                tracing::info!(path = %event_path, "one-shot event already elapsed, deleting definition");
                self.store.delete(event_path)?;
                Ok(self.registry.serial())
            }
        }
    }

    fn purge_expired(&self, outcome: &ReloadOutcome) {
        for event_path in &outcome.expired {
            tracing::info!(path = %event_path, "dropping elapsed one-shot event");
            if let Err(e) = self.store.delete(event_path) {
                tracing::warn!(path = %event_path, error = %e, "failed to delete elapsed one-shot definition");
            }
        }
    }

    fn sync_monitor(&self, event_path: &str) {
        let Some(monitor) = self.registry.monitor(event_path) else {
            self.monitors.stop(event_path);
            return;
        };
        if let Err(e) = self.monitors.sync(&monitor) {
            tracing::error!(path = %event_path, error = %e, "failed to start monitor thread");
        }
    }

    fn resync_monitors(&self) {
        let live = self.registry.monitors();
        for running in self.monitors.running() {
            if !live.iter().any(|m| m.path == running) {
                self.monitors.stop(&running);
            }
        }
        for monitor in &live {
            if let Err(e) = self.monitors.restart(monitor) {
                tracing::error!(path = %monitor.path, error = %e, "failed to start monitor thread");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryDefinitionStore;
    use crate::domain::models::{ActionContent, EventMonitor, ScheduleKind};
    use crate::domain::ports::{MonitorRuntime, StopSignal};
    use chrono::{TimeDelta, Utc};
    use std::time::Duration;

    struct IdleRuntime;

    impl MonitorRuntime for IdleRuntime {
        fn run(&self, _: &EventMonitor, stop: &StopSignal) {
            while !stop.wait_timeout(Duration::from_millis(5)) {}
        }
    }

    fn manager() -> (EventManager, Arc<MemoryDefinitionStore>) {
        let store = Arc::new(MemoryDefinitionStore::new());
        let manager = EventManager::new(
            Arc::new(EventRegistry::new()),
            store.clone(),
            Arc::new(MonitorHost::new(Arc::new(IdleRuntime), Duration::from_secs(1))),
            "/",
        );
        (manager, store)
    }

    fn daily() -> EventDefinition {
        EventDefinition::Scheduled {
            schedule: ScheduleKind::Daily {
                time: chrono::NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            },
            action: ActionContent::new("blinds.open"),
            paused: false,
        }
    }

    #[test]
    fn test_add_then_query_round_trip() {
        let (manager, store) = manager();
        store.write("/User/Blinds", EventKind::Scheduled, &daily().encode().unwrap()).unwrap();
        let serial = manager.add_event(EventKind::Scheduled, "/User/Blinds").unwrap();
        assert_eq!(serial, manager.ping());

        let info = manager.query_schedule_info("/User/Blinds").unwrap();
        let EventDefinition::Scheduled { schedule, .. } = daily() else {
            unreachable!()
        };
        assert_eq!(info.schedule, schedule);
        assert!(info.next_fire.is_some());
    }

    #[test]
    fn test_add_with_wrong_kind() {
        let (manager, store) = manager();
        store.write("/x", EventKind::Scheduled, &daily().encode().unwrap()).unwrap();
        assert!(matches!(
            manager.add_event(EventKind::Triggered, "/x").unwrap_err(),
            DomainError::KindMismatch { .. }
        ));
        assert_eq!(manager.ping(), 0);
    }

    #[test]
    fn test_elapsed_one_shot_is_deleted_from_store() {
        let (manager, store) = manager();
        let stale = EventDefinition::Scheduled {
            schedule: ScheduleKind::Once {
                at: Utc::now() - TimeDelta::minutes(10),
            },
            action: ActionContent::new("late"),
            paused: false,
        };
        store.write("/late", EventKind::Scheduled, &stale.encode().unwrap()).unwrap();
        manager.load_all().unwrap();
        assert!(store.read("/late").unwrap_err().is_not_found());
        assert!(manager.query_schedule_info("/late").is_err());
    }

    #[test]
    fn test_monitor_lifecycle_follows_mutations() {
        let (manager, _) = manager();
        let monitor = EventDefinition::Monitor {
            script: "watch".into(),
            poll_ms: 10,
            paused: false,
        };
        manager.define_event("/Mon/pump", &monitor).unwrap();
        assert_eq!(manager.monitors.running(), vec!["/Mon/pump".to_string()]);

        manager.pause_event(EventKind::Monitor, "/Mon/pump", true).unwrap();
        assert!(manager.monitors.running().is_empty());
        manager.pause_event(EventKind::Monitor, "/Mon/pump", false).unwrap();

        manager.rename_scope(EventKind::Monitor, "/", "Mon", "Watch").unwrap();
        assert_eq!(manager.monitors.running(), vec!["/Watch/pump".to_string()]);

        manager.remove_event(EventKind::Monitor, "/Watch/pump").unwrap();
        assert!(manager.monitors.running().is_empty());
    }

    #[test]
    fn test_set_location_validates() {
        let (manager, _) = manager();
        assert!(matches!(
            manager.set_location_info(95.0, 0.0).unwrap_err(),
            DomainError::InvalidLocation { .. }
        ));
        assert_eq!(manager.set_location_info(51.5, -0.1).unwrap(), 1);
        // Same location again changes nothing.
        assert_eq!(manager.set_location_info(51.5, -0.1).unwrap(), 1);
    }
}
