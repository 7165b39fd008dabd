//! Live event lists behind the configuration mutex.
//!
//! The scheduler loop, the trigger listener and the management API are the
//! only users of this lock. Nothing here touches the worker pool, and the
//! lock is never held while waiting on the action queue.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::{Condvar, Mutex};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    path, EventDefinition, EventKind, EventMonitor, Location, ScheduleInfo, TriggeredEvent,
};
use crate::services::schedule_store::{Admission, DueFire, ScheduleStore};

/// Result of registering a single definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// Now live; carries the new change serial.
    Registered(u64),
    /// A one-shot whose time already passed. Nothing changed.
    Expired,
}

/// Result of replacing one kind's list wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReloadOutcome {
    pub serial: u64,
    pub loaded: usize,
    /// Paths whose definitions could not be turned into records.
    pub skipped: Vec<String>,
    /// One-shot schedules dropped because their time had passed.
    pub expired: Vec<String>,
}

trait Keyed {
    fn path_mut(&mut self) -> &mut String;
    fn paused_mut(&mut self) -> &mut bool;
}

impl Keyed for TriggeredEvent {
    fn path_mut(&mut self) -> &mut String {
        &mut self.path
    }
    fn paused_mut(&mut self) -> &mut bool {
        &mut self.paused
    }
}

impl Keyed for EventMonitor {
    fn path_mut(&mut self) -> &mut String {
        &mut self.path
    }
    fn paused_mut(&mut self) -> &mut bool {
        &mut self.paused
    }
}

#[derive(Default)]
struct Lists {
    schedules: ScheduleStore,
    triggered: BTreeMap<String, TriggeredEvent>,
    /// Copy-on-write view handed to the trigger listener.
    triggered_view: Arc<Vec<TriggeredEvent>>,
    monitors: BTreeMap<String, EventMonitor>,
}

impl Lists {
    fn refresh_triggered(&mut self) {
        self.triggered_view = Arc::new(self.triggered.values().cloned().collect());
    }
}

#[derive(Default)]
pub struct EventRegistry {
    lists: Mutex<Lists>,
    schedule_changed: Condvar,
    serial: AtomicU64,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current change serial number.
    pub fn serial(&self) -> u64 {
        self.serial.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.serial.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn schedules_changed(&self) {
        self.schedule_changed.notify_all();
    }

    pub fn add(&self, path: &str, definition: EventDefinition) -> DomainResult<Registration> {
        let mut lists = self.lists.lock();
        match definition.kind() {
            EventKind::Scheduled => {
                let event = definition.into_scheduled(path)?;
                if lists.schedules.insert(event, Utc::now())? == Admission::Expired {
                    return Ok(Registration::Expired);
                }
                self.schedules_changed();
            }
            EventKind::Triggered => {
                let event = definition.into_triggered(path)?;
                insert_new(&mut lists.triggered, EventKind::Triggered, event.path.clone(), event)?;
                lists.refresh_triggered();
            }
            EventKind::Monitor => {
                let monitor = definition.into_monitor(path)?;
                insert_new(&mut lists.monitors, EventKind::Monitor, monitor.path.clone(), monitor)?;
            }
        }
        Ok(Registration::Registered(self.bump()))
    }

    /// Replace an existing record with a new definition of the same path.
    pub fn update(&self, path: &str, definition: EventDefinition) -> DomainResult<Registration> {
        let mut lists = self.lists.lock();
        match definition.kind() {
            EventKind::Scheduled => {
                let event = definition.into_scheduled(path)?;
                let admission = lists.schedules.replace(event, Utc::now())?;
                self.schedules_changed();
                if admission == Admission::Expired {
                    // The old record is gone either way.
                    self.bump();
                    return Ok(Registration::Expired);
                }
            }
            EventKind::Triggered => {
                let event = definition.into_triggered(path)?;
                let slot = lists
                    .triggered
                    .get_mut(path)
                    .ok_or_else(|| DomainError::not_found(EventKind::Triggered, path))?;
                *slot = event;
                lists.refresh_triggered();
            }
            EventKind::Monitor => {
                let monitor = definition.into_monitor(path)?;
                let slot = lists
                    .monitors
                    .get_mut(path)
                    .ok_or_else(|| DomainError::not_found(EventKind::Monitor, path))?;
                *slot = monitor;
            }
        }
        Ok(Registration::Registered(self.bump()))
    }

    pub fn delete(&self, kind: EventKind, path: &str) -> DomainResult<u64> {
        let mut lists = self.lists.lock();
        match kind {
            EventKind::Scheduled => {
                lists.schedules.remove(path)?;
                self.schedules_changed();
            }
            EventKind::Triggered => {
                lists
                    .triggered
                    .remove(path)
                    .ok_or_else(|| DomainError::not_found(kind, path))?;
                lists.refresh_triggered();
            }
            EventKind::Monitor => {
                lists
                    .monitors
                    .remove(path)
                    .ok_or_else(|| DomainError::not_found(kind, path))?;
            }
        }
        Ok(self.bump())
    }

    /// Pause or resume. Asking for the state an event is already in
    /// succeeds without changing the serial.
    pub fn set_paused(&self, kind: EventKind, path: &str, paused: bool) -> DomainResult<u64> {
        let mut lists = self.lists.lock();
        let changed = match kind {
            EventKind::Scheduled => {
                let changed = lists.schedules.set_paused(path, paused, Utc::now())?;
                if changed {
                    self.schedules_changed();
                }
                changed
            }
            EventKind::Triggered => {
                let changed = pause_in(&mut lists.triggered, kind, path, paused)?;
                if changed {
                    lists.refresh_triggered();
                }
                changed
            }
            EventKind::Monitor => pause_in(&mut lists.monitors, kind, path, paused)?,
        };
        Ok(if changed { self.bump() } else { self.serial() })
    }

    pub fn rename(&self, kind: EventKind, old: &str, new: &str) -> DomainResult<u64> {
        if old == new {
            return self.exists(kind, old).map(|_| self.serial());
        }
        let mut lists = self.lists.lock();
        match kind {
            EventKind::Scheduled => {
                lists.schedules.rename(old, new)?;
                self.schedules_changed();
            }
            EventKind::Triggered => {
                rename_in(&mut lists.triggered, kind, old, new)?;
                lists.refresh_triggered();
            }
            EventKind::Monitor => rename_in(&mut lists.monitors, kind, old, new)?,
        }
        Ok(self.bump())
    }

    /// Move every event of `kind` beneath `old_scope` to `new_scope`.
    /// Returns the new serial and the number of events moved.
    pub fn rename_scope(&self, kind: EventKind, old_scope: &str, new_scope: &str) -> DomainResult<(u64, usize)> {
        let mut lists = self.lists.lock();
        let moved = match kind {
            EventKind::Scheduled => {
                let moved = lists.schedules.rename_scope(old_scope, new_scope)?;
                self.schedules_changed();
                moved
            }
            EventKind::Triggered => {
                let moved = rename_scope_in(&mut lists.triggered, kind, old_scope, new_scope)?;
                lists.refresh_triggered();
                moved
            }
            EventKind::Monitor => rename_scope_in(&mut lists.monitors, kind, old_scope, new_scope)?,
        };
        Ok((self.bump(), moved))
    }

    /// Swap in a freshly loaded list for one kind.
    pub fn replace_all(&self, kind: EventKind, definitions: Vec<(String, EventDefinition)>) -> ReloadOutcome {
        let now = Utc::now();
        let mut outcome = ReloadOutcome::default();
        let mut lists = self.lists.lock();

        match kind {
            EventKind::Scheduled => {
                let mut fresh = ScheduleStore::new();
                if let Some(location) = lists.schedules.location() {
                    fresh.set_location(location, now);
                }
                for (path, definition) in definitions {
                    let admitted = definition
                        .into_scheduled(&path)
                        .and_then(|event| fresh.insert(event, now));
                    match admitted {
                        Ok(Admission::Scheduled) => outcome.loaded += 1,
                        Ok(Admission::Expired) => outcome.expired.push(path),
                        Err(e) => {
                            tracing::warn!(path = %path, error = %e, "skipping scheduled event");
                            outcome.skipped.push(path);
                        }
                    }
                }
                lists.schedules = fresh;
                self.schedules_changed();
            }
            EventKind::Triggered => {
                let mut fresh = BTreeMap::new();
                for (path, definition) in definitions {
                    let added = definition.into_triggered(&path).and_then(|event| {
                        insert_new(&mut fresh, kind, event.path.clone(), event)
                    });
                    record(&mut outcome, path, added);
                }
                lists.triggered = fresh;
                lists.refresh_triggered();
            }
            EventKind::Monitor => {
                let mut fresh = BTreeMap::new();
                for (path, definition) in definitions {
                    let added = definition.into_monitor(&path).and_then(|monitor| {
                        insert_new(&mut fresh, kind, monitor.path.clone(), monitor)
                    });
                    record(&mut outcome, path, added);
                }
                lists.monitors = fresh;
            }
        }

        outcome.serial = self.bump();
        outcome
    }

    pub fn schedule_info(&self, path: &str) -> DomainResult<ScheduleInfo> {
        self.lists
            .lock()
            .schedules
            .get(path)
            .map(|event| event.info())
            .ok_or_else(|| DomainError::not_found(EventKind::Scheduled, path))
    }

    /// All scheduled events in next-fire order, unscheduled ones last.
    pub fn schedule_infos(&self) -> Vec<ScheduleInfo> {
        let lists = self.lists.lock();
        let mut infos: Vec<ScheduleInfo> = lists
            .schedules
            .paths()
            .filter_map(|p| lists.schedules.get(p))
            .map(|e| e.info())
            .collect();
        infos.sort_by(|a, b| match (a.next_fire, b.next_fire) {
            (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.path.cmp(&b.path)),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => a.path.cmp(&b.path),
        });
        infos
    }

    pub fn set_location(&self, location: Location) -> u64 {
        let mut lists = self.lists.lock();
        if lists.schedules.location() == Some(location) {
            return self.serial();
        }
        lists.schedules.set_location(location, Utc::now());
        self.schedules_changed();
        self.bump()
    }

    pub fn location(&self) -> Option<Location> {
        self.lists.lock().schedules.location()
    }

    pub fn triggered_snapshot(&self) -> Arc<Vec<TriggeredEvent>> {
        self.lists.lock().triggered_view.clone()
    }

    pub fn monitor(&self, path: &str) -> Option<EventMonitor> {
        self.lists.lock().monitors.get(path).cloned()
    }

    pub fn monitors(&self) -> Vec<EventMonitor> {
        self.lists.lock().monitors.values().cloned().collect()
    }

    pub fn paths(&self, kind: EventKind) -> Vec<String> {
        let lists = self.lists.lock();
        match kind {
            EventKind::Scheduled => lists.schedules.paths().map(str::to_string).collect(),
            EventKind::Triggered => lists.triggered.keys().cloned().collect(),
            EventKind::Monitor => lists.monitors.keys().cloned().collect(),
        }
    }

    pub fn contains(&self, kind: EventKind, path: &str) -> bool {
        self.exists(kind, path).is_ok()
    }

    fn exists(&self, kind: EventKind, path: &str) -> DomainResult<()> {
        let lists = self.lists.lock();
        let found = match kind {
            EventKind::Scheduled => lists.schedules.contains(path),
            EventKind::Triggered => lists.triggered.contains_key(path),
            EventKind::Monitor => lists.monitors.contains_key(path),
        };
        if found {
            Ok(())
        } else {
            Err(DomainError::not_found(kind, path))
        }
    }

    /// Pop every scheduled event due now. When nothing is due, sleep until
    /// the head of the time view comes due, a schedule changes, or `poll`
    /// elapses, then return an empty batch.
    pub fn take_due_or_wait(&self, poll: Duration) -> Vec<DueFire> {
        let mut lists = self.lists.lock();
        let now = Utc::now();
        let mut due = Vec::new();
        while let Some(fire) = lists.schedules.take_due(now) {
            due.push(fire);
        }
        if !due.is_empty() {
            if due.iter().any(|f| f.finished) {
                self.bump();
            }
            return due;
        }

        let wait = lists
            .schedules
            .head()
            .map(|(at, _)| (at - now).to_std().unwrap_or(Duration::ZERO).min(poll))
            .unwrap_or(poll);
        if !wait.is_zero() {
            let _ = self.schedule_changed.wait_for(&mut lists, wait);
        }
        Vec::new()
    }

    /// Give unscheduled events another chance to compute a fire time.
    pub fn retry_unscheduled(&self) -> usize {
        let mut lists = self.lists.lock();
        let ready = lists.schedules.retry_unscheduled(Utc::now());
        if ready > 0 {
            self.schedules_changed();
        }
        ready
    }

    /// Wake the scheduler loop out of its timed wait.
    pub fn wake_scheduler(&self) {
        self.schedules_changed();
    }
}

fn record<T>(outcome: &mut ReloadOutcome, path: String, result: DomainResult<T>) {
    match result {
        Ok(_) => outcome.loaded += 1,
        Err(e) => {
            tracing::warn!(path = %path, error = %e, "skipping event definition");
            outcome.skipped.push(path);
        }
    }
}

fn insert_new<T>(map: &mut BTreeMap<String, T>, kind: EventKind, path: String, record: T) -> DomainResult<()> {
    if map.contains_key(&path) {
        return Err(DomainError::duplicate(kind, path));
    }
    map.insert(path, record);
    Ok(())
}

fn pause_in<T: Keyed>(map: &mut BTreeMap<String, T>, kind: EventKind, path: &str, paused: bool) -> DomainResult<bool> {
    let record = map
        .get_mut(path)
        .ok_or_else(|| DomainError::not_found(kind, path))?;
    let flag = record.paused_mut();
    if *flag == paused {
        return Ok(false);
    }
    *flag = paused;
    Ok(true)
}

fn rename_in<T: Keyed>(map: &mut BTreeMap<String, T>, kind: EventKind, old: &str, new: &str) -> DomainResult<()> {
    if map.contains_key(new) {
        return Err(DomainError::duplicate(kind, new));
    }
    let mut record = map
        .remove(old)
        .ok_or_else(|| DomainError::not_found(kind, old))?;
    *record.path_mut() = new.to_string();
    map.insert(new.to_string(), record);
    Ok(())
}

fn rename_scope_in<T: Keyed>(
    map: &mut BTreeMap<String, T>,
    kind: EventKind,
    old_scope: &str,
    new_scope: &str,
) -> DomainResult<usize> {
    let moves: Vec<(String, String)> = map
        .keys()
        .filter_map(|p| path::rebase(p, old_scope, new_scope).map(|n| (p.clone(), n)))
        .collect();
    if moves.is_empty() {
        return Err(DomainError::not_found(kind, old_scope));
    }
    if let Some((_, clash)) = moves
        .iter()
        .find(|(_, new)| map.contains_key(new) && !path::is_within(new, old_scope))
    {
        return Err(DomainError::duplicate(kind, clash.clone()));
    }
    let mut moved = Vec::with_capacity(moves.len());
    for (old, new) in &moves {
        if let Some(mut record) = map.remove(old) {
            *record.path_mut() = new.clone();
            moved.push((new.clone(), record));
        }
    }
    map.extend(moved);
    Ok(moves.len())
}
