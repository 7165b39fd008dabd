//! Scheduled-event store with a time-sorted view.
//!
//! Events are held by path. The time view is an ordered set of
//! `(next_fire, path)` keys into that map, so re-sorting after a fire is a
//! remove plus an insert and no event record is ever copied into it.
//! Paused events and events whose next fire cannot be computed yet are
//! kept in the map but left out of the view.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Local, Utc};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    path, ActionQueueItem, EventKind, Location, ScheduledEvent,
};
use crate::services::next_fire::next_fire_after;

/// Outcome of inserting an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// In the store and, unless paused or waiting on a location, in the view.
    Scheduled,
    /// A one-shot whose time has already passed; not stored.
    Expired,
}

/// A scheduled event that came due.
#[derive(Debug)]
pub struct DueFire {
    pub item: ActionQueueItem,
    /// One-shot events are removed from the store once fired.
    pub finished: bool,
}

#[derive(Debug, Default)]
pub struct ScheduleStore {
    events: BTreeMap<String, ScheduledEvent>,
    time_view: BTreeSet<(DateTime<Utc>, String)>,
    location: Option<Location>,
}

impl ScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn get(&self, path: &str) -> Option<&ScheduledEvent> {
        self.events.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.events.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.events.keys().map(String::as_str)
    }

    pub fn location(&self) -> Option<Location> {
        self.location
    }

    /// Earliest entry in the time view.
    pub fn head(&self) -> Option<(DateTime<Utc>, &str)> {
        self.time_view
            .first()
            .map(|(when, path)| (*when, path.as_str()))
    }

    /// Paths ordered by next fire time.
    pub fn time_ordered(&self) -> Vec<(DateTime<Utc>, String)> {
        self.time_view.iter().cloned().collect()
    }

    /// Add a new event and compute its first fire time.
    pub fn insert(&mut self, mut event: ScheduledEvent, now: DateTime<Utc>) -> DomainResult<Admission> {
        if self.events.contains_key(&event.path) {
            return Err(DomainError::duplicate(EventKind::Scheduled, event.path));
        }
        if event.schedule.is_one_shot() && self.is_expired(&event, now) {
            return Ok(Admission::Expired);
        }
        event.next_fire = if event.paused {
            None
        } else {
            self.compute_next(&event, now, event.created_at)
        };
        self.index(&event);
        self.events.insert(event.path.clone(), event);
        Ok(Admission::Scheduled)
    }

    /// Replace an existing event's definition, keeping its firing history.
    pub fn replace(&mut self, mut event: ScheduledEvent, now: DateTime<Utc>) -> DomainResult<Admission> {
        let previous = self.remove(&event.path)?;
        event.last_fired = previous.last_fired;
        event.fire_count = previous.fire_count;
        event.created_at = now;
        self.insert(event, now)
    }

    pub fn remove(&mut self, path: &str) -> DomainResult<ScheduledEvent> {
        let event = self
            .events
            .remove(path)
            .ok_or_else(|| DomainError::not_found(EventKind::Scheduled, path))?;
        self.unindex(&event);
        Ok(event)
    }

    /// Move one event to a new path.
    pub fn rename(&mut self, old: &str, new: &str) -> DomainResult<()> {
        if !self.events.contains_key(old) {
            return Err(DomainError::not_found(EventKind::Scheduled, old));
        }
        if self.events.contains_key(new) {
            return Err(DomainError::duplicate(EventKind::Scheduled, new));
        }
        if let Some(mut event) = self.events.remove(old) {
            self.unindex(&event);
            event.path = new.to_string();
            self.index(&event);
            self.events.insert(new.to_string(), event);
        }
        Ok(())
    }

    /// Move every event beneath `old_scope` to `new_scope`. Returns the
    /// number of events moved.
    pub fn rename_scope(&mut self, old_scope: &str, new_scope: &str) -> DomainResult<usize> {
        let moves: Vec<(String, String)> = self
            .events
            .keys()
            .filter_map(|p| path::rebase(p, old_scope, new_scope).map(|n| (p.clone(), n)))
            .collect();
        if moves.is_empty() {
            return Err(DomainError::not_found(EventKind::Scheduled, old_scope));
        }
        if let Some((_, clash)) = moves
            .iter()
            .find(|(_, new)| self.events.contains_key(new) && !path::is_within(new, old_scope))
        {
            return Err(DomainError::duplicate(EventKind::Scheduled, clash.clone()));
        }
        let mut moved = Vec::with_capacity(moves.len());
        for (old, new) in &moves {
            if let Some(mut event) = self.events.remove(old) {
                self.unindex(&event);
                event.path = new.clone();
                moved.push(event);
            }
        }
        for event in moved {
            self.index(&event);
            self.events.insert(event.path.clone(), event);
        }
        Ok(moves.len())
    }

    /// Pause or resume. Returns whether the state changed; repeating the
    /// same request is a no-op.
    pub fn set_paused(&mut self, path: &str, paused: bool, now: DateTime<Utc>) -> DomainResult<bool> {
        let current = self
            .events
            .get(path)
            .ok_or_else(|| DomainError::not_found(EventKind::Scheduled, path))?;
        if current.paused == paused {
            return Ok(false);
        }
        let mut event = self.remove(path)?;
        event.paused = paused;
        event.next_fire = if paused {
            None
        } else {
            self.compute_next(&event, now, now)
        };
        self.index(&event);
        self.events.insert(event.path.clone(), event);
        Ok(true)
    }

    /// Set the observer location and reschedule sun-relative events.
    pub fn set_location(&mut self, location: Location, now: DateTime<Utc>) {
        self.location = Some(location);
        let paths: Vec<String> = self
            .events
            .values()
            .filter(|e| e.schedule.needs_location() && !e.paused)
            .map(|e| e.path.clone())
            .collect();
        for p in paths {
            self.reschedule(&p, now);
        }
    }

    /// Retry events that are active but have no fire time. Returns how many
    /// became schedulable.
    pub fn retry_unscheduled(&mut self, now: DateTime<Utc>) -> usize {
        let pending: Vec<String> = self
            .events
            .values()
            .filter(|e| !e.paused && e.next_fire.is_none())
            .map(|e| e.path.clone())
            .collect();
        pending
            .into_iter()
            .filter(|p| self.reschedule(p, now))
            .count()
    }

    /// Discard and re-derive the whole time view from the event map.
    pub fn rebuild_time_view(&mut self) {
        self.time_view = self
            .events
            .values()
            .filter_map(|e| e.next_fire.map(|when| (when, e.path.clone())))
            .collect();
    }

    /// Pop the head of the time view if it is due at `now`, record the
    /// fire and re-sort the event at its next fire time.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Option<DueFire> {
        let (due_at, path) = self.time_view.first().cloned()?;
        if due_at > now {
            return None;
        }
        self.time_view.remove(&(due_at, path.clone()));

        let location = self.location;
        let event = self.events.get_mut(&path)?;
        let item = ActionQueueItem::scheduled(path.clone(), event.action.clone(), due_at);
        event.last_fired = Some(due_at);
        event.fire_count += 1;

        if event.schedule.is_one_shot() {
            self.events.remove(&path);
            return Some(DueFire { item, finished: true });
        }

        let after = now.max(due_at);
        event.next_fire = match next_fire_after(&event.schedule, after, due_at, &Local, location) {
            Ok(next) => next,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "cannot compute next fire time");
                None
            }
        };
        if let Some(next) = event.next_fire {
            self.time_view.insert((next, path));
        }
        Some(DueFire {
            item,
            finished: false,
        })
    }

    fn is_expired(&self, event: &ScheduledEvent, now: DateTime<Utc>) -> bool {
        matches!(
            next_fire_after(&event.schedule, now, now, &Local, self.location),
            Ok(None)
        )
    }

    fn reschedule(&mut self, path: &str, now: DateTime<Utc>) -> bool {
        let Some(mut event) = self.events.remove(path) else {
            return false;
        };
        self.unindex(&event);
        let anchor = event.last_fired.unwrap_or(event.created_at);
        event.next_fire = self.compute_next(&event, now, anchor);
        let scheduled = event.next_fire.is_some();
        self.index(&event);
        self.events.insert(event.path.clone(), event);
        scheduled
    }

    fn compute_next(
        &self,
        event: &ScheduledEvent,
        now: DateTime<Utc>,
        anchor: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        match next_fire_after(&event.schedule, now, anchor, &Local, self.location) {
            Ok(next) => next,
            Err(DomainError::LocationUnavailable) => {
                tracing::debug!(path = %event.path, "sun-relative event waiting for location");
                None
            }
            Err(e) => {
                tracing::warn!(path = %event.path, error = %e, "cannot compute next fire time");
                None
            }
        }
    }

    fn index(&mut self, event: &ScheduledEvent) {
        if let Some(when) = event.next_fire {
            self.time_view.insert((when, event.path.clone()));
        }
    }

    fn unindex(&mut self, event: &ScheduledEvent) {
        if let Some(when) = event.next_fire {
            self.time_view.remove(&(when, event.path.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActionContent, ScheduleKind, SunEvent};
    use chrono::TimeDelta;

    fn interval(path: &str, ms: u64, created: DateTime<Utc>) -> ScheduledEvent {
        let mut e = ScheduledEvent::new(path, ScheduleKind::Interval { every_ms: ms }, ActionContent::new(path));
        e.created_at = created;
        e
    }

    #[test]
    fn test_time_view_orders_by_next_fire() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        store.insert(interval("/slow", 10_000, now), now).unwrap();
        store.insert(interval("/fast", 1_000, now), now).unwrap();
        let order: Vec<String> = store.time_ordered().into_iter().map(|(_, p)| p).collect();
        assert_eq!(order, vec!["/fast", "/slow"]);
        assert_eq!(store.head().unwrap().1, "/fast");
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        store.insert(interval("/a", 1_000, now), now).unwrap();
        let err = store.insert(interval("/a", 1_000, now), now).unwrap_err();
        assert!(matches!(err, DomainError::DuplicatePath { .. }));
    }

    #[test]
    fn test_take_due_advances_strictly() {
        let start = Utc::now();
        let mut store = ScheduleStore::new();
        store.insert(interval("/tick", 5_000, start), start).unwrap();
        assert!(store.take_due(start).is_none());

        let t5 = start + TimeDelta::seconds(5);
        let fire = store.take_due(t5).unwrap();
        assert!(!fire.finished);
        let next = store.get("/tick").unwrap().next_fire.unwrap();
        assert_eq!(next, start + TimeDelta::seconds(10));
        // Nothing else due at the same instant: no double fire.
        assert!(store.take_due(t5).is_none());
    }

    #[test]
    fn test_one_shot_removed_after_fire() {
        let now = Utc::now();
        let at = now + TimeDelta::milliseconds(50);
        let mut store = ScheduleStore::new();
        let event = ScheduledEvent::new("/once", ScheduleKind::Once { at }, ActionContent::new("x"));
        assert_eq!(store.insert(event, now).unwrap(), Admission::Scheduled);
        let fire = store.take_due(at).unwrap();
        assert!(fire.finished);
        assert!(!store.contains("/once"));
        assert!(store.head().is_none());
    }

    #[test]
    fn test_elapsed_one_shot_not_admitted() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        let event = ScheduledEvent::new(
            "/stale",
            ScheduleKind::Once { at: now - TimeDelta::hours(1) },
            ActionContent::new("x"),
        );
        assert_eq!(store.insert(event, now).unwrap(), Admission::Expired);
        assert!(store.is_empty());
    }

    #[test]
    fn test_pause_is_idempotent_and_leaves_view() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        store.insert(interval("/p", 1_000, now), now).unwrap();
        assert!(store.set_paused("/p", true, now).unwrap());
        assert!(!store.set_paused("/p", true, now).unwrap());
        assert!(store.get("/p").unwrap().paused);
        assert!(store.head().is_none());
        assert!(store.set_paused("/p", false, now).unwrap());
        assert!(store.head().is_some());
    }

    #[test]
    fn test_rename_and_scope_rename() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        store.insert(interval("/User/Old/a", 1_000, now), now).unwrap();
        store.insert(interval("/User/Old/b", 2_000, now), now).unwrap();
        store.insert(interval("/User/Other", 3_000, now), now).unwrap();

        assert_eq!(store.rename_scope("/User/Old", "/User/New").unwrap(), 2);
        assert!(store.contains("/User/New/a"));
        assert!(store.contains("/User/New/b"));
        assert!(!store.contains("/User/Old/a"));
        assert_eq!(store.time_ordered().len(), 3);

        store.rename("/User/Other", "/User/Renamed").unwrap();
        assert_eq!(store.get("/User/Renamed").unwrap().path, "/User/Renamed");
        assert!(store.rename("/missing", "/x").unwrap_err().is_not_found());
        assert!(matches!(
            store.rename("/User/New/a", "/User/New/b").unwrap_err(),
            DomainError::DuplicatePath { .. }
        ));
    }

    #[test]
    fn test_sun_event_waits_for_location() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        let event = ScheduledEvent::new(
            "/dusk",
            ScheduleKind::Sun { event: SunEvent::Sunset, offset_minutes: 0 },
            ActionContent::new("lights"),
        );
        store.insert(event, now).unwrap();
        assert!(store.get("/dusk").unwrap().next_fire.is_none());
        assert_eq!(store.retry_unscheduled(now), 0);

        store.set_location(Location::new(40.0, -3.7).unwrap(), now);
        assert!(store.get("/dusk").unwrap().next_fire.is_some());
        assert_eq!(store.head().unwrap().1, "/dusk");
    }

    #[test]
    fn test_rebuild_time_view_matches_incremental() {
        let now = Utc::now();
        let mut store = ScheduleStore::new();
        store.insert(interval("/a", 3_000, now), now).unwrap();
        store.insert(interval("/b", 1_000, now), now).unwrap();
        let before = store.time_ordered();
        store.rebuild_time_view();
        assert_eq!(store.time_ordered(), before);
    }
}
