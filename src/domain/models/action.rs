//! Action queue envelopes.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::triggered::TriggerNotification;

/// Runnable action content. Opaque to the engine: it is copied into queue
/// items and handed to the action engine unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionContent(pub String);

impl ActionContent {
    pub fn new(content: impl Into<String>) -> Self {
        Self(content.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What produced a queue item. The dispatcher switches on this tag.
#[derive(Debug, Clone)]
pub enum ActionSource {
    /// Emitted by the scheduler loop when a scheduled event came due.
    Scheduled { due_at: DateTime<Utc> },
    /// Emitted by the trigger listener for a matching triggered event.
    Triggered {
        /// Shared by every item fanned out from the same notification.
        trigger: Arc<TriggerNotification>,
        serialized: bool,
        loggable: bool,
    },
}

/// Immutable envelope handed from a producer to the dispatcher and then to
/// exactly one worker.
#[derive(Debug, Clone)]
pub struct ActionQueueItem {
    pub id: Uuid,
    pub path: String,
    pub source: ActionSource,
    pub action: ActionContent,
    pub enqueued_at: DateTime<Utc>,
}

impl ActionQueueItem {
    pub fn scheduled(path: impl Into<String>, action: ActionContent, due_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            source: ActionSource::Scheduled { due_at },
            action,
            enqueued_at: Utc::now(),
        }
    }

    pub fn triggered(
        path: impl Into<String>,
        action: ActionContent,
        trigger: Arc<TriggerNotification>,
        serialized: bool,
        loggable: bool,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            source: ActionSource::Triggered {
                trigger,
                serialized,
                loggable,
            },
            action,
            enqueued_at: Utc::now(),
        }
    }

    /// Only triggered events can be serialized.
    pub fn is_serialized(&self) -> bool {
        matches!(
            self.source,
            ActionSource::Triggered {
                serialized: true,
                ..
            }
        )
    }

    pub fn is_loggable(&self) -> bool {
        matches!(self.source, ActionSource::Triggered { loggable: true, .. })
    }

    pub fn trigger(&self) -> Option<&Arc<TriggerNotification>> {
        match &self.source {
            ActionSource::Triggered { trigger, .. } => Some(trigger),
            ActionSource::Scheduled { .. } => None,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self.source {
            ActionSource::Scheduled { .. } => "scheduled",
            ActionSource::Triggered { .. } => "triggered",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigger_payload_is_shared() {
        let trigger = Arc::new(TriggerNotification::new("sensor/1", "changed", serde_json::json!(1)));
        let a = ActionQueueItem::triggered("/A", ActionContent::new("a"), trigger.clone(), true, false);
        let b = ActionQueueItem::triggered("/B", ActionContent::new("b"), trigger.clone(), false, true);
        assert_eq!(Arc::strong_count(&trigger), 3);
        assert!(a.is_serialized());
        assert!(!b.is_serialized());
        assert!(b.is_loggable());
        drop(a);
        drop(b);
        assert_eq!(Arc::strong_count(&trigger), 1);
    }

    #[test]
    fn test_scheduled_item_is_never_serialized() {
        let item = ActionQueueItem::scheduled("/S", ActionContent::new("x"), Utc::now());
        assert!(!item.is_serialized());
        assert!(item.trigger().is_none());
        assert_eq!(item.kind_str(), "scheduled");
    }
}
