//! Triggered (condition-driven) event model.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionContent;

/// A notification delivered by the trigger feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerNotification {
    /// Identity of whatever raised the trigger, e.g. `plant/boiler/temp`.
    pub source: String,
    /// Kind of notification, e.g. `changed`, `alarm`.
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
    #[serde(default = "Utc::now")]
    pub received_at: DateTime<Utc>,
}

impl TriggerNotification {
    pub fn new(source: impl Into<String>, kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            source: source.into(),
            kind: kind.into(),
            payload,
            received_at: Utc::now(),
        }
    }
}

/// Persistable trigger filter.
///
/// Empty lists accept anything. Source patterns match exactly, or by prefix
/// when they end in `*`. `fields` must all be present in an object payload
/// with equal values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TriggerFilter {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub kinds: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, serde_json::Value>,
}

impl TriggerFilter {
    pub fn source(mut self, pattern: impl Into<String>) -> Self {
        self.sources.push(pattern.into());
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kinds.push(kind.into());
        self
    }

    pub fn field(mut self, name: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn matches(&self, trigger: &TriggerNotification) -> bool {
        if !self.sources.is_empty()
            && !self
                .sources
                .iter()
                .any(|pattern| source_matches(pattern, &trigger.source))
        {
            return false;
        }

        if !self.kinds.is_empty() && !self.kinds.iter().any(|k| *k == trigger.kind) {
            return false;
        }

        if !self.fields.is_empty() {
            let Some(object) = trigger.payload.as_object() else {
                return false;
            };
            return self
                .fields
                .iter()
                .all(|(name, expected)| object.get(name) == Some(expected));
        }

        true
    }
}

fn source_matches(pattern: &str, source: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => source.starts_with(prefix),
        None => pattern == source,
    }
}

/// A configured condition-driven event, keyed by its path.
#[derive(Debug, Clone)]
pub struct TriggeredEvent {
    pub path: String,
    pub filter: TriggerFilter,
    pub action: ActionContent,
    /// At most one execution of this path may be in flight at a time.
    pub serialized: bool,
    /// Executions are logged at info level.
    pub loggable: bool,
    pub paused: bool,
}

impl TriggeredEvent {
    pub fn new(path: impl Into<String>, filter: TriggerFilter, action: ActionContent) -> Self {
        Self {
            path: path.into(),
            filter,
            action,
            serialized: false,
            loggable: false,
            paused: false,
        }
    }

    pub fn serialized(mut self, serialized: bool) -> Self {
        self.serialized = serialized;
        self
    }

    pub fn accepts(&self, trigger: &TriggerNotification) -> bool {
        !self.paused && self.filter.matches(trigger)
    }
}
