//! Persisted event definitions.
//!
//! The definition store holds opaque text blobs. This module is the only
//! place that knows their encoding (JSON) and how a decoded definition
//! becomes an in-memory event record.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action::ActionContent;
use super::monitor::EventMonitor;
use super::schedule::{ScheduleKind, ScheduledEvent};
use super::triggered::{TriggerFilter, TriggeredEvent};
use crate::domain::errors::{DomainError, DomainResult};

/// The three kinds of configurable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Scheduled,
    Triggered,
    Monitor,
}

impl EventKind {
    pub const ALL: [Self; 3] = [Self::Scheduled, Self::Triggered, Self::Monitor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Triggered => "triggered",
            Self::Monitor => "monitor",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" | "schedule" => Ok(Self::Scheduled),
            "triggered" | "trigger" => Ok(Self::Triggered),
            "monitor" => Ok(Self::Monitor),
            other => Err(format!(
                "unknown event kind '{other}' (expected scheduled, triggered or monitor)"
            )),
        }
    }
}

const fn default_monitor_poll_ms() -> u64 {
    1000
}

/// Decoded form of a persisted definition blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventDefinition {
    Scheduled {
        schedule: ScheduleKind,
        action: ActionContent,
        #[serde(default)]
        paused: bool,
    },
    Triggered {
        #[serde(default)]
        filter: TriggerFilter,
        action: ActionContent,
        #[serde(default)]
        serialized: bool,
        #[serde(default)]
        loggable: bool,
        #[serde(default)]
        paused: bool,
    },
    Monitor {
        script: String,
        #[serde(default = "default_monitor_poll_ms")]
        poll_ms: u64,
        #[serde(default)]
        paused: bool,
    },
}

impl EventDefinition {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Scheduled { .. } => EventKind::Scheduled,
            Self::Triggered { .. } => EventKind::Triggered,
            Self::Monitor { .. } => EventKind::Monitor,
        }
    }

    /// Decode and validate a stored blob.
    pub fn decode(path: &str, body: &str) -> DomainResult<Self> {
        let definition: Self =
            serde_json::from_str(body).map_err(|e| DomainError::MalformedDefinition {
                path: path.to_string(),
                reason: e.to_string(),
            })?;
        definition.validate(path)?;
        Ok(definition)
    }

    pub fn encode(&self) -> DomainResult<String> {
        serde_json::to_string(self).map_err(|e| DomainError::Storage(e.to_string()))
    }

    pub fn validate(&self, path: &str) -> DomainResult<()> {
        let malformed = |reason: String| DomainError::MalformedDefinition {
            path: path.to_string(),
            reason,
        };
        match self {
            Self::Scheduled { schedule, .. } => schedule.validate().map_err(malformed),
            Self::Monitor { poll_ms, .. } if *poll_ms == 0 => {
                Err(malformed("monitor poll interval must be greater than zero".to_string()))
            }
            _ => Ok(()),
        }
    }

    fn mismatch(&self, path: &str, expected: EventKind) -> DomainError {
        DomainError::KindMismatch {
            path: path.to_string(),
            expected,
            found: self.kind(),
        }
    }

    pub fn into_scheduled(self, path: &str) -> DomainResult<ScheduledEvent> {
        self.validate(path)?;
        match self {
            Self::Scheduled {
                schedule,
                action,
                paused,
            } => {
                let mut event = ScheduledEvent::new(path, schedule, action);
                event.paused = paused;
                Ok(event)
            }
            other => Err(other.mismatch(path, EventKind::Scheduled)),
        }
    }

    pub fn into_triggered(self, path: &str) -> DomainResult<TriggeredEvent> {
        match self {
            Self::Triggered {
                filter,
                action,
                serialized,
                loggable,
                paused,
            } => Ok(TriggeredEvent {
                path: path.to_string(),
                filter,
                action,
                serialized,
                loggable,
                paused,
            }),
            other => Err(other.mismatch(path, EventKind::Triggered)),
        }
    }

    pub fn into_monitor(self, path: &str) -> DomainResult<EventMonitor> {
        match self {
            Self::Monitor {
                script,
                poll_ms,
                paused,
            } => {
                let mut monitor = EventMonitor::new(path, script, Duration::from_millis(poll_ms));
                monitor.paused = paused;
                Ok(monitor)
            }
            other => Err(other.mismatch(path, EventKind::Monitor)),
        }
    }
}

/// A raw record as held by the definition store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDefinition {
    pub path: String,
    pub kind: EventKind,
    /// Store-assigned serial, bumped on every write.
    pub serial: u64,
    pub last_modified: DateTime<Utc>,
    pub body: String,
}

impl StoredDefinition {
    pub fn decode(&self) -> DomainResult<EventDefinition> {
        let definition = EventDefinition::decode(&self.path, &self.body)?;
        if definition.kind() != self.kind {
            return Err(DomainError::KindMismatch {
                path: self.path.clone(),
                expected: self.kind,
                found: definition.kind(),
            });
        }
        Ok(definition)
    }
}
