//! Domain models for the eventcore engine.

pub mod action;
pub mod config;
pub mod definition;
pub mod monitor;
pub mod path;
pub mod schedule;
pub mod triggered;

pub use action::{ActionContent, ActionQueueItem, ActionSource};
pub use config::{Config, DatabaseConfig, EngineConfig, LocationConfig, LoggingConfig};
pub use definition::{EventDefinition, EventKind, StoredDefinition};
pub use monitor::EventMonitor;
pub use schedule::{
    Location, ScheduleInfo, ScheduleKind, ScheduledEvent, SunEvent, WeekdayMask,
};
pub use triggered::{TriggerFilter, TriggerNotification, TriggeredEvent};
