//! eventcore - automation event engine
//!
//! Stores a tree of event definitions (scheduled, triggered and monitor
//! events), keeps them in memory, and turns schedule fires and trigger
//! notifications into action queue items executed on a bounded pool of
//! worker threads.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): Event models, errors and collaborator ports
//! - **Service Layer** (`services`): Registry, scheduler, dispatcher, worker pool, engine
//! - **Adapters** (`adapters`): SQLite and in-memory stores, trigger bus, logging collaborators
//! - **Infrastructure Layer** (`infrastructure`): Configuration and logging
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use eventcore::adapters::{LoggingActionEngine, LoggingMonitorRuntime, MemoryDefinitionStore, TriggerBus};
//! use eventcore::services::{Collaborators, Engine};
//!
//! let bus = Arc::new(TriggerBus::default());
//! let engine = Engine::start(&Config::default(), Collaborators {
//!     store: Arc::new(MemoryDefinitionStore::new()),
//!     actions: Arc::new(LoggingActionEngine::new()),
//!     feed: bus.clone(),
//!     monitors: Arc::new(LoggingMonitorRuntime),
//! })?;
//! engine.shutdown();
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    ActionContent, Config, EventDefinition, EventKind, ScheduleKind, TriggerFilter,
    TriggerNotification,
};
pub use domain::ports::{ActionEngine, DefinitionStore, MonitorRuntime, TriggerFeed};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{Collaborators, Engine, EngineStats, EventManager};
