//! Adapters implementing the domain ports.

pub mod log_collaborators;
pub mod memory;
pub mod sqlite;
pub mod trigger_bus;

pub use log_collaborators::{LoggingActionEngine, LoggingMonitorRuntime};
pub use memory::MemoryDefinitionStore;
pub use sqlite::SqliteDefinitionStore;
pub use trigger_bus::{TriggerBus, TriggerBusConfig};
