//! Port trait definitions (Hexagonal Architecture)
//!
//! Collaborators the engine talks to only through these traits:
//! - DefinitionStore: persisted tree of event definitions
//! - ActionEngine: performs the side effects of a fired event
//! - TriggerFeed: publish/subscribe source of trigger notifications
//! - MonitorRuntime: scripting runtime for long-lived event monitors

pub mod action_engine;
pub mod definition_store;
pub mod monitor_runtime;
pub mod trigger_feed;

pub use action_engine::{ActionEngine, ActionError, RuntimeContext};
pub use definition_store::DefinitionStore;
pub use monitor_runtime::{MonitorRuntime, StopSignal};
pub use trigger_feed::{FeedEvent, TriggerFeed, TriggerSubscription};
