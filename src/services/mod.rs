pub mod action_queue;
pub mod dispatcher;
pub mod engine;
pub mod management;
pub mod monitor_host;
pub mod next_fire;
pub mod registry;
pub mod schedule_store;
pub mod scheduler_loop;
pub mod solar;
pub mod stats;
pub mod trigger_listener;
pub mod worker_pool;

pub use action_queue::{ActionQueue, QueueError};
pub use dispatcher::Dispatcher;
pub use engine::{Collaborators, Engine, EngineError};
pub use management::EventManager;
pub use monitor_host::MonitorHost;
pub use registry::{EventRegistry, Registration, ReloadOutcome};
pub use schedule_store::{Admission, DueFire, ScheduleStore};
pub use scheduler_loop::SchedulerLoop;
pub use stats::{EngineCounters, EngineStats};
pub use trigger_listener::TriggerListener;
pub use worker_pool::{Placement, PoolSnapshot, WorkerPool};
