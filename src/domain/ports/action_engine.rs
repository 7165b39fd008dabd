//! Port for the collaborator that performs the side effects of an action.

use std::sync::Arc;

use thiserror::Error;

use crate::domain::models::{ActionContent, TriggerNotification};

/// Failure reported by an action engine. Caught and logged by the worker.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ActionError {
    pub message: String,
}

impl ActionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Context handed to the action engine alongside the action content.
#[derive(Debug, Clone)]
pub struct RuntimeContext {
    pub path: String,
    pub kind: &'static str,
    pub worker: usize,
    pub trigger: Option<Arc<TriggerNotification>>,
}

/// Executes action content synchronously on a worker thread.
pub trait ActionEngine: Send + Sync {
    fn execute(&self, action: &ActionContent, context: &RuntimeContext) -> Result<(), ActionError>;
}

impl<F> ActionEngine for F
where
    F: Fn(&ActionContent, &RuntimeContext) -> Result<(), ActionError> + Send + Sync,
{
    fn execute(&self, action: &ActionContent, context: &RuntimeContext) -> Result<(), ActionError> {
        self(action, context)
    }
}
