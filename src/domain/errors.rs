//! Domain errors for the eventcore engine.

use thiserror::Error;

use super::models::EventKind;

/// Configuration errors surfaced synchronously to callers of the
/// management API and the persistence port.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("{kind} event already exists: {path}")]
    DuplicatePath { kind: EventKind, path: String },

    #[error("{kind} event not found: {path}")]
    NotFound { kind: EventKind, path: String },

    #[error("No definition stored at {0}")]
    DefinitionNotFound(String),

    #[error("Malformed definition at {path}: {reason}")]
    MalformedDefinition { path: String, reason: String },

    #[error("Definition at {path} is a {found} event, expected {expected}")]
    KindMismatch {
        path: String,
        expected: EventKind,
        found: EventKind,
    },

    #[error("Invalid event path: {0}")]
    InvalidPath(String),

    #[error("Invalid location: latitude {latitude}, longitude {longitude}")]
    InvalidLocation { latitude: f64, longitude: f64 },

    #[error("Location is not configured; sun-relative schedules cannot be computed")]
    LocationUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    pub fn not_found(kind: EventKind, path: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            path: path.into(),
        }
    }

    pub fn duplicate(kind: EventKind, path: impl Into<String>) -> Self {
        Self::DuplicatePath {
            kind,
            path: path.into(),
        }
    }

    /// True for a missing event or a missing stored definition.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::DefinitionNotFound(_))
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Storage(err.to_string())
    }
}
