//! Domain layer for the eventcore engine
//!
//! This module contains the event models, the collaborator ports and the
//! domain error type.

pub mod errors;
pub mod models;
pub mod ports;

pub use errors::{DomainError, DomainResult};
