//! CLI command implementations.

pub mod event;
pub mod run;
