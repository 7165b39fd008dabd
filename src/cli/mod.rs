//! Command-line interface for the `eventcore` binary.

pub mod commands;
pub mod display;
pub mod types;

pub use types::{Cli, Commands};

use std::path::Path;

use anyhow::Result;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;

/// Resolve configuration for a CLI invocation.
pub fn load_config(explicit: Option<&Path>) -> Result<Config> {
    match explicit {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Report a command failure and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let chain: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let body = serde_json::json!({
            "error": err.to_string(),
            "causes": chain,
        });
        eprintln!("{}", serde_json::to_string_pretty(&body).unwrap_or_default());
    } else {
        eprintln!("{}", display::action_failure(&format!("{err:#}")));
    }
    std::process::exit(1);
}
