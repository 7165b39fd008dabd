//! CLI type definitions
//!
//! This module contains clap command structures that define the CLI interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use super::commands::event::EventArgs;
use super::commands::run::RunArgs;

#[derive(Parser)]
#[command(name = "eventcore")]
#[command(about = "eventcore - scheduled and triggered automation events", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Load configuration from this file instead of the .eventcore hierarchy
    #[arg(short, long, global = true, env = "EVENTCORE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the engine until stdin closes
    Run(RunArgs),

    /// Manage stored event definitions
    Event(EventArgs),
}
