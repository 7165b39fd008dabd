//! `eventcore run`: host the engine in the foreground.
//!
//! Each stdin line is a JSON control message. Lines with an `op` field
//! drive the management API; anything else is published as a trigger
//! notification. EOF shuts the engine down.

use std::io::{self, BufRead};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde::{Deserialize, Serialize};

use crate::adapters::{LoggingActionEngine, LoggingMonitorRuntime, SqliteDefinitionStore, TriggerBus};
use crate::cli::display::{list_table, output, render_list, CommandOutput};
use crate::domain::errors::DomainResult;
use crate::domain::models::{Config, EventKind, ScheduleInfo, TriggerNotification};
use crate::domain::ports::ActionEngine;
use crate::infrastructure::config::ConfigLoader;
use crate::services::{Collaborators, Engine, EngineStats};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Override the configured worker count
    #[arg(short, long)]
    pub workers: Option<usize>,

    /// Sleep this long inside every action (makes concurrency observable)
    #[arg(long)]
    pub action_delay_ms: Option<u64>,
}

/// A management request read from stdin.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ControlMessage {
    Reload { kind: EventKind },
    Add { kind: EventKind, path: String },
    Update { kind: EventKind, path: String },
    Delete { kind: EventKind, path: String },
    Pause { kind: EventKind, path: String },
    Resume { kind: EventKind, path: String },
    Rename { kind: EventKind, parent: String, old_name: String, new_name: String },
    RenameScope { kind: EventKind, parent: String, old_name: String, new_name: String },
    Location { latitude: f64, longitude: f64 },
    Schedule { path: String },
    Schedules,
    Stats,
    Ping,
}

/// One parsed stdin line.
#[derive(Debug, PartialEq)]
pub enum InputLine {
    Control(ControlMessage),
    Trigger(TriggerNotification),
}

pub fn parse_line(line: &str) -> Result<InputLine> {
    let value: serde_json::Value = serde_json::from_str(line).context("input is not JSON")?;
    if value.get("op").is_some() {
        let message = serde_json::from_value(value).context("invalid control message")?;
        Ok(InputLine::Control(message))
    } else {
        let notification = serde_json::from_value(value).context("invalid trigger notification")?;
        Ok(InputLine::Trigger(notification))
    }
}

#[derive(Debug, Serialize)]
pub struct StatsOutput {
    #[serde(flatten)]
    pub stats: EngineStats,
}

impl CommandOutput for StatsOutput {
    fn to_human(&self) -> String {
        let s = &self.stats;
        [
            format!("change serial:     {}", s.change_serial),
            format!("scheduled events:  {}", s.scheduled_events),
            format!("triggered events:  {}", s.triggered_events),
            format!("monitors running:  {}", s.monitors_running),
            format!("queued:            {} (+{} on workers)", s.queued, s.worker_queued),
            format!("active workers:    {} ({} executing)", s.active_workers, s.executing),
            format!("peak concurrency:  {}", s.peak_concurrency),
            format!("scheduled fires:   {}", s.scheduled_fires),
            format!("trigger matches:   {}", s.trigger_matches),
            format!("executed:          {} ({} failed)", s.executed, s.failed),
            format!("dropped:           {} (lagged {})", s.dropped, s.lagged),
        ]
        .join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub clean_shutdown: bool,
    pub triggers_published: u64,
    pub stats: EngineStats,
}

impl CommandOutput for RunSummary {
    fn to_human(&self) -> String {
        let headline = if self.clean_shutdown {
            crate::cli::display::action_success("Engine stopped")
        } else {
            crate::cli::display::action_failure("Engine stopped; some threads did not exit in time")
        };
        format!(
            "{headline}\ntriggers published: {}\n{}",
            self.triggers_published,
            StatsOutput { stats: self.stats.clone() }.to_human()
        )
    }
}

#[derive(Debug, Serialize)]
struct ScheduleOutput(ScheduleInfo);

#[derive(Debug, Serialize)]
struct ScheduleListOutput {
    schedules: Vec<ScheduleInfo>,
}

impl CommandOutput for ScheduleListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["path", "type", "next fire", "fired"]);
        for info in &self.schedules {
            let next = if info.paused {
                "paused".to_string()
            } else {
                info.next_fire
                    .map_or_else(|| "unscheduled".to_string(), |t| t.to_rfc3339())
            };
            table.add_row(vec![
                info.path.clone(),
                info.schedule.as_str().to_string(),
                next,
                info.fire_count.to_string(),
            ]);
        }
        render_list("schedule", &table, self.schedules.len())
    }
}

impl CommandOutput for ScheduleOutput {
    fn to_human(&self) -> String {
        let info = &self.0;
        let next = info
            .next_fire
            .map_or_else(|| "unscheduled".to_string(), |t| t.to_rfc3339());
        format!(
            "{} [{}{}] next: {next}, fired {} time(s)",
            info.path,
            info.schedule.as_str(),
            if info.paused { ", paused" } else { "" },
            info.fire_count
        )
    }
}

pub fn execute(args: RunArgs, config: &Config, json_mode: bool) -> Result<()> {
    let mut config = config.clone();
    if let Some(workers) = args.workers {
        config.engine.worker_count = workers;
        ConfigLoader::validate(&config)?;
    }

    let store = Arc::new(
        SqliteDefinitionStore::open(&config.database).context("Failed to open definition store")?,
    );
    let bus = Arc::new(TriggerBus::default());
    let actions: Arc<dyn ActionEngine> = Arc::new(match args.action_delay_ms {
        Some(ms) => LoggingActionEngine::with_delay(Duration::from_millis(ms)),
        None => LoggingActionEngine::new(),
    });

    let engine = Engine::start(
        &config,
        Collaborators {
            store,
            actions,
            feed: bus.clone(),
            monitors: Arc::new(LoggingMonitorRuntime),
        },
    )?;
    tracing::info!(
        workers = config.engine.worker_count,
        database = %config.database.path,
        "engine running; reading control messages from stdin"
    );

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(InputLine::Trigger(notification)) => {
                bus.publish(notification);
            }
            Ok(InputLine::Control(message)) => {
                if let Err(e) = apply(&engine, message, json_mode) {
                    tracing::warn!(error = %e, "control message failed");
                }
            }
            Err(e) => tracing::warn!(error = %format!("{e:#}"), "ignoring input line"),
        }
    }

    bus.close();
    let clean_shutdown = engine.shutdown();
    output(
        &RunSummary {
            clean_shutdown,
            triggers_published: bus.published(),
            stats: engine.stats(),
        },
        json_mode,
    );
    Ok(())
}

fn apply(engine: &Engine, message: ControlMessage, json_mode: bool) -> DomainResult<()> {
    let manager = engine.manager();
    let serial = match message {
        ControlMessage::Reload { kind } => manager.reload_list(kind)?,
        ControlMessage::Add { kind, path } => manager.add_event(kind, &path)?,
        ControlMessage::Update { kind, path } => manager.update_event(kind, &path)?,
        ControlMessage::Delete { kind, path } => manager.delete_event(kind, &path)?,
        ControlMessage::Pause { kind, path } => manager.pause_event(kind, &path, true)?,
        ControlMessage::Resume { kind, path } => manager.pause_event(kind, &path, false)?,
        ControlMessage::Rename { kind, parent, old_name, new_name } => {
            manager.rename_event(kind, &parent, &old_name, &new_name)?
        }
        ControlMessage::RenameScope { kind, parent, old_name, new_name } => {
            manager.rename_scope(kind, &parent, &old_name, &new_name)?
        }
        ControlMessage::Location { latitude, longitude } => {
            manager.set_location_info(latitude, longitude)?
        }
        ControlMessage::Schedule { path } => {
            output(&ScheduleOutput(manager.query_schedule_info(&path)?), json_mode);
            return Ok(());
        }
        ControlMessage::Schedules => {
            let schedules = manager.registry().schedule_infos();
            output(&ScheduleListOutput { schedules }, json_mode);
            return Ok(());
        }
        ControlMessage::Stats => {
            output(&StatsOutput { stats: engine.stats() }, json_mode);
            return Ok(());
        }
        ControlMessage::Ping => manager.ping(),
    };
    tracing::info!(serial, "control message applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_control_message() {
        let parsed = parse_line(r#"{"op": "pause", "kind": "scheduled", "path": "/a"}"#).unwrap();
        assert_eq!(
            parsed,
            InputLine::Control(ControlMessage::Pause {
                kind: EventKind::Scheduled,
                path: "/a".to_string()
            })
        );
        assert_eq!(parse_line(r#"{"op": "stats"}"#).unwrap(), InputLine::Control(ControlMessage::Stats));
    }

    #[test]
    fn test_parse_trigger_notification() {
        match parse_line(r#"{"source": "plant/boiler/temp", "kind": "changed", "payload": {"value": 81}}"#)
            .unwrap()
        {
            InputLine::Trigger(n) => {
                assert_eq!(n.source, "plant/boiler/temp");
                assert_eq!(n.payload["value"], 81);
            }
            other => panic!("expected trigger, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_line("not json").is_err());
        assert!(parse_line(r#"{"op": "explode"}"#).is_err());
        assert!(parse_line(r#"{"kind": "changed"}"#).is_err());
    }
}
