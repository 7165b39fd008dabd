//! Event definition commands operating directly on the definition store.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Local, Utc};
use clap::{Args, Subcommand};
use serde::Serialize;

use crate::adapters::SqliteDefinitionStore;
use crate::cli::display::{list_table, output, render_list, truncate, CommandOutput, DetailView};
use crate::domain::models::{path, Config, EventDefinition, EventKind, Location, StoredDefinition};
use crate::domain::ports::DefinitionStore;
use crate::services::next_fire::next_fire_after;

#[derive(Args, Debug)]
pub struct EventArgs {
    #[command(subcommand)]
    pub command: EventCommands,
}

#[derive(Subcommand, Debug)]
pub enum EventCommands {
    /// Validate a definition file and write it to the store
    Define {
        /// Event kind (scheduled, triggered, monitor)
        #[arg(short, long)]
        kind: Option<EventKind>,
        /// Event path, e.g. /plant/boiler/morning
        #[arg(short, long)]
        path: String,
        /// JSON or YAML definition file
        #[arg(short, long)]
        file: PathBuf,
    },
    /// Delete a stored definition
    Remove {
        /// Only remove if the stored definition has this kind
        #[arg(short, long)]
        kind: Option<EventKind>,
        /// Event path
        #[arg(short, long)]
        path: String,
    },
    /// List stored definitions
    List {
        /// Filter by kind
        #[arg(short, long)]
        kind: Option<EventKind>,
        /// Only list definitions under this scope
        #[arg(short, long, default_value = "/")]
        scope: String,
    },
    /// Show a stored definition
    Show {
        /// Event path
        path: String,
    },
}

pub fn execute(args: EventArgs, config: &Config, json_mode: bool) -> Result<()> {
    let store = SqliteDefinitionStore::open(&config.database)
        .context("Failed to open definition store")?;

    match args.command {
        EventCommands::Define { kind, path, file } => {
            let out = define(&store, kind, &path, &file)?;
            output(&out, json_mode);
        }
        EventCommands::Remove { kind, path } => {
            let out = remove(&store, kind, &path)?;
            output(&out, json_mode);
        }
        EventCommands::List { kind, scope } => {
            let out = list(&store, kind, &scope)?;
            output(&out, json_mode);
        }
        EventCommands::Show { path } => {
            let location = match (config.location.latitude, config.location.longitude) {
                (Some(lat), Some(lon)) => Some(Location::new(lat, lon)?),
                _ => None,
            };
            let out = show(&store, &path, location)?;
            output(&out, json_mode);
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct DefineOutput {
    pub path: String,
    pub kind: EventKind,
    pub serial: u64,
}

impl CommandOutput for DefineOutput {
    fn to_human(&self) -> String {
        crate::cli::display::action_success(&format!(
            "Stored {} event {} (serial {})",
            self.kind, self.path, self.serial
        ))
    }
}

/// Parse a definition file. YAML is accepted for `.yaml`/`.yml`; anything
/// else is read as JSON. A missing `kind` field is filled from `kind`.
pub fn parse_definition_file(
    event_path: &str,
    kind: Option<EventKind>,
    file: &Path,
) -> Result<EventDefinition> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let is_yaml = file
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));
    let mut value: serde_json::Value = if is_yaml {
        serde_yaml::from_str(&text).with_context(|| format!("Invalid YAML in {}", file.display()))?
    } else {
        serde_json::from_str(&text).with_context(|| format!("Invalid JSON in {}", file.display()))?
    };

    let Some(object) = value.as_object_mut() else {
        bail!("definition in {} must be an object", file.display());
    };
    match (object.get("kind").and_then(|k| k.as_str()), kind) {
        (None, Some(kind)) => {
            object.insert("kind".to_string(), serde_json::Value::from(kind.as_str()));
        }
        (None, None) => bail!("definition has no kind; pass --kind"),
        (Some(found), Some(kind)) if found != kind.as_str() => {
            bail!("definition kind '{found}' does not match --kind {kind}")
        }
        _ => {}
    }

    Ok(EventDefinition::decode(event_path, &value.to_string())?)
}

fn define(
    store: &dyn DefinitionStore,
    kind: Option<EventKind>,
    event_path: &str,
    file: &Path,
) -> Result<DefineOutput> {
    let event_path = path::normalize(event_path)?;
    let definition = parse_definition_file(&event_path, kind, file)?;
    let serial = store.write(&event_path, definition.kind(), &definition.encode()?)?;
    Ok(DefineOutput {
        path: event_path,
        kind: definition.kind(),
        serial,
    })
}

#[derive(Debug, Serialize)]
pub struct RemoveOutput {
    pub path: String,
    pub kind: EventKind,
}

impl CommandOutput for RemoveOutput {
    fn to_human(&self) -> String {
        crate::cli::display::action_success(&format!("Removed {} event {}", self.kind, self.path))
    }
}

fn remove(store: &dyn DefinitionStore, kind: Option<EventKind>, event_path: &str) -> Result<RemoveOutput> {
    let event_path = path::normalize(event_path)?;
    let stored = store.read(&event_path)?;
    if let Some(kind) = kind {
        if stored.kind != kind {
            bail!("{event_path} is a {} event, not {kind}", stored.kind);
        }
    }
    store.delete(&event_path)?;
    Ok(RemoveOutput {
        path: event_path,
        kind: stored.kind,
    })
}

#[derive(Debug, Serialize)]
pub struct DefinitionEntry {
    pub path: String,
    pub kind: EventKind,
    pub serial: u64,
    pub last_modified: String,
    pub summary: String,
    pub paused: bool,
}

impl DefinitionEntry {
    fn from_stored(stored: &StoredDefinition) -> Self {
        let (summary, paused) = match stored.decode() {
            Ok(definition) => summarize(&definition),
            Err(e) => (format!("malformed: {e}"), false),
        };
        Self {
            path: stored.path.clone(),
            kind: stored.kind,
            serial: stored.serial,
            last_modified: stored.last_modified.to_rfc3339(),
            summary,
            paused,
        }
    }
}

fn summarize(definition: &EventDefinition) -> (String, bool) {
    match definition {
        EventDefinition::Scheduled { schedule, action, paused } => {
            (format!("{} -> {action}", schedule.as_str()), *paused)
        }
        EventDefinition::Triggered { filter, action, paused, .. } => {
            let sources = if filter.sources.is_empty() {
                "*".to_string()
            } else {
                filter.sources.join(",")
            };
            (format!("on {sources} -> {action}"), *paused)
        }
        EventDefinition::Monitor { script, poll_ms, paused } => {
            (format!("every {poll_ms}ms: {script}"), *paused)
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DefinitionListOutput {
    pub definitions: Vec<DefinitionEntry>,
    pub total: usize,
}

impl CommandOutput for DefinitionListOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["path", "kind", "serial", "state", "summary"]);
        for entry in &self.definitions {
            table.add_row(vec![
                entry.path.clone(),
                entry.kind.to_string(),
                entry.serial.to_string(),
                if entry.paused { "paused" } else { "active" }.to_string(),
                truncate(&entry.summary, 60),
            ]);
        }
        render_list("definition", &table, self.total)
    }
}

fn list(store: &dyn DefinitionStore, kind: Option<EventKind>, scope: &str) -> Result<DefinitionListOutput> {
    let kinds: Vec<EventKind> = kind.map_or_else(|| EventKind::ALL.to_vec(), |k| vec![k]);
    let mut definitions = Vec::new();
    for kind in kinds {
        for event_path in store.list_paths(scope, kind)? {
            match store.read(&event_path) {
                Ok(stored) => definitions.push(DefinitionEntry::from_stored(&stored)),
                // Deleted between list and read.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
    }
    definitions.sort_by(|a, b| a.path.cmp(&b.path));
    let total = definitions.len();
    Ok(DefinitionListOutput { definitions, total })
}

#[derive(Debug, Serialize)]
pub struct DefinitionDetail {
    pub path: String,
    pub kind: EventKind,
    pub serial: u64,
    pub last_modified: String,
    pub next_fire: Option<String>,
    pub definition: serde_json::Value,
}

impl CommandOutput for DefinitionDetail {
    fn to_human(&self) -> String {
        let body = serde_json::to_string_pretty(&self.definition).unwrap_or_default();
        let mut view = DetailView::new(&self.path)
            .field("Kind", self.kind.as_str())
            .field("Serial", &self.serial.to_string())
            .field("Modified", &self.last_modified)
            .field_opt("Next fire", self.next_fire.as_deref())
            .section("Definition");
        for line in body.lines() {
            view = view.item(line);
        }
        view.render()
    }
}

fn show(store: &dyn DefinitionStore, event_path: &str, location: Option<Location>) -> Result<DefinitionDetail> {
    let event_path = path::normalize(event_path)?;
    let stored = store.read(&event_path)?;
    let definition = stored.decode()?;
    let next_fire = match &definition {
        EventDefinition::Scheduled { schedule, paused: false, .. } => {
            let now = Utc::now();
            next_fire_after(schedule, now, now, &Local, location)
                .ok()
                .flatten()
                .map(|t| t.with_timezone(&Local).to_rfc3339())
        }
        _ => None,
    };
    Ok(DefinitionDetail {
        path: stored.path.clone(),
        kind: stored.kind,
        serial: stored.serial,
        last_modified: stored.last_modified.to_rfc3339(),
        next_fire,
        definition: serde_json::to_value(&definition)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::MemoryDefinitionStore;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_define_fills_kind_from_flag() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(
            &dir,
            "morning.json",
            r#"{"schedule": {"type": "daily", "time": "07:30:00"}, "action": "lights.on"}"#,
        );
        let store = MemoryDefinitionStore::new();
        let out = define(&store, Some(EventKind::Scheduled), "/home//morning/", &file).unwrap();
        assert_eq!(out.path, "/home/morning");
        assert_eq!(out.kind, EventKind::Scheduled);
        assert_eq!(store.read("/home/morning").unwrap().kind, EventKind::Scheduled);
    }

    #[test]
    fn test_define_yaml_and_kind_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(
            &dir,
            "alarm.yaml",
            "kind: triggered\nfilter:\n  sources: [\"plant/boiler/*\"]\naction: notify\nserialized: true\n",
        );
        let store = MemoryDefinitionStore::new();
        assert!(define(&store, Some(EventKind::Monitor), "/alarm", &file).is_err());
        let out = define(&store, None, "/alarm", &file).unwrap();
        assert_eq!(out.kind, EventKind::Triggered);
    }

    #[test]
    fn test_define_rejects_invalid_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_file(
            &dir,
            "bad.json",
            r#"{"kind": "scheduled", "schedule": {"type": "interval", "every_ms": 0}, "action": "x"}"#,
        );
        let store = MemoryDefinitionStore::new();
        assert!(define(&store, None, "/bad", &file).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_checks_kind() {
        let store = MemoryDefinitionStore::new();
        let body = r#"{"kind":"monitor","script":"watch.lua"}"#;
        store.write("/m", EventKind::Monitor, body).unwrap();
        assert!(remove(&store, Some(EventKind::Scheduled), "/m").is_err());
        let out = remove(&store, None, "/m").unwrap();
        assert_eq!(out.kind, EventKind::Monitor);
        assert!(remove(&store, None, "/m").is_err());
    }

    #[test]
    fn test_list_reports_malformed_entries() {
        let store = MemoryDefinitionStore::new();
        store
            .write("/a/ok", EventKind::Monitor, r#"{"kind":"monitor","script":"w","paused":true}"#)
            .unwrap();
        store.write("/a/broken", EventKind::Monitor, "not json").unwrap();
        store
            .write("/b/other", EventKind::Monitor, r#"{"kind":"monitor","script":"w"}"#)
            .unwrap();

        let out = list(&store, None, "/a").unwrap();
        assert_eq!(out.total, 2);
        assert_eq!(out.definitions[0].path, "/a/broken");
        assert!(out.definitions[0].summary.starts_with("malformed"));
        assert!(out.definitions[1].paused);
    }

    #[test]
    fn test_show_interval_has_next_fire() {
        let store = MemoryDefinitionStore::new();
        store
            .write(
                "/tick",
                EventKind::Scheduled,
                r#"{"kind":"scheduled","schedule":{"type":"interval","every_ms":60000},"action":"tick"}"#,
            )
            .unwrap();
        let detail = show(&store, "/tick", None).unwrap();
        assert!(detail.next_fire.is_some());
        assert_eq!(detail.definition["action"], "tick");
    }
}
