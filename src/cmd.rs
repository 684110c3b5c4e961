//! Command implementations for the CLI interface.
//!
//! Each `cmd_*` handler opens what it needs from the data directory, runs one
//! operation and prints the outcome. Failures are printed to stderr and end
//! the process with a non-zero status.

use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use clap_complete::{generate, Shell};
use serde_json::Value;
use tracing::warn;

use crate::asana::{load_task_api_config, AsanaClient};
use crate::config::{Config, DataPaths};
use crate::engine::ChecklistEngine;
use crate::error::{ChecklistError, NoticeKind};
use crate::fields::*;
use crate::prefs::Preferences;
use crate::session::{self, Session};
use crate::store::{fields_from, DocumentStore};
use crate::task::Task;
use crate::tui::run::run_tui;

#[derive(Subcommand)]
pub enum Commands {
    /// Launch the interactive checklist.
    Ui,

    /// Manage the location this device is bound to.
    Location {
        #[command(subcommand)]
        action: LocationAction,
    },

    /// Inspect and edit phase task lists.
    Tasks {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// Merge documents from a JSON file into the store.
    ///
    /// The file maps collection names to documents by id:
    /// {"locations": {"waimea": {"Code": "LOC001", "Name": "Waimea"}}}
    Import {
        /// Path to the JSON file.
        input: PathBuf,
    },

    /// Generate shell completion scripts.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Subcommand)]
pub enum LocationAction {
    /// Bind this device to a location.
    Setup {
        /// Location code, e.g. LOC001. Case-insensitive.
        code: String,
        /// Passcode of an admin user.
        #[arg(long)]
        admin_code: String,
    },
    /// Forget the bound location.
    Reset {
        #[arg(long)]
        admin_code: String,
    },
    /// Show the bound location.
    Show,
}

#[derive(Subcommand)]
pub enum TaskAction {
    /// List the tasks of one or every phase.
    List {
        #[arg(long, value_enum)]
        phase: Option<Phase>,
        /// Also mirror tasks from the external task API.
        #[arg(long)]
        external: bool,
    },
    /// Add a custom task. Requires an admin passcode.
    Add {
        #[arg(value_enum)]
        phase: Phase,
        name: String,
        #[arg(long)]
        passcode: String,
    },
    /// List the suggested tasks of the bound location.
    Presets,
    /// Add a suggested task by its position in `tasks presets`.
    AddPreset {
        #[arg(value_enum)]
        phase: Phase,
        position: usize,
        #[arg(long)]
        passcode: String,
    },
    /// Move a custom task. Positions are those shown by `tasks list`.
    Move {
        #[arg(value_enum)]
        phase: Phase,
        from: usize,
        to: usize,
        #[arg(long)]
        admin_code: String,
    },
    /// Change a task description.
    Describe {
        #[arg(value_enum)]
        phase: Phase,
        id: String,
        description: String,
        #[arg(long)]
        admin_code: String,
    },
}

fn exit_with(context: &str, err: impl Display) -> ! {
    eprintln!("{context}: {err}");
    std::process::exit(1);
}

fn open_store(paths: &DataPaths) -> DocumentStore {
    DocumentStore::open(&paths.store())
        .unwrap_or_else(|e| exit_with(&format!("Failed to open store {}", paths.store().display()), e))
}

fn open_prefs(paths: &DataPaths) -> Preferences {
    Preferences::open(&paths.prefs())
        .unwrap_or_else(|e| exit_with("Failed to read preferences", e))
}

fn load_config(paths: &DataPaths) -> Config {
    Config::load(&paths.config()).unwrap_or_else(|e| exit_with("Failed to load config", e))
}

/// Engine for the bound location. Without a passcode the session is a plain
/// employee session that only reads.
fn open_engine(
    paths: &DataPaths,
    passcode: Option<&str>,
) -> Result<ChecklistEngine<DocumentStore>, ChecklistError> {
    let store = open_store(paths);
    let prefs = open_prefs(paths);
    let code = session::remembered_location(&prefs)?;
    let session = match passcode {
        Some(passcode) => session::login(&store, &code, passcode)?,
        None => {
            let location = session::verify_location_code(&store, &code)?;
            Session { role: Role::Employee, location_code: location.code, location: location.name }
        }
    };
    let mut engine = ChecklistEngine::new(store, load_config(paths), session);
    engine.attach()?;
    engine.sync();
    Ok(engine)
}

/// Print queued notices. Returns true if any of them is an error.
fn report_notices(engine: &mut ChecklistEngine<DocumentStore>) -> bool {
    let mut failed = false;
    for notice in engine.take_notices() {
        match notice.kind {
            NoticeKind::Error => {
                eprintln!("{}: {}", notice.title, notice.message);
                failed = true;
            }
            _ => println!("{}", notice.message),
        }
    }
    failed
}

/// Truncate a string to a maximum width, adding ellipsis if needed.
pub fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(width.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

/// Print tasks in a simple table. Positions are 1-based.
pub fn print_tasks(tasks: &[Task], location: &str) {
    println!("{:<4} {:<15} {:<9} {:<9} {}", "#", "ID", "Status", "Kind", "Name");
    for (i, t) in tasks.iter().enumerate() {
        let hint = t.hint_for(location).map(|h| format!(" ({h})")).unwrap_or_default();
        println!(
            "{:<4} {:<15} {:<9} {:<9} {}{}",
            i + 1,
            truncate(&t.id, 15),
            format_status(t.status),
            t.origin(),
            t.name,
            hint
        );
    }
}

/// Launch the interactive checklist.
pub fn cmd_ui(paths: &DataPaths) {
    if let Err(e) = run_tui(paths) {
        eprintln!("UI error: {e}");
        std::process::exit(1);
    }
}

pub fn cmd_location(paths: &DataPaths, action: LocationAction) {
    let store = open_store(paths);
    let mut prefs = open_prefs(paths);
    match action {
        LocationAction::Setup { code, admin_code } => {
            match session::bind_location(&store, &mut prefs, &code, &admin_code) {
                Ok(location) => println!("Bound to {} ({})", location.name, location.code),
                Err(e) => exit_with("Location setup failed", e),
            }
        }
        LocationAction::Reset { admin_code } => {
            match session::reset_location(&store, &mut prefs, &admin_code) {
                Ok(()) => println!("Location binding removed"),
                Err(e) => exit_with("Location reset failed", e),
            }
        }
        LocationAction::Show => {
            let code = session::remembered_location(&prefs)
                .unwrap_or_else(|e| exit_with("No location", e));
            match session::verify_location_code(&store, &code) {
                Ok(location) => println!("{} ({})", location.name, location.code),
                Err(e) => {
                    warn!(code = %code, "remembered location no longer exists");
                    exit_with("Bound location is invalid", e)
                }
            }
        }
    }
}

pub fn cmd_tasks(paths: &DataPaths, action: TaskAction) {
    match action {
        TaskAction::List { phase, external } => cmd_tasks_list(paths, phase, external),
        TaskAction::Add { phase, name, passcode } => {
            let mut engine = open_engine(paths, Some(&passcode))
                .unwrap_or_else(|e| exit_with("Login failed", e));
            match engine.add_task(phase, &name) {
                Ok(id) => println!("Added task {id} to {phase}"),
                Err(e) => exit_with("Failed to add task", e),
            }
        }
        TaskAction::Presets => {
            let mut engine =
                open_engine(paths, None).unwrap_or_else(|e| exit_with("Failed to open checklist", e));
            if let Err(e) = engine.load_pre_structured() {
                exit_with("Failed to load pre-structured tasks", e);
            }
            if engine.pre_structured().is_empty() {
                println!("No pre-structured tasks for {}", engine.session().location);
            }
            for (i, preset) in engine.pre_structured().iter().enumerate() {
                match &preset.description {
                    Some(desc) => println!("{:<4} {} - {}", i + 1, preset.name, desc),
                    None => println!("{:<4} {}", i + 1, preset.name),
                }
            }
        }
        TaskAction::AddPreset { phase, position, passcode } => {
            let mut engine = open_engine(paths, Some(&passcode))
                .unwrap_or_else(|e| exit_with("Login failed", e));
            let result = engine.load_pre_structured().and_then(|_| {
                engine.add_pre_structured(phase, position.saturating_sub(1))
            });
            match result {
                Ok(id) => println!("Added task {id} to {phase}"),
                Err(e) => exit_with("Failed to add task", e),
            }
        }
        TaskAction::Move { phase, from, to, admin_code } => {
            let mut engine =
                open_engine(paths, None).unwrap_or_else(|e| exit_with("Failed to open checklist", e));
            if let Err(e) = engine.enable_edit_mode(&admin_code) {
                exit_with("Edit mode denied", e);
            }
            let (Some(from), Some(to)) = (from.checked_sub(1), to.checked_sub(1)) else {
                exit_with("Invalid position", "positions start at 1");
            };
            if !engine.move_task(phase, from, to) {
                exit_with("Cannot move task", format!("position {} is not a custom task", from + 1));
            }
            if report_notices(&mut engine) {
                std::process::exit(1);
            }
            print_tasks(engine.tasks(phase), &engine.session().location);
        }
        TaskAction::Describe { phase, id, description, admin_code } => {
            let mut engine =
                open_engine(paths, None).unwrap_or_else(|e| exit_with("Failed to open checklist", e));
            if let Err(e) = engine.enable_edit_mode(&admin_code) {
                exit_with("Edit mode denied", e);
            }
            if let Err(e) = engine.edit_description(phase, &id, &description) {
                exit_with("Failed to update description", e);
            }
            if report_notices(&mut engine) {
                std::process::exit(1);
            }
            if engine.task(phase, &id).is_some_and(|t| t.required) {
                println!("Note: descriptions of required tasks are not stored and reset on next launch");
            }
        }
    }
}

fn cmd_tasks_list(paths: &DataPaths, phase: Option<Phase>, external: bool) {
    let mut engine =
        open_engine(paths, None).unwrap_or_else(|e| exit_with("Failed to open checklist", e));

    if external {
        let loaded = load_task_api_config(engine.store(), &engine.session().location).and_then(|api| {
            let token = api.access_token.clone().unwrap_or_default();
            let client = AsanaClient::new(&engine.config().task_api_base_url, &token);
            engine.connect_task_api(Box::new(client), &api);
            engine.load_external_tasks()
        });
        if let Err(e) = loaded {
            eprintln!("Warning: external tasks unavailable: {e}");
        }
    }

    let phases: Vec<Phase> = match phase {
        Some(p) => vec![p],
        None => Phase::ALL.to_vec(),
    };
    for (i, p) in phases.into_iter().enumerate() {
        if i > 0 {
            println!();
        }
        let marker = if engine.is_fully_processed(p) && !engine.tasks(p).is_empty() { " ✓" } else { "" };
        println!("== {p} ({:.0}%){marker} ==", engine.completion_percentage(p));
        if engine.tasks(p).is_empty() {
            println!("(no tasks)");
        } else {
            print_tasks(engine.tasks(p), &engine.session().location);
        }
    }
}

/// Merge a `{collection: {id: {fields}}}` file into the store.
pub fn cmd_import(paths: &DataPaths, input: &Path) {
    let raw = fs::read_to_string(input)
        .unwrap_or_else(|e| exit_with(&format!("Failed to read '{}'", input.display()), e));
    let collections: BTreeMap<String, BTreeMap<String, Value>> = serde_json::from_str(&raw)
        .unwrap_or_else(|e| exit_with("Invalid import file", e));

    let mut store = open_store(paths);
    let mut imported = 0;
    let mut skipped = 0;
    for (collection, docs) in collections {
        for (id, value) in docs {
            if !value.is_object() {
                eprintln!("Warning: {collection}/{id} is not an object. Skipping.");
                skipped += 1;
                continue;
            }
            if let Err(e) = store.merge_document(&collection, &id, fields_from(value)) {
                exit_with(&format!("Failed to write {collection}/{id}"), e);
            }
            imported += 1;
        }
    }
    println!("Imported {imported} documents ({skipped} skipped)");
}

/// Generate shell completion scripts.
pub fn cmd_completions(shell: Shell) {
    use clap::CommandFactory;
    use crate::cli::Cli;

    let mut app = Cli::command();
    let app_name = app.get_name().to_string();
    generate(shell, &mut app, app_name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_adds_ellipsis() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("1712345678901", 6), "17123…");
    }
}
