//! # shiftlist - Shift Task Checklist
//!
//! A terminal checklist for the opening, prep, mid and closing shifts of a
//! retail location, with a CLI for setup and admin chores.
//!
//! ## Key Features
//!
//! - **Template plus custom tasks**: every phase starts from a built-in list of
//!   required tasks, followed by the custom tasks stored for that phase
//! - **Staged completion**: marking tasks done or skipped only stages the change;
//!   a shared completion passcode commits the whole batch at once
//! - **Live updates**: phase documents are watched, so tasks added or reordered
//!   elsewhere show up without a restart
//! - **Admin edit mode**: reorder custom tasks and edit descriptions
//! - **External tasks**: optionally mirror tasks from an Asana-style task API
//!
//! ## Quick Start
//!
//! ```bash
//! # Load locations, users and tasks
//! shiftlist import data/seed.json
//!
//! # Bind this device to a location (needs an admin passcode)
//! shiftlist location setup LOC001 --admin-code 999999
//!
//! # Run the checklist
//! shiftlist ui
//! ```
//!
//! Data is stored in `~/.shiftlist/`: `store.json` holds the documents,
//! `prefs.json` the bound location and `config.json` the accepted passcodes.

use std::fs::OpenOptions;
use std::sync::Mutex;

use clap::Parser;
use tracing_subscriber::EnvFilter;

pub mod asana;
pub mod cli;
pub mod cmd;
pub mod config;
pub mod engine;
pub mod error;
pub mod fields;
pub mod passcode;
pub mod playback;
pub mod prefs;
pub mod session;
pub mod store;
pub mod task;
pub mod template;
pub mod tui {
    pub mod colors;
    pub mod app;
    pub mod enums;
    pub mod input;
    pub mod keypad;
    pub mod run;
    pub mod utils;
}

use cli::Cli;
use cmd::*;
use config::DataPaths;

/// Set up tracing. The TUI owns the terminal, so it logs to a file instead.
fn init_logging(level: &str, paths: &DataPaths, to_file: bool) {
    let filter = EnvFilter::try_from_env("SHIFTLIST_LOG")
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    if to_file {
        match OpenOptions::new().create(true).append(true).open(paths.log()) {
            Ok(file) => {
                tracing_subscriber::fmt()
                    .with_env_filter(filter)
                    .with_writer(Mutex::new(file))
                    .with_ansi(false)
                    .init();
            }
            Err(e) => eprintln!("Failed to open log file {}: {}", paths.log().display(), e),
        }
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }
}

fn main() {
    let cli = Cli::parse();

    let paths = DataPaths::new(cli.data_dir.clone().unwrap_or_else(DataPaths::default_root));
    if let Err(e) = std::fs::create_dir_all(&paths.root) {
        eprintln!("Failed to create data directory {}: {}", paths.root.display(), e);
        std::process::exit(1);
    }

    init_logging(&cli.log_level, &paths, matches!(cli.command, Commands::Ui));

    match cli.command {
        Commands::Ui => cmd_ui(&paths),
        Commands::Location { action } => cmd_location(&paths, action),
        Commands::Tasks { action } => cmd_tasks(&paths, action),
        Commands::Import { input } => cmd_import(&paths, &input),
        Commands::Completions { shell } => cmd_completions(shell),
    }
}
