use std::path::PathBuf;

use clap::Parser;

use crate::cmd::Commands;

/// Shift checklist for retail locations.
/// State lives in ~/.shiftlist or a directory passed via --data-dir.
#[derive(Parser)]
#[command(name = "shiftlist", version, about = "Shift task checklist")]
pub struct Cli {
    /// Directory holding the store, preferences, config and log file.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log filter, e.g. "info" or "shiftlist=debug". SHIFTLIST_LOG overrides it.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}
