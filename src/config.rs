//! Runtime configuration.
//!
//! Recognised passcodes are data, not code: the completion allow-list and the
//! admin master code are read from `config.json` in the data directory.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ChecklistError;
use crate::playback::Playlist;

/// Files kept in the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub root: PathBuf,
}

impl DataPaths {
    pub fn new(root: PathBuf) -> Self {
        DataPaths { root }
    }

    /// `~/.shiftlist`, or `./.shiftlist` when HOME is unset.
    pub fn default_root() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".shiftlist")
    }

    pub fn store(&self) -> PathBuf {
        self.root.join("store.json")
    }

    pub fn prefs(&self) -> PathBuf {
        self.root.join("prefs.json")
    }

    pub fn config(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn log(&self) -> PathBuf {
        self.root.join("shiftlist.log")
    }
}

/// Settings loaded from `config.json`. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Shared passcodes accepted when submitting staged completions.
    pub completion_codes: Vec<String>,
    /// Code that enables edit mode in addition to `settings/admin.validCodes`.
    pub admin_master_code: Option<String>,
    /// Maximum digits accepted by passcode entry.
    pub passcode_length: usize,
    /// Site names that get a hint slot on newly created tasks.
    pub locations: Vec<String>,
    pub task_api_base_url: String,
    /// Task ids that open playback instead of being staged.
    pub playback_task_ids: Vec<String>,
    /// Case-insensitive name fragment that marks a playback task.
    pub playback_keyword: String,
    pub playlists: Vec<Playlist>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            completion_codes: Vec::new(),
            admin_master_code: None,
            passcode_length: 6,
            locations: vec!["Waimea".into(), "CMP".into(), "Hanalei".into()],
            task_api_base_url: "https://app.asana.com/api/1.0".into(),
            playback_task_ids: vec!["13".into()],
            playback_keyword: "music".into(),
            playlists: vec![
                Playlist::new(1, "JoJo's Classics", "Our signature upbeat mix"),
                Playlist::new(2, "Island Vibes", "Authentic Hawaiian music"),
                Playlist::new(3, "Summer Hits", "Popular summer songs"),
                Playlist::new(4, "Relaxed Atmosphere", "Calm instrumental tracks"),
            ],
        }
    }
}

impl Config {
    /// Load configuration, falling back to defaults when the file doesn't exist.
    pub fn load(path: &Path) -> Result<Self, ChecklistError> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let raw = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)
            .map_err(|e| ChecklistError::Config(format!("{}: {e}", path.display())))?;
        if config.passcode_length == 0 {
            return Err(ChecklistError::Config("passcodeLength must be at least 1".into()));
        }
        Ok(config)
    }

    pub fn accepts_completion_code(&self, code: &str) -> bool {
        !code.is_empty() && self.completion_codes.iter().any(|c| c == code)
    }

    pub fn is_master_code(&self, code: &str) -> bool {
        !code.is_empty() && self.admin_master_code.as_deref() == Some(code)
    }

    /// Whether staging this task should open playback instead.
    pub fn is_playback_task(&self, id: &str, name: &str) -> bool {
        self.playback_task_ids.iter().any(|p| p == id)
            || (!self.playback_keyword.is_empty()
                && name.to_lowercase().contains(&self.playback_keyword.to_lowercase()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert!(!config.accepts_completion_code("1234"));
    }

    #[test]
    fn test_partial_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"completionCodes":["1234","56789"],"adminMasterCode":"123456"}"#)
            .unwrap();
        let config = Config::load(&path).unwrap();
        assert!(config.accepts_completion_code("56789"));
        assert!(!config.accepts_completion_code(""));
        assert!(config.is_master_code("123456"));
        assert_eq!(config.passcode_length, 6);
        assert_eq!(config.playlists.len(), 4);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"passcodeLength":0}"#).unwrap();
        assert!(matches!(Config::load(&path), Err(ChecklistError::Config(_))));
        fs::write(&path, "[").unwrap();
        assert!(matches!(Config::load(&path), Err(ChecklistError::Config(_))));
    }

    #[test]
    fn test_playback_detection() {
        let config = Config::default();
        assert!(config.is_playback_task("13", "Anything"));
        assert!(config.is_playback_task("X", "Start MUSIC"));
        assert!(!config.is_playback_task("1", "Clock In"));
    }
}
