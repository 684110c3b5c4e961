//! Local key-value persistence.
//!
//! Only one key is used in practice: the remembered location code, which lets
//! the login screen skip location entry on later launches.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

/// Key under which the bound location code is remembered.
pub const LOCATION_CODE_KEY: &str = "locationCode";

/// String preferences stored as a flat JSON object.
#[derive(Debug)]
pub struct Preferences {
    path: PathBuf,
    values: BTreeMap<String, String>,
}

impl Preferences {
    /// Load preferences from disk. A missing file means no preferences yet.
    pub fn open(path: &Path) -> std::io::Result<Self> {
        let values = if path.exists() {
            let mut buf = String::new();
            File::open(path)?.read_to_string(&mut buf)?;
            serde_json::from_str(&buf)?
        } else {
            BTreeMap::new()
        };
        Ok(Preferences { path: path.to_path_buf(), values })
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: &str) -> std::io::Result<()> {
        let mut values = self.values.clone();
        values.insert(key.to_string(), value.to_string());
        self.commit(values)
    }

    pub fn remove(&mut self, key: &str) -> std::io::Result<()> {
        if !self.values.contains_key(key) {
            return Ok(());
        }
        let mut values = self.values.clone();
        values.remove(key);
        self.commit(values)
    }

    /// Only replace the in-memory values once they are on disk.
    fn commit(&mut self, values: BTreeMap<String, String>) -> std::io::Result<()> {
        Self::save(&self.path, &values)?;
        self.values = values;
        Ok(())
    }

    fn save(path: &Path, values: &BTreeMap<String, String>) -> std::io::Result<()> {
        let tmp = path.with_extension("json.tmp");
        let mut f = File::create(&tmp)?;
        let data = serde_json::to_string_pretty(values)?;
        f.write_all(data.as_bytes())?;
        f.flush()?;
        fs::rename(tmp, path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_code_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefs.json");

        let mut prefs = Preferences::open(&path).unwrap();
        assert_eq!(prefs.get(LOCATION_CODE_KEY), None);
        prefs.set(LOCATION_CODE_KEY, "LOC001").unwrap();

        let mut prefs = Preferences::open(&path).unwrap();
        assert_eq!(prefs.get(LOCATION_CODE_KEY), Some("LOC001"));
        prefs.remove(LOCATION_CODE_KEY).unwrap();

        let prefs = Preferences::open(&path).unwrap();
        assert_eq!(prefs.get(LOCATION_CODE_KEY), None);
    }

    #[test]
    fn test_failed_save_keeps_previous_values() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("data");
        fs::create_dir_all(&data_dir).unwrap();
        let mut prefs = Preferences::open(&data_dir.join("prefs.json")).unwrap();
        prefs.set(LOCATION_CODE_KEY, "LOC001").unwrap();

        fs::remove_dir_all(&data_dir).unwrap();
        assert!(prefs.set(LOCATION_CODE_KEY, "LOC002").is_err());
        assert!(prefs.remove(LOCATION_CODE_KEY).is_err());
        assert_eq!(prefs.get(LOCATION_CODE_KEY), Some("LOC001"));
    }
}
