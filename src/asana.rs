//! Client for the external task-tracking API.
//!
//! Per-location API settings live in the `asana_config` collection. Each phase
//! maps to either a project (Prep) or a section (the other phases) whose open
//! tasks are mirrored into the checklist. Completing a mirrored task pushes the
//! new state back with a `PUT`.

use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::ChecklistError;
use crate::fields::{Phase, TaskStatus};
use crate::store::{RemoteStore, StoreError};
use crate::task::Task;

#[derive(Debug, Error)]
pub enum TaskApiError {
    #[error("Failed to reach task API: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Task API request failed: {status} {reason}")]
    Status { status: u16, reason: String },
}

/// Where the tasks of one phase are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskSource {
    Project(String),
    Section(String),
}

/// A task as returned by the external API.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ExternalTask {
    pub gid: String,
    pub name: String,
    #[serde(default)]
    pub completed: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

impl ExternalTask {
    /// Mirror into a checklist task. The notes become the location hint.
    pub fn into_task(self, location: &str) -> Task {
        let mut sub_text = BTreeMap::new();
        sub_text.insert(location.to_string(), self.notes.unwrap_or_default());
        Task {
            id: self.gid.clone(),
            name: self.name,
            description: None,
            sub_text,
            status: self.completed.then_some(TaskStatus::Done),
            completed_by: None,
            required: true,
            sub_tasks: None,
            external_ref: Some(self.gid),
        }
    }
}

/// Operations the checklist needs from the external task tracker.
pub trait TaskApi {
    fn fetch_tasks(&self, source: &TaskSource) -> Result<Vec<ExternalTask>, TaskApiError>;

    fn set_completed(&self, gid: &str, completed: bool) -> Result<(), TaskApiError>;
}

/// Location record from the `asana_config` collection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TaskApiConfig {
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Prep", default)]
    pub prep: Option<String>,
    #[serde(default)]
    pub opening: Option<String>,
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub closing: Option<String>,
    #[serde(rename = "access token", default)]
    pub access_token: Option<String>,
}

impl TaskApiConfig {
    /// Configured source for a phase, if any.
    pub fn source(&self, phase: Phase) -> Option<TaskSource> {
        match phase {
            Phase::Prep => self.prep.clone().map(TaskSource::Project),
            Phase::Opening => self.opening.clone().map(TaskSource::Section),
            Phase::Mid => self.mid.clone().map(TaskSource::Section),
            Phase::Closing => self.closing.clone().map(TaskSource::Section),
        }
    }

    pub fn sources(&self) -> Vec<(Phase, TaskSource)> {
        Phase::ALL
            .iter()
            .filter_map(|&phase| self.source(phase).map(|s| (phase, s)))
            .collect()
    }
}

/// Read the task API settings for a location.
pub fn load_task_api_config<S: RemoteStore>(
    store: &S,
    location: &str,
) -> Result<TaskApiConfig, ChecklistError> {
    let doc = store
        .get_all("asana_config")?
        .into_iter()
        .find(|d| d.str_field("Location") == Some(location))
        .ok_or_else(|| ChecklistError::TaskApiConfigMissing(location.to_string()))?;
    let config: TaskApiConfig = serde_json::from_value(serde_json::Value::Object(doc.fields))
        .map_err(|e| StoreError::Unavailable(format!("malformed asana_config: {e}")))?;
    if config.access_token.as_deref().map_or(true, str::is_empty) {
        return Err(ChecklistError::TaskApiTokenMissing);
    }
    Ok(config)
}

#[derive(Deserialize)]
struct TaskList {
    data: Vec<ExternalTask>,
}

/// Bearer-authenticated HTTPS client.
pub struct AsanaClient {
    http: Client,
    base_url: String,
    token: String,
}

impl AsanaClient {
    pub fn new(base_url: &str, token: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        AsanaClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn tasks_url(&self, source: &TaskSource) -> String {
        match source {
            TaskSource::Project(id) => format!("{}/projects/{id}/tasks", self.base_url),
            TaskSource::Section(id) => format!("{}/sections/{id}/tasks", self.base_url),
        }
    }
}

fn check_status(response: reqwest::blocking::Response) -> Result<reqwest::blocking::Response, TaskApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(TaskApiError::Status {
            status: status.as_u16(),
            reason: status.canonical_reason().unwrap_or("").to_string(),
        })
    }
}

impl TaskApi for AsanaClient {
    fn fetch_tasks(&self, source: &TaskSource) -> Result<Vec<ExternalTask>, TaskApiError> {
        let url = self.tasks_url(source);
        debug!(%url, "fetching external tasks");
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .header("Accept", "application/json")
            .query(&[("opt_fields", "name,completed,notes"), ("completed_since", "now")])
            .send()?;
        let list: TaskList = check_status(response)?.json()?;
        info!(count = list.data.len(), "fetched external tasks");
        Ok(list.data)
    }

    fn set_completed(&self, gid: &str, completed: bool) -> Result<(), TaskApiError> {
        let url = format!("{}/tasks/{gid}", self.base_url);
        let response = self
            .http
            .put(&url)
            .bearer_auth(&self.token)
            .json(&json!({ "data": { "completed": completed } }))
            .send()?;
        check_status(response)?;
        debug!(gid, completed, "pushed external task status");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{fields_from, DocumentStore};

    fn store_with(config: serde_json::Value) -> DocumentStore {
        let mut store = DocumentStore::in_memory();
        store.merge_document("asana_config", "a", fields_from(config)).unwrap();
        store
    }

    #[test]
    fn test_config_maps_phases_to_sources() {
        let store = store_with(json!({
            "Location": "Waimea", "Prep": "p1", "opening": "s1", "closing": "s4",
            "access token": "tok"
        }));
        let config = load_task_api_config(&store, "Waimea").unwrap();
        assert_eq!(config.source(Phase::Prep), Some(TaskSource::Project("p1".into())));
        assert_eq!(config.source(Phase::Mid), None);
        assert_eq!(config.sources().len(), 3);
    }

    #[test]
    fn test_config_requires_location_and_token() {
        let store = store_with(json!({"Location": "Waimea", "access token": ""}));
        assert!(matches!(
            load_task_api_config(&store, "Waimea"),
            Err(ChecklistError::TaskApiTokenMissing)
        ));
        assert!(matches!(
            load_task_api_config(&store, "CMP"),
            Err(ChecklistError::TaskApiConfigMissing(_))
        ));
    }

    #[test]
    fn test_external_task_mirrors_as_required() {
        let external = ExternalTask {
            gid: "120".into(),
            name: "Restock cups".into(),
            completed: true,
            notes: Some("Sleeve of 50".into()),
        };
        let task = external.into_task("Waimea");
        assert!(task.required && task.is_external());
        assert_eq!(task.status, Some(TaskStatus::Done));
        assert_eq!(task.hint_for("Waimea"), Some("Sleeve of 50"));
    }

    #[test]
    fn test_urls_use_projects_for_prep_and_sections_otherwise() {
        let client = AsanaClient::new("https://example.test/api/1.0/", "tok");
        assert_eq!(
            client.tasks_url(&TaskSource::Project("9".into())),
            "https://example.test/api/1.0/projects/9/tasks"
        );
        assert_eq!(
            client.tasks_url(&TaskSource::Section("4".into())),
            "https://example.test/api/1.0/sections/4/tasks"
        );
    }
}
