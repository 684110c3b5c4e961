//! Task data structures and related functionality.
//!
//! This module defines the `Task` struct that represents a single checklist
//! item, its optional subtasks, and the `CartEntry` used to stage status
//! changes before they are committed under a passcode.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::fields::{Phase, TaskStatus};

/// A checklist item belonging to one phase.
///
/// Required tasks come from the built-in template; everything else is created
/// by an admin and persisted in the phase document. Tasks mirrored from the
/// external task API carry their remote id in `external_ref`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location specific hint keyed by site name.
    #[serde(default)]
    pub sub_text: BTreeMap<String, String>,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub completed_by: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_tasks: Option<Vec<SubTask>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_ref: Option<String>,
}

/// A nested unit of work. Subtasks are counted and committed individually.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub status: Option<TaskStatus>,
    #[serde(default)]
    pub completed_by: Option<String>,
}

impl Task {
    /// Create an empty, non-required task with a blank hint for every location.
    pub fn custom(id: String, name: &str, locations: &[String]) -> Self {
        Task {
            id,
            name: name.trim().to_string(),
            description: None,
            sub_text: locations.iter().map(|l| (l.clone(), String::new())).collect(),
            status: None,
            completed_by: None,
            required: false,
            sub_tasks: None,
            external_ref: None,
        }
    }

    pub fn is_external(&self) -> bool {
        self.external_ref.is_some()
    }

    /// Where the task comes from, as shown in listings.
    pub fn origin(&self) -> &'static str {
        if self.is_external() {
            "External"
        } else if self.required {
            "Template"
        } else {
            "Custom"
        }
    }

    /// A task is processed once it has been marked done or explicitly skipped.
    pub fn is_processed(&self) -> bool {
        self.status.is_some()
    }

    /// Location hint for the given site, if any non-empty one exists.
    pub fn hint_for(&self, location: &str) -> Option<&str> {
        self.sub_text
            .get(location)
            .map(String::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Number of countable units and how many of them are done.
    ///
    /// A task with a subtask list counts each subtask; a task without one
    /// counts as a single unit.
    pub fn completion_units(&self) -> (usize, usize) {
        match &self.sub_tasks {
            Some(subs) => (
                subs.len(),
                subs.iter()
                    .filter(|s| s.status == Some(TaskStatus::Done))
                    .count(),
            ),
            None => (1, usize::from(self.status == Some(TaskStatus::Done))),
        }
    }

    /// Record a committed status on the task itself or on one of its subtasks.
    /// Returns false when the subtask does not exist.
    pub fn apply_status(
        &mut self,
        sub_task_id: Option<&str>,
        status: TaskStatus,
        completed_by: &str,
    ) -> bool {
        match sub_task_id {
            Some(sub_id) => {
                let Some(sub) = self
                    .sub_tasks
                    .iter_mut()
                    .flatten()
                    .find(|s| s.id == sub_id)
                else {
                    return false;
                };
                sub.status = Some(status);
                sub.completed_by = Some(completed_by.to_string());
                true
            }
            None => {
                self.status = Some(status);
                self.completed_by = Some(completed_by.to_string());
                true
            }
        }
    }
}

/// A staged status change awaiting passcode confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CartEntry {
    pub phase: Phase,
    pub task_id: String,
    pub sub_task_id: Option<String>,
    pub status: TaskStatus,
}

impl CartEntry {
    fn matches(&self, phase: Phase, task_id: &str, sub_task_id: Option<&str>) -> bool {
        self.phase == phase && self.task_id == task_id && self.sub_task_id.as_deref() == sub_task_id
    }
}

/// The set of staged, uncommitted status changes, in staging order.
///
/// Entries are unique by (phase, task id, subtask id). Toggling a key that is
/// already present removes it regardless of the requested status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cart {
    entries: Vec<CartEntry>,
}

impl Cart {
    /// Insert the entry, or remove it if its key is already staged.
    /// Returns true when the entry ends up staged.
    pub fn toggle(
        &mut self,
        phase: Phase,
        task_id: &str,
        sub_task_id: Option<&str>,
        status: TaskStatus,
    ) -> bool {
        if let Some(pos) = self
            .entries
            .iter()
            .position(|e| e.matches(phase, task_id, sub_task_id))
        {
            self.entries.remove(pos);
            return false;
        }
        self.entries.push(CartEntry {
            phase,
            task_id: task_id.to_string(),
            sub_task_id: sub_task_id.map(str::to_string),
            status,
        });
        true
    }

    /// Status staged for a task or subtask, used to preview pending changes.
    pub fn pending_status(
        &self,
        phase: Phase,
        task_id: &str,
        sub_task_id: Option<&str>,
    ) -> Option<TaskStatus> {
        self.entries
            .iter()
            .find(|e| e.matches(phase, task_id, sub_task_id))
            .map(|e| e.status)
    }

    pub fn entries(&self) -> &[CartEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove and return every entry.
    pub fn drain(&mut self) -> Vec<CartEntry> {
        std::mem::take(&mut self.entries)
    }
}

/// A reusable task suggestion stored per location in `pre_structured_tasks`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreStructuredTask {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_subtasks() -> Task {
        let mut task = Task::custom("7".into(), "Stock toppings", &[]);
        task.sub_tasks = Some(vec![
            SubTask { id: "a".into(), name: "Mochi".into(), status: None, completed_by: None },
            SubTask { id: "b".into(), name: "Azuki".into(), status: None, completed_by: None },
        ]);
        task
    }

    #[test]
    fn test_task_deserializes_stored_document_shape() {
        let json = r#"{"id":"X","name":"Custom","subText":{"Waimea":"Back room"},
            "status":null,"completedBy":null,"required":false}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.id, "X");
        assert_eq!(task.status, None);
        assert_eq!(task.hint_for("Waimea"), Some("Back room"));
        assert_eq!(task.hint_for("CMP"), None);
        assert!(!task.is_external());
    }

    #[test]
    fn test_completion_units_count_subtasks() {
        let mut task = with_subtasks();
        assert_eq!(task.completion_units(), (2, 0));
        assert!(task.apply_status(Some("b"), TaskStatus::Done, "1234"));
        assert_eq!(task.completion_units(), (2, 1));
        assert!(!task.apply_status(Some("zz"), TaskStatus::Done, "1234"));

        let plain = Task::custom("8".into(), "Sweep", &[]);
        assert_eq!(plain.completion_units(), (1, 0));
    }

    #[test]
    fn test_origin_labels() {
        let mut task = Task::custom("X".into(), "Custom", &[]);
        assert_eq!(task.origin(), "Custom");
        task.required = true;
        assert_eq!(task.origin(), "Template");
        task.external_ref = Some("g1".into());
        assert_eq!(task.origin(), "External");
    }

    #[test]
    fn test_cart_toggle_cancels_out() {
        let mut cart = Cart::default();
        assert!(cart.toggle(Phase::Opening, "1", None, TaskStatus::Done));
        assert!(!cart.toggle(Phase::Opening, "1", None, TaskStatus::NotPerformed));
        assert!(cart.is_empty());

        cart.toggle(Phase::Opening, "1", None, TaskStatus::Done);
        cart.toggle(Phase::Opening, "1", Some("a"), TaskStatus::Done);
        cart.toggle(Phase::Mid, "1", None, TaskStatus::Done);
        assert_eq!(cart.len(), 3);
        assert_eq!(cart.pending_status(Phase::Opening, "1", None), Some(TaskStatus::Done));
        assert_eq!(cart.pending_status(Phase::Opening, "1", Some("a")), Some(TaskStatus::Done));
        assert_eq!(cart.pending_status(Phase::Prep, "1", None), None);
    }
}
