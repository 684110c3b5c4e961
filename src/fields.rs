//! Enumerations and field types for shift checklists.
//!
//! This module defines the small structured values every other module shares:
//! the shift phases that partition tasks, the completion status of a task, and
//! the role of the person logged in.

use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// A named shift segment. Each phase owns one ordered task list, stored in a
/// document whose id is the phase name.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Phase {
    #[serde(alias = "opening")]
    Opening,
    #[serde(alias = "prep")]
    Prep,
    #[serde(alias = "mid")]
    Mid,
    #[serde(alias = "closing")]
    Closing,
}

impl Phase {
    /// All phases in tab order.
    pub const ALL: [Phase; 4] = [Phase::Opening, Phase::Prep, Phase::Mid, Phase::Closing];

    /// Document id of this phase inside the `tasks` collection.
    pub fn doc_id(self) -> &'static str {
        match self {
            Phase::Opening => "Opening",
            Phase::Prep => "Prep",
            Phase::Mid => "Mid",
            Phase::Closing => "Closing",
        }
    }

    /// Position of the phase in tab order.
    pub fn index(self) -> usize {
        match self {
            Phase::Opening => 0,
            Phase::Prep => 1,
            Phase::Mid => 2,
            Phase::Closing => 3,
        }
    }

    pub fn next(self) -> Phase {
        Phase::ALL[(self.index() + 1) % Phase::ALL.len()]
    }

    pub fn previous(self) -> Phase {
        Phase::ALL[(self.index() + Phase::ALL.len() - 1) % Phase::ALL.len()]
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.doc_id())
    }
}

impl FromStr for Phase {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "opening" => Ok(Phase::Opening),
            "prep" => Ok(Phase::Prep),
            "mid" => Ok(Phase::Mid),
            "closing" => Ok(Phase::Closing),
            other => Err(format!("unknown phase '{other}'")),
        }
    }
}

/// Completion status of a task or subtask.
///
/// The "not yet handled" state is represented by `Option::None` on the task,
/// which serializes as JSON `null` like the stored documents expect.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ValueEnum, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Done,
    #[serde(alias = "not-performed")]
    NotPerformed,
}

/// Role of the logged-in person, resolved from the `users` collection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Employee,
    Admin,
}

impl Role {
    /// Map the free-form role string of a user document. Anything other than
    /// `Admin` is an ordinary employee.
    pub fn from_document(role: Option<&str>) -> Role {
        match role {
            Some("Admin") => Role::Admin,
            _ => Role::Employee,
        }
    }
}

/// Format an optional status for display.
pub fn format_status(status: Option<TaskStatus>) -> &'static str {
    match status {
        Some(TaskStatus::Done) => "Done",
        Some(TaskStatus::NotPerformed) => "Skipped",
        None => "-",
    }
}

/// Format a role for display.
pub fn format_role(role: Role) -> &'static str {
    match role {
        Role::Employee => "Employee",
        Role::Admin => "Admin",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_parsing_is_case_insensitive() {
        assert_eq!("opening".parse::<Phase>(), Ok(Phase::Opening));
        assert_eq!(" CLOSING ".parse::<Phase>(), Ok(Phase::Closing));
        assert!("lunch".parse::<Phase>().is_err());
    }

    #[test]
    fn test_phase_cycles_in_tab_order() {
        assert_eq!(Phase::Closing.next(), Phase::Opening);
        assert_eq!(Phase::Opening.previous(), Phase::Closing);
        assert_eq!(Phase::Prep.next(), Phase::Mid);
    }

    #[test]
    fn test_status_wire_names() {
        assert_eq!(serde_json::to_string(&TaskStatus::Done).unwrap(), "\"done\"");
        assert_eq!(
            serde_json::to_string(&TaskStatus::NotPerformed).unwrap(),
            "\"notPerformed\""
        );
    }

    #[test]
    fn test_role_from_document() {
        assert_eq!(Role::from_document(Some("Admin")), Role::Admin);
        assert_eq!(Role::from_document(Some("Regular")), Role::Employee);
        assert_eq!(Role::from_document(None), Role::Employee);
    }
}
