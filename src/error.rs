//! Error and notice types shared by the engine, session flows and front ends.

use thiserror::Error;

use crate::asana::TaskApiError;
use crate::fields::Phase;
use crate::store::StoreError;

/// Errors surfaced by checklist operations.
///
/// None of these is fatal: front ends turn them into a dismissable notice and
/// the user retries with a new action.
#[derive(Debug, Error)]
pub enum ChecklistError {
    #[error("Invalid passcode.")]
    InvalidPasscode,

    #[error("Invalid admin code")]
    InvalidAdminCode,

    #[error("Admin configuration not found")]
    AdminConfigMissing,

    #[error("Edit mode is not enabled")]
    EditModeRequired,

    #[error("Only admins can add tasks")]
    AdminRoleRequired,

    #[error("Task '{task_id}' not found in {phase}")]
    UnknownTask { phase: Phase, task_id: String },

    #[error("Invalid location code '{0}'")]
    UnknownLocation(String),

    #[error("Location code does not match user permissions.")]
    LocationNotPermitted,

    #[error("No location is set up; run `shiftlist location setup` first")]
    NoRememberedLocation,

    #[error("Nothing to submit")]
    EmptyCart,

    #[error("Task name cannot be empty")]
    EmptyTaskName,

    #[error("No pre-structured task at position {0}")]
    UnknownPreset(usize),

    #[error("No task API configuration found for location: {0}")]
    TaskApiConfigMissing(String),

    #[error("Access token not found in configuration")]
    TaskApiTokenMissing,

    #[error("Invalid config: {0}")]
    Config(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    TaskApi(#[from] TaskApiError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Severity of a user-facing notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    Success,
    Info,
    Error,
}

/// A dismissable message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub title: String,
    pub message: String,
}

impl Notice {
    pub fn success(title: &str, message: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Success, title: title.to_string(), message: message.into() }
    }

    pub fn info(title: &str, message: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Info, title: title.to_string(), message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Notice { kind: NoticeKind::Error, title: "Error".to_string(), message: message.into() }
    }
}

impl From<&ChecklistError> for Notice {
    fn from(err: &ChecklistError) -> Self {
        Notice::error(err.to_string())
    }
}
