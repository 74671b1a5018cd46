use std::fmt;

use serde::Serialize;
use ts_rs::TS;

/// Structured error type for the host. Stable codes let a UI match on the
/// failure instead of parsing messages.
///
/// Expected mapping edge cases (unknown names, empty layouts) never become an
/// `AppError`; they surface as no-op events.
#[derive(Debug, Clone, PartialEq, Serialize, TS)]
#[serde(tag = "code", content = "detail")]
#[ts(export)]
pub enum AppError {
    NotFound { what: String },
    ValidationError { message: String },
    IoError { message: String },
    LayoutError { message: String },
    SnapshotError { message: String },
    SettingsError { message: String },
    PhaseBlocked { message: String, remaining: Vec<String> },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound { what } => write!(f, "{what} not found"),
            AppError::ValidationError { message } => write!(f, "{message}"),
            AppError::IoError { message } => write!(f, "I/O error: {message}"),
            AppError::LayoutError { message } => write!(f, "Layout error: {message}"),
            AppError::SnapshotError { message } => write!(f, "Snapshot error: {message}"),
            AppError::SettingsError { message } => write!(f, "Settings error: {message}"),
            AppError::PhaseBlocked { message, .. } => write!(f, "{message}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::IoError {
            message: e.to_string(),
        }
    }
}

impl From<crate::persist::PersistError> for AppError {
    fn from(e: crate::persist::PersistError) -> Self {
        match e {
            crate::persist::PersistError::Io(io_err) => AppError::IoError {
                message: io_err.to_string(),
            },
            crate::persist::PersistError::Json(json_err) => AppError::ValidationError {
                message: json_err.to_string(),
            },
            crate::persist::PersistError::Invalid(message) => AppError::ValidationError { message },
        }
    }
}

impl From<crate::layout::LayoutError> for AppError {
    fn from(e: crate::layout::LayoutError) -> Self {
        AppError::LayoutError {
            message: e.to_string(),
        }
    }
}

impl From<crate::phase::PhaseError> for AppError {
    fn from(e: crate::phase::PhaseError) -> Self {
        let message = e.to_string();
        match e {
            crate::phase::PhaseError::Incomplete { remaining, .. } => {
                AppError::PhaseBlocked { message, remaining }
            }
            crate::phase::PhaseError::AtFirstPhase | crate::phase::PhaseError::AtTerminalPhase => {
                AppError::ValidationError { message }
            }
        }
    }
}

impl From<AppError> for String {
    fn from(e: AppError) -> String {
        e.to_string()
    }
}
