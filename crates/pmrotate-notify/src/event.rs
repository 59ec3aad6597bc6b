//! Rotation events reported on the alert channel

use serde::{Deserialize, Serialize};

/// Exceptional conditions worth an operator's attention
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RotationEvent {
    /// Copying or compressing into the archive failed; the live file is untouched
    RotationFailed { path: String, error: String },

    /// The archive was written but the live file could not be emptied
    TruncateFailed {
        path: String,
        archive: String,
        error: String,
    },

    /// Old archives could not be listed for retention
    PruneFailed { path: String, error: String },

    /// The supervisor control channel could not be reached
    SupervisorUnreachable { error: String },
}

impl RotationEvent {
    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            RotationEvent::RotationFailed { .. } => "rotation_failed",
            RotationEvent::TruncateFailed { .. } => "truncate_failed",
            RotationEvent::PruneFailed { .. } => "prune_failed",
            RotationEvent::SupervisorUnreachable { .. } => "supervisor_unreachable",
        }
    }

    /// Log file the event concerns, if any
    pub fn path(&self) -> Option<&str> {
        match self {
            RotationEvent::RotationFailed { path, .. }
            | RotationEvent::TruncateFailed { path, .. }
            | RotationEvent::PruneFailed { path, .. } => Some(path),
            RotationEvent::SupervisorUnreachable { .. } => None,
        }
    }

    /// Human-readable message. Paths and error text sit in code spans so
    /// Markdown characters in them are shown as-is.
    pub fn format_message(&self) -> String {
        match self {
            RotationEvent::RotationFailed { path, error } => format!(
                "\u{1F534} Rotation failed: {}\nError: {}",
                code(path),
                code(error)
            ),
            RotationEvent::TruncateFailed {
                path,
                archive,
                error,
            } => format!(
                "\u{26A0}\u{FE0F} Archive {} created but {} was not emptied\nError: {}",
                code(archive),
                code(path),
                code(error)
            ),
            RotationEvent::PruneFailed { path, error } => format!(
                "\u{26A0}\u{FE0F} Retention failed for {}\nError: {}",
                code(path),
                code(error)
            ),
            RotationEvent::SupervisorUnreachable { error } => {
                format!("\u{1F6A8} Supervisor unreachable\nError: {}", code(error))
            }
        }
    }
}

/// Inline code span; a backtick would end the span early
fn code(text: &str) -> String {
    format!("`{}`", text.replace('`', "'"))
}
