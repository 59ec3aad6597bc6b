//! IPC Protocol - Request/Response types exchanged with the supervisor
//!
//! One JSON document per line, tagged by `type`.

use pmrotate_core::ManagedProcess;
use serde::{Deserialize, Serialize};

/// Request sent to the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Check that the peer is a live supervisor
    Ping,

    /// Get the current process table
    List,
}

/// Response from the supervisor
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Pong,

    /// Process table, in the supervisor's order
    Processes { processes: Vec<ManagedProcess> },

    Error { message: String },
}

impl Response {
    pub fn error<S: Into<String>>(message: S) -> Self {
        Response::Error {
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Response::Error { .. })
    }
}
