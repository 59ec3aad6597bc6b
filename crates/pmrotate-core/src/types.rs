//! Core types for pmrotate

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::constants::NULL_DEVICE;

fn default_instances() -> u32 {
    1
}

/// A process as reported by the supervisor's process table.
///
/// Records are fetched fresh for every discovery pass and never cached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ManagedProcess {
    pub name: String,
    /// Extension of the supervisor itself rather than a user application
    #[serde(default)]
    pub is_module: bool,
    #[serde(default = "default_instances")]
    pub instances: u32,
    /// Standard output log
    #[serde(default)]
    pub out_log_path: Option<String>,
    /// Standard error log
    #[serde(default)]
    pub err_log_path: Option<String>,
    /// Combined log
    #[serde(default)]
    pub log_path: Option<String>,
}

impl ManagedProcess {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_module: false,
            instances: 1,
            out_log_path: None,
            err_log_path: None,
            log_path: None,
        }
    }

    pub fn with_out_log(mut self, path: impl Into<String>) -> Self {
        self.out_log_path = Some(path.into());
        self
    }

    pub fn with_err_log(mut self, path: impl Into<String>) -> Self {
        self.err_log_path = Some(path.into());
        self
    }

    pub fn with_combined_log(mut self, path: impl Into<String>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_instances(mut self, instances: u32) -> Self {
        self.instances = instances;
        self
    }

    pub fn as_module(mut self) -> Self {
        self.is_module = true;
        self
    }

    /// True if both records point at exactly the same three log paths
    pub fn has_same_logs(&self, other: &ManagedProcess) -> bool {
        self.out_log_path == other.out_log_path
            && self.err_log_path == other.err_log_path
            && self.log_path == other.log_path
    }

    /// Distinct log paths in role order: stdout, stderr, combined.
    ///
    /// Empty strings and the null device are not paths.
    pub fn log_paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = Vec::with_capacity(3);
        for path in [&self.out_log_path, &self.err_log_path, &self.log_path]
            .into_iter()
            .flatten()
        {
            let path = path.as_str();
            if path.is_empty() || path == NULL_DEVICE || paths.contains(&path) {
                continue;
            }
            paths.push(path);
        }
        paths
    }
}

/// What fired a rotation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Size polling; rotates only files over the threshold
    Interval,
    /// Scheduled forced rotation
    Cron,
    /// One-shot run requested from the command line
    Manual { force: bool },
}

impl Trigger {
    pub fn force(&self) -> bool {
        match self {
            Trigger::Interval => false,
            Trigger::Cron => true,
            Trigger::Manual { force } => *force,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Trigger::Interval => "interval",
            Trigger::Cron => "cron",
            Trigger::Manual { .. } => "manual",
        }
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single file queued for evaluation by the rotation executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub path: PathBuf,
    pub force: bool,
}

impl EvaluationRequest {
    pub fn new(path: impl Into<PathBuf>, force: bool) -> Self {
        Self {
            path: path.into(),
            force,
        }
    }
}
