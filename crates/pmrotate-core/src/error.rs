//! Error types for pmrotate

use std::path::PathBuf;

/// pmrotate error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Config file not found: {0}")]
    ConfigNotFound(PathBuf),

    #[error("Invalid size: {0}")]
    InvalidSize(String),

    #[error("Invalid cron expression '{expression}': {reason}")]
    InvalidCron { expression: String, reason: String },

    #[error("Invalid date format '{0}'")]
    InvalidDateFormat(String),

    #[error("IPC error: {0}")]
    IpcError(String),

    #[error("Supervisor unreachable after {attempts} attempts: {reason}")]
    SupervisorUnreachable { attempts: u32, reason: String },

    #[error("Supervisor error: {0}")]
    SupervisorError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

/// Result type alias for pmrotate
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigError(msg.into())
    }

    pub fn ipc<S: Into<String>>(msg: S) -> Self {
        Error::IpcError(msg.into())
    }

    pub fn supervisor<S: Into<String>>(msg: S) -> Self {
        Error::SupervisorError(msg.into())
    }
}
