//! Constants and default values for pmrotate

use std::path::{Path, PathBuf};

/// Supervisor home directory name (under the user's home)
pub const SUPERVISOR_DIR: &str = ".pm2";

/// Environment variable overriding the supervisor home directory
pub const SUPERVISOR_HOME_ENV: &str = "PM2_HOME";

/// Supervisor control socket file name
pub const SOCKET_FILE: &str = "rpc.sock";

/// The supervisor's own log files, rotated alongside managed processes
pub const SUPERVISOR_LOG_FILES: &[&str] = &["pm2.log", "agent.log"];

/// Config file names searched in the supervisor home (in priority order)
pub const CONFIG_FILES: &[&str] = &[
    "pmrotate.toml",
    "pmrotate.yaml",
    "pmrotate.yml",
    "pmrotate.json",
];

/// Default rotation threshold in bytes (10MB)
pub const DEFAULT_MAX_SIZE: u64 = 10 * 1024 * 1024;

/// Default polling interval in seconds
pub const DEFAULT_WORKER_INTERVAL_SECS: u64 = 30;

/// Default forced rotation schedule: every day at midnight
pub const DEFAULT_ROTATE_CRON: &str = "0 0 * * *";

/// Default archive timestamp format (strftime)
pub const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Separator between an archive's base name and its timestamp.
/// Retention matching depends on it, so timestamps must never contain it.
pub const ARCHIVE_DELIMITER: &str = "__";

/// Extension appended to compressed archives
pub const GZIP_EXTENSION: &str = "gz";

/// Log path meaning "no file"
pub const NULL_DEVICE: &str = "/dev/null";

/// Default number of connection attempts before the supervisor is deemed unreachable
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 5;

/// Default delay between connection attempts in milliseconds
pub const DEFAULT_CONNECT_DELAY_MS: u64 = 200;

/// Default time the supervisor gets to answer one request, in seconds
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Maximum IPC message size (10MB)
pub const MAX_MESSAGE_SIZE: u64 = 10 * 1024 * 1024;

/// Get the supervisor home directory
pub fn supervisor_home() -> PathBuf {
    if let Some(home) = std::env::var_os(SUPERVISOR_HOME_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(home);
    }
    dirs::home_dir()
        .map(|h| h.join(SUPERVISOR_DIR))
        .unwrap_or_else(|| PathBuf::from(SUPERVISOR_DIR))
}

/// Get the control socket path inside a supervisor home
pub fn socket_path(home: &Path) -> PathBuf {
    home.join(SOCKET_FILE)
}

/// Get the supervisor's own log files inside a supervisor home
pub fn supervisor_log_paths(home: &Path) -> Vec<PathBuf> {
    SUPERVISOR_LOG_FILES.iter().map(|f| home.join(f)).collect()
}
