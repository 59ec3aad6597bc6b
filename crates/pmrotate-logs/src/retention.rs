//! Retention: keep only the newest archives of a log file

use pmrotate_core::constants::NULL_DEVICE;
use pmrotate_core::Result;
use std::ffi::OsString;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::naming::archive_prefix;

/// Delete all but the `retain` newest archives of `path`. Returns how many
/// were deleted.
///
/// Archives are the directory entries whose name contains the file's
/// archive prefix. Timestamps sort chronologically, so descending name
/// order is newest first. Each deletion is independent: one failure is
/// logged and the rest still go.
pub async fn prune(path: &Path, retain: usize) -> Result<usize> {
    if path == Path::new(NULL_DEVICE) {
        return Ok(0);
    }

    let Some(prefix) = archive_prefix(path) else {
        return Ok(0);
    };
    let prefix = prefix.to_string_lossy().into_owned();
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut archives: Vec<(String, OsString)> = Vec::new();
    let mut entries = fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let file_name = entry.file_name();
        let name = file_name.to_string_lossy().into_owned();
        if name.contains(&prefix) {
            archives.push((name, file_name));
        }
    }

    if archives.len() <= retain {
        debug!(
            "{} archives of {} within retention of {}",
            archives.len(),
            path.display(),
            retain
        );
        return Ok(0);
    }

    archives.sort_by(|a, b| b.0.cmp(&a.0));

    let mut deleted = 0;
    for (name, file_name) in archives.into_iter().skip(retain) {
        match fs::remove_file(dir.join(&file_name)).await {
            Ok(()) => {
                info!("\"{}\" has been deleted", name);
                deleted += 1;
            }
            Err(e) => warn!("Failed to delete \"{}\": {}", name, e),
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, name).unwrap();
        path
    }

    fn remaining(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_prune_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let live = touch(&dir, "app.log");
        touch(&dir, "app__2024-01-01_00-00-00.log");
        touch(&dir, "app__2024-01-02_00-00-00.log");
        touch(&dir, "app__2024-01-03_00-00-00.log");

        let deleted = prune(&live, 2).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(
            remaining(&dir),
            vec![
                "app.log",
                "app__2024-01-02_00-00-00.log",
                "app__2024-01-03_00-00-00.log",
            ]
        );
    }

    #[tokio::test]
    async fn test_prune_deletes_n_minus_r() {
        let dir = TempDir::new().unwrap();
        let live = touch(&dir, "api.log");
        for day in 1..=9 {
            touch(&dir, &format!("api__2024-03-0{}_12-00-00.log.gz", day));
        }

        assert_eq!(prune(&live, 4).await.unwrap(), 5);
        let names = remaining(&dir);
        assert_eq!(names.len(), 5);
        assert!(names.contains(&"api__2024-03-09_12-00-00.log.gz".to_string()));
        assert!(names.contains(&"api__2024-03-06_12-00-00.log.gz".to_string()));
        assert!(!names.contains(&"api__2024-03-05_12-00-00.log.gz".to_string()));
    }

    #[tokio::test]
    async fn test_prune_fewer_than_retain() {
        let dir = TempDir::new().unwrap();
        let live = touch(&dir, "app.log");
        touch(&dir, "app__2024-01-01_00-00-00.log");

        assert_eq!(prune(&live, 5).await.unwrap(), 0);
        assert_eq!(remaining(&dir).len(), 2);
    }

    #[tokio::test]
    async fn test_prune_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let live = touch(&dir, "app.log");
        touch(&dir, "app__2024-01-01_00-00-00.log");
        touch(&dir, "app-worker.log");
        touch(&dir, "app-worker__2024-01-01_00-00-00.log");
        touch(&dir, "application__2024-01-01_00-00-00.log");

        assert_eq!(prune(&live, 0).await.unwrap(), 1);
        assert_eq!(
            remaining(&dir),
            vec![
                "app-worker.log",
                "app-worker__2024-01-01_00-00-00.log",
                "app.log",
                "application__2024-01-01_00-00-00.log",
            ]
        );
    }

    #[tokio::test]
    async fn test_prune_continues_past_failed_delete() {
        let dir = TempDir::new().unwrap();
        let live = touch(&dir, "app.log");
        touch(&dir, "app__2024-01-01_00-00-00.log");
        // A non-empty directory cannot be removed as a file
        let stuck = dir.path().join("app__2024-01-02_00-00-00.log");
        std::fs::create_dir(&stuck).unwrap();
        std::fs::write(stuck.join("keep"), "x").unwrap();
        touch(&dir, "app__2024-01-03_00-00-00.log");
        touch(&dir, "app__2024-01-04_00-00-00.log");

        let deleted = prune(&live, 1).await.unwrap();
        assert_eq!(deleted, 2);
        assert_eq!(
            remaining(&dir),
            vec![
                "app.log",
                "app__2024-01-02_00-00-00.log",
                "app__2024-01-04_00-00-00.log",
            ]
        );
    }

    #[tokio::test]
    async fn test_prune_null_device() {
        assert_eq!(prune(Path::new("/dev/null"), 0).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prune_missing_directory() {
        let result = prune(Path::new("/nonexistent/dir/app.log"), 1).await;
        assert!(result.is_err());
    }
}
