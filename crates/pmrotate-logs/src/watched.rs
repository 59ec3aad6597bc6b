//! Bookkeeping for files seen and files mid-rotation

use parking_lot::{Mutex, RwLock};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Every log file seen on disk since startup. Grows only.
///
/// Telemetry only: membership never gates a rotation.
#[derive(Debug, Default)]
pub struct WatchedFiles {
    files: RwLock<HashSet<PathBuf>>,
}

impl WatchedFiles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file; returns true the first time it is seen
    pub fn observe(&self, path: &Path) -> bool {
        if self.files.read().contains(path) {
            return false;
        }
        self.files.write().insert(path.to_path_buf())
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.read().contains(path)
    }

    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// Sorted copy of the set
    pub fn snapshot(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.files.read().iter().cloned().collect();
        files.sort();
        files
    }
}

/// Paths currently being evaluated. At most one evaluation per path runs
/// at a time; overlapping triggers for the same file are skipped.
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim `path`, or `None` if another evaluation holds it
    pub fn try_acquire(&self, path: &Path) -> Option<InFlightGuard> {
        let mut paths = self.paths.lock();
        if !paths.insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            paths: Arc::clone(&self.paths),
            path: path.to_path_buf(),
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.paths.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.paths.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.lock().is_empty()
    }
}

/// Releases its path when dropped, including when the evaluation is cancelled
#[derive(Debug)]
pub struct InFlightGuard {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.paths.lock().remove(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watched_files_grow_once() {
        let watched = WatchedFiles::new();
        assert!(watched.is_empty());

        assert!(watched.observe(Path::new("/logs/b.log")));
        assert!(watched.observe(Path::new("/logs/a.log")));
        assert!(!watched.observe(Path::new("/logs/a.log")));

        assert_eq!(watched.len(), 2);
        assert!(watched.contains(Path::new("/logs/a.log")));
        assert_eq!(
            watched.snapshot(),
            vec![PathBuf::from("/logs/a.log"), PathBuf::from("/logs/b.log")]
        );
    }

    #[test]
    fn test_in_flight_exclusive() {
        let in_flight = InFlight::new();
        let path = Path::new("/logs/app.log");

        let guard = in_flight.try_acquire(path).unwrap();
        assert_eq!(guard.path(), path);
        assert!(in_flight.contains(path));
        assert!(in_flight.try_acquire(path).is_none());

        // Other paths are independent
        let other = in_flight.try_acquire(Path::new("/logs/other.log"));
        assert!(other.is_some());
        assert_eq!(in_flight.len(), 2);

        drop(guard);
        assert!(!in_flight.contains(path));
        assert!(in_flight.try_acquire(path).is_some());
    }

    #[test]
    fn test_in_flight_shared_between_clones() {
        let in_flight = InFlight::new();
        let clone = in_flight.clone();

        let _guard = in_flight.try_acquire(Path::new("/logs/app.log")).unwrap();
        assert!(clone.try_acquire(Path::new("/logs/app.log")).is_none());
    }
}
