//! Rotation executor: decide, copy (optionally gzip), then truncate in place

use async_compression::tokio::write::GzipEncoder;
use async_compression::Level;
use chrono::{DateTime, Utc};
use pmrotate_core::Config;
use pmrotate_notify::{NotificationManager, RotationEvent};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info, warn};

use crate::naming::{archive_path, archive_timestamp};
use crate::retention;
use crate::watched::{InFlight, WatchedFiles};

/// Rotate only non-empty files, and then only when forced or over the threshold
pub fn should_rotate(size: u64, threshold: u64, force: bool) -> bool {
    size > 0 && (size >= threshold || force)
}

/// Result of evaluating one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RotationOutcome {
    /// Missing, empty, under the threshold, or already being rotated
    Skipped,
    Rotated { archive: PathBuf },
    /// Reported and left for the next firing
    Failed,
}

impl RotationOutcome {
    pub fn rotated(&self) -> bool {
        matches!(self, RotationOutcome::Rotated { .. })
    }
}

/// Evaluates log files and rotates the ones that qualify
pub struct Rotator {
    config: Arc<Config>,
    watched: Arc<WatchedFiles>,
    in_flight: InFlight,
    alerts: Arc<NotificationManager>,
    clock: fn() -> DateTime<Utc>,
}

impl Rotator {
    pub fn new(config: Arc<Config>, alerts: Arc<NotificationManager>) -> Self {
        Self {
            config,
            watched: Arc::new(WatchedFiles::new()),
            in_flight: InFlight::new(),
            alerts,
            clock: Utc::now,
        }
    }

    /// Use a fixed time source for archive names
    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn watched(&self) -> &Arc<WatchedFiles> {
        &self.watched
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Evaluate `path`; true if it was rotated
    pub async fn evaluate(&self, path: &Path, force: bool) -> bool {
        self.process(path, force).await.rotated()
    }

    /// Evaluate `path` and report what happened
    pub async fn process(&self, path: &Path, force: bool) -> RotationOutcome {
        match fs::try_exists(path).await {
            Ok(true) => {}
            Ok(false) => return RotationOutcome::Skipped,
            Err(e) => {
                debug!("Cannot check {}: {}", path.display(), e);
                return RotationOutcome::Skipped;
            }
        }

        self.watched.observe(path);

        let Some(_guard) = self.in_flight.try_acquire(path) else {
            debug!("{} is already being rotated, skipping", path.display());
            return RotationOutcome::Skipped;
        };

        let size = match fs::metadata(path).await {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                warn!("Failed to stat {}: {}", path.display(), e);
                return RotationOutcome::Failed;
            }
        };

        if !should_rotate(size, self.config.max_size, force) {
            return RotationOutcome::Skipped;
        }

        info!("Rotating {} ({} bytes, forced: {})", path.display(), size, force);
        self.rotate(path).await
    }

    async fn rotate(&self, path: &Path) -> RotationOutcome {
        let timestamp = archive_timestamp(
            (self.clock)(),
            &self.config.date_format,
            self.config.timezone,
        );
        let Some(archive) = archive_path(path, &timestamp, self.config.compress) else {
            warn!("Cannot derive an archive name for {}", path.display());
            return RotationOutcome::Failed;
        };

        if let Err(e) = copy_to_archive(path, &archive, self.config.compress).await {
            // Never leave a partial archive for retention to count
            if let Err(rm) = fs::remove_file(&archive).await {
                if rm.kind() != io::ErrorKind::NotFound {
                    warn!("Failed to remove partial archive {}: {}", archive.display(), rm);
                }
            }
            self.alerts.alert(RotationEvent::RotationFailed {
                path: path.display().to_string(),
                error: e.to_string(),
            });
            return RotationOutcome::Failed;
        }

        // Commit point: the archive is complete, now empty the live file
        if let Err(e) = truncate(path).await {
            self.alerts.alert(RotationEvent::TruncateFailed {
                path: path.display().to_string(),
                archive: archive.display().to_string(),
                error: e.to_string(),
            });
            return RotationOutcome::Failed;
        }

        info!("\"{}\" has been created", archive.display());
        info!("\"{}\" has been emptied", path.display());

        if let Some(retain) = self.config.retain {
            if let Err(e) = retention::prune(path, retain).await {
                self.alerts.alert(RotationEvent::PruneFailed {
                    path: path.display().to_string(),
                    error: e.to_string(),
                });
            }
        }

        RotationOutcome::Rotated { archive }
    }
}

/// Stream `source` into `archive` (create/truncate), gzip at best level when
/// asked. Returns the number of source bytes copied.
async fn copy_to_archive(source: &Path, archive: &Path, compress: bool) -> io::Result<u64> {
    let mut reader = BufReader::new(File::open(source).await?);
    let writer = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(archive)
        .await?;
    let mut writer = BufWriter::new(writer);

    if compress {
        let mut encoder = GzipEncoder::with_quality(writer, Level::Best);
        let copied = tokio::io::copy(&mut reader, &mut encoder).await?;
        // Writes the gzip trailer, then flushes and closes the file
        encoder.shutdown().await?;
        Ok(copied)
    } else {
        let copied = tokio::io::copy(&mut reader, &mut writer).await?;
        writer.shutdown().await?;
        Ok(copied)
    }
}

/// Empty the file in place; the owning process keeps its descriptor
async fn truncate(path: &Path) -> io::Result<()> {
    let file = OpenOptions::new().write(true).open(path).await?;
    file.set_len(0).await
}
