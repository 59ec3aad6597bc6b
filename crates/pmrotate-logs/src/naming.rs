//! Archive naming: `<stem>__<timestamp>[.<ext>][.gz]` next to the live file

use chrono::{DateTime, Local, Utc};
use chrono_tz::Tz;
use pmrotate_core::constants::{ARCHIVE_DELIMITER, DEFAULT_DATE_FORMAT, GZIP_EXTENSION};
use std::ffi::OsString;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Format `now` with `format`, in `tz` when set, else in local time
pub fn archive_timestamp(now: DateTime<Utc>, format: &str, tz: Option<Tz>) -> String {
    let mut out = String::new();
    let rendered = match tz {
        Some(tz) => write!(out, "{}", now.with_timezone(&tz).format(format)),
        None => write!(out, "{}", now.with_timezone(&Local).format(format)),
    };

    if rendered.is_err() {
        warn!("Date format '{}' failed to render, using default", format);
        out.clear();
        let _ = match tz {
            Some(tz) => write!(out, "{}", now.with_timezone(&tz).format(DEFAULT_DATE_FORMAT)),
            None => write!(out, "{}", now.with_timezone(&Local).format(DEFAULT_DATE_FORMAT)),
        };
    }
    out
}

/// File name prefix shared by all archives of `path`: the stem plus the delimiter.
///
/// `app.log` gives `app__`, so `app-worker.log` archives never match.
pub fn archive_prefix(path: &Path) -> Option<OsString> {
    let mut prefix = path.file_stem()?.to_os_string();
    prefix.push(ARCHIVE_DELIMITER);
    Some(prefix)
}

/// Full archive path for `path` at `timestamp`
pub fn archive_path(path: &Path, timestamp: &str, compress: bool) -> Option<PathBuf> {
    let mut name = archive_prefix(path)?;
    name.push(timestamp);
    if let Some(ext) = path.extension() {
        name.push(".");
        name.push(ext);
    }
    if compress {
        name.push(".");
        name.push(GZIP_EXTENSION);
    }
    Some(path.with_file_name(name))
}
