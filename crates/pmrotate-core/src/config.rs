//! Configuration file parsing for pmrotate
//!
//! Supports multiple configuration file formats:
//! - TOML (.toml)
//! - YAML (.yaml, .yml)
//! - JSON (.json)
//!
//! Every setting is validated once at startup. Malformed values are errors,
//! never silently replaced by defaults.

use chrono::format::{Item, StrftimeItems};
use chrono::Utc;
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

use crate::constants::*;
use crate::error::{Error, Result};

/// Event names accepted in the `notify.events` filter
pub const NOTIFY_EVENTS: &[&str] = &[
    "rotation_failed",
    "truncate_failed",
    "prune_failed",
    "supervisor_unreachable",
];

/// Moment-style date tokens, longest first so `YYYY` wins over `YY`
static MOMENT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"YYYY|YY|MMMM|MMM|MM|M|DD|D|dddd|ddd|HH|H|hh|h|mm|m|SSS|ss|s|A|a")
        .expect("Invalid moment token regex")
});

/// One strftime directive, flags and width included
static STRFTIME_DIRECTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"%[-_0^#]?[0-9]*[.:]*[A-Za-z%+]").expect("Invalid strftime directive regex")
});

/// Supported configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(ConfigFormat::Toml),
            "yaml" | "yml" => Some(ConfigFormat::Yaml),
            "json" => Some(ConfigFormat::Json),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Size threshold as written in a config file: `1048576`, `"512K"`, `"10M"`, `"1G"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SizeSetting {
    Bytes(u64),
    Text(String),
}

/// Retention as written in a config file: a count, or `"all"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RetainSetting {
    Count(usize),
    Text(String),
}

/// Alert channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Telegram notification settings
    pub telegram: Option<TelegramConfig>,

    /// Events to notify on (empty = all events)
    #[serde(default)]
    pub events: Vec<String>,
}

impl NotifyConfig {
    /// Check if any notification channel is configured
    pub fn is_configured(&self) -> bool {
        self.telegram.is_some()
    }

    /// Validate event names
    pub fn validate_events(&self) -> Result<()> {
        for event in &self.events {
            if !NOTIFY_EVENTS.contains(&event.as_str()) {
                return Err(Error::config(format!(
                    "Invalid notify event '{}'. Valid events: {:?}",
                    event, NOTIFY_EVENTS
                )));
            }
        }
        Ok(())
    }
}

/// Telegram notification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Bot token from @BotFather
    pub bot_token: String,

    /// Chat ID to send messages to (can be user, group, or channel)
    pub chat_id: String,
}

/// Configuration file structure (pmrotate.toml/yaml/json)
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub max_size: Option<SizeSetting>,
    /// Polling interval in seconds
    pub worker_interval: Option<u64>,
    /// Cron expression for forced rotation
    pub rotate_interval: Option<String>,
    pub retain: Option<RetainSetting>,
    pub compress: Option<bool>,
    pub date_format: Option<String>,
    pub timezone: Option<String>,
    pub rotate_module: Option<bool>,
    pub supervisor_home: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    #[serde(default)]
    pub notify: NotifyConfig,
}

impl ConfigFile {
    /// Load config from file, automatically detecting format from extension
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::ConfigNotFound(path.to_path_buf()));
        }

        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            Error::ConfigError(format!(
                "Unsupported config file extension: {}. Expected .toml, .yaml, .yml, or .json",
                path.display()
            ))
        })?;

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    /// Parse config content with specified format
    pub fn parse(content: &str, format: ConfigFormat) -> Result<Self> {
        let config = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    /// Find the first known config file in a directory
    pub fn find(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .find(|path| path.exists())
    }

    /// Validate every setting and build the immutable runtime config
    pub fn into_config(self) -> Result<Config> {
        let max_size = match &self.max_size {
            None => DEFAULT_MAX_SIZE,
            Some(SizeSetting::Bytes(bytes)) => *bytes,
            Some(SizeSetting::Text(text)) => parse_size(text)?,
        };

        let worker_interval_secs = self
            .worker_interval
            .unwrap_or(DEFAULT_WORKER_INTERVAL_SECS);
        if worker_interval_secs == 0 {
            return Err(Error::config("worker_interval must be at least 1 second"));
        }

        let rotate_cron = normalize_cron(
            self.rotate_interval
                .as_deref()
                .unwrap_or(DEFAULT_ROTATE_CRON),
        );
        let rotate_schedule = cron::Schedule::from_str(&rotate_cron).map_err(|e| {
            Error::InvalidCron {
                expression: rotate_cron.clone(),
                reason: e.to_string(),
            }
        })?;

        let retain = match &self.retain {
            None => None,
            Some(RetainSetting::Count(count)) => Some(*count),
            Some(RetainSetting::Text(text)) => parse_retain(text)?,
        };

        let date_format = match &self.date_format {
            None => DEFAULT_DATE_FORMAT.to_string(),
            Some(raw) => validate_date_format(raw)?,
        };

        let timezone = match &self.timezone {
            None => None,
            Some(name) => {
                let tz = resolve_timezone(name);
                if tz.is_none() {
                    warn!("Unknown timezone '{}', using local time", name);
                }
                tz
            }
        };

        self.notify.validate_events()?;

        let supervisor_home = self.supervisor_home.unwrap_or_else(supervisor_home);
        let socket_path = self
            .socket
            .unwrap_or_else(|| socket_path(&supervisor_home));

        Ok(Config {
            max_size,
            worker_interval: Duration::from_secs(worker_interval_secs),
            rotate_cron,
            rotate_schedule,
            retain,
            compress: self.compress.unwrap_or(false),
            date_format,
            timezone_name: self.timezone,
            timezone,
            rotate_module: self.rotate_module.unwrap_or(true),
            supervisor_home,
            socket_path,
            notify: self.notify,
        })
    }
}

/// Validated runtime configuration.
///
/// Built once at startup, shared behind an `Arc`, never mutated.
#[derive(Debug, Clone)]
pub struct Config {
    /// Rotation threshold in bytes
    pub max_size: u64,
    pub worker_interval: Duration,
    /// Six-or-seven field cron expression
    pub rotate_cron: String,
    pub rotate_schedule: cron::Schedule,
    /// Archives kept per file; `None` keeps everything
    pub retain: Option<usize>,
    pub compress: bool,
    /// strftime pattern for archive timestamps
    pub date_format: String,
    /// Timezone name as configured, even if it did not resolve
    pub timezone_name: Option<String>,
    pub timezone: Option<Tz>,
    pub rotate_module: bool,
    pub supervisor_home: PathBuf,
    pub socket_path: PathBuf,
    pub notify: NotifyConfig,
}

impl Config {
    /// Load and validate a config file
    pub fn load(path: &Path) -> Result<Self> {
        ConfigFile::load(path)?.into_config()
    }

    /// Load an explicit config file, else the first one found in `search_dir`,
    /// else defaults. Returns the path that was used, if any.
    pub fn load_or_default(
        explicit: Option<&Path>,
        search_dir: &Path,
    ) -> Result<(Self, Option<PathBuf>)> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => ConfigFile::find(search_dir),
        };

        match path {
            Some(path) => Ok((Self::load(&path)?, Some(path))),
            None => Ok((ConfigFile::default().into_config()?, None)),
        }
    }

    /// The supervisor's own log files
    pub fn supervisor_logs(&self) -> Vec<PathBuf> {
        supervisor_log_paths(&self.supervisor_home)
    }
}

/// Parse a size string with an optional K/M/G suffix into bytes.
///
/// An empty string means the default threshold.
pub fn parse_size(raw: &str) -> Result<u64> {
    let text = raw.trim();
    if text.is_empty() {
        return Ok(DEFAULT_MAX_SIZE);
    }

    let (digits, multiplier) = match text.as_bytes()[text.len() - 1] {
        b'K' | b'k' => (&text[..text.len() - 1], 1024u64),
        b'M' | b'm' => (&text[..text.len() - 1], 1024 * 1024),
        b'G' | b'g' => (&text[..text.len() - 1], 1024 * 1024 * 1024),
        _ => (text, 1),
    };

    let value: u64 = digits
        .trim()
        .parse()
        .map_err(|_| Error::InvalidSize(raw.to_string()))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::InvalidSize(raw.to_string()))
}

fn parse_retain(raw: &str) -> Result<Option<usize>> {
    let text = raw.trim();
    if text.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    text.parse::<usize>()
        .map(Some)
        .map_err(|_| Error::config(format!("Invalid retain value '{}': expected a count or \"all\"", raw)))
}

/// Turn a classic five-field cron expression into the six-field form the
/// `cron` crate parses: prefix a seconds field and renumber the day of week.
///
/// Six and seven field expressions are taken as already in that form.
pub fn normalize_cron(expression: &str) -> String {
    let expression = expression.trim();
    let fields: Vec<&str> = expression.split_whitespace().collect();
    if fields.len() != 5 {
        return expression.to_string();
    }
    format!(
        "0 {} {} {} {} {}",
        fields[0],
        fields[1],
        fields[2],
        fields[3],
        unix_day_of_week(fields[4])
    )
}

/// Map a Unix day-of-week field (0-7, Sunday is 0 or 7) onto the `cron`
/// crate's numbering (1-7, Sunday is 1).
///
/// Day names and `*` steps mean the same in both and pass through. Parts
/// that do not parse are left for the cron parser to reject.
fn unix_day_of_week(field: &str) -> String {
    field
        .split(',')
        .map(|part| unix_day_part(part).unwrap_or_else(|| part.to_string()))
        .collect::<Vec<_>>()
        .join(",")
}

fn unix_day_part(part: &str) -> Option<String> {
    if part.starts_with('*') || part.chars().any(|c| c.is_ascii_alphabetic()) {
        return Some(part.to_string());
    }

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => (range, step.parse::<usize>().ok().filter(|s| *s > 0)?),
        None => (part, 1),
    };
    let (start, end) = match range.split_once('-') {
        Some((start, end)) => (start.parse::<u32>().ok()?, end.parse::<u32>().ok()?),
        None => {
            let day = range.parse::<u32>().ok()?;
            // `n/step` runs to the end of the week
            (day, if step > 1 { 7 } else { day })
        }
    };
    if start > end || end > 7 {
        return None;
    }

    let mut days: Vec<u32> = (start..=end).step_by(step).map(|day| day % 7 + 1).collect();
    days.sort_unstable();
    days.dedup();
    Some(
        days.iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Resolve an IANA timezone name
pub fn resolve_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Translate a moment-style pattern (`YYYY-MM-DD_HH-mm-ss`) to strftime.
///
/// Patterns that already contain `%` are returned unchanged.
pub fn translate_date_format(pattern: &str) -> String {
    if pattern.contains('%') {
        return pattern.to_string();
    }
    MOMENT_TOKEN
        .replace_all(pattern, |caps: &Captures| match &caps[0] {
            "YYYY" => "%Y",
            "YY" => "%y",
            "MMMM" => "%B",
            "MMM" => "%b",
            "MM" => "%m",
            "M" => "%-m",
            "DD" => "%d",
            "D" => "%-d",
            "dddd" => "%A",
            "ddd" => "%a",
            "HH" => "%H",
            "H" => "%-H",
            "hh" => "%I",
            "h" => "%-I",
            "mm" => "%M",
            "m" => "%-M",
            "ss" => "%S",
            "s" => "%-S",
            "SSS" => "%3f",
            "A" => "%p",
            "a" => "%P",
            _ => "",
        })
        .into_owned()
}

/// Translate and check a date format. It must render and must vary with
/// time. It must never produce the archive delimiter or a path separator.
/// A moment-style pattern must not keep untranslated letters.
pub fn validate_date_format(raw: &str) -> Result<String> {
    let pattern = translate_date_format(raw);
    if pattern.trim().is_empty() {
        return Err(Error::InvalidDateFormat(raw.to_string()));
    }
    if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
        return Err(Error::InvalidDateFormat(raw.to_string()));
    }
    if !StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Numeric(..) | Item::Fixed(..))) {
        return Err(Error::InvalidDateFormat(raw.to_string()));
    }
    if !raw.contains('%')
        && STRFTIME_DIRECTIVE
            .replace_all(&pattern, "")
            .chars()
            .any(|c| c.is_ascii_alphabetic())
    {
        return Err(Error::InvalidDateFormat(raw.to_string()));
    }

    let sample = Utc::now().format(&pattern).to_string();
    if sample.contains(ARCHIVE_DELIMITER) || sample.contains('/') {
        return Err(Error::InvalidDateFormat(raw.to_string()));
    }
    Ok(pattern)
}
