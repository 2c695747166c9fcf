//! Resolved history settings.
//!
//! The store never reads settings files itself; front-ends hand it a
//! [`HistoryConfig`]. [`HistoryConfig::from_env`] is the resolver used by the
//! bundled CLI.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Hard ceiling for `max_lines`; zero or anything above it clamps here.
pub const MAX_HISTORY_LINES: usize = 50_000;
pub const DEFAULT_MAX_HISTORY_LINES: usize = 2500;
pub const DEFAULT_MIN_COMPACT_THRESHOLD: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value '{value}' for {setting}")]
pub struct ParseSettingError {
    pub setting: &'static str,
    pub value: String,
}

/// How `add` treats a line that is already in the history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DupeMode {
    /// Always append.
    Add,
    /// Keep the existing copy and skip the append.
    Ignore,
    /// Delete every existing copy, then append.
    #[default]
    ErasePrev,
}

impl FromStr for DupeMode {
    type Err = ParseSettingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "add" => Ok(Self::Add),
            "ignore" => Ok(Self::Ignore),
            "erase_prev" => Ok(Self::ErasePrev),
            other => Err(ParseSettingError {
                setting: "history.dupe_mode",
                value: other.to_string(),
            }),
        }
    }
}

/// Where a `!` may introduce history expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExpandMode {
    Off,
    On,
    NotSquoted,
    NotDquoted,
    #[default]
    NotQuoted,
}

impl FromStr for ExpandMode {
    type Err = ParseSettingError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "off" => Ok(Self::Off),
            "on" => Ok(Self::On),
            "not_squoted" => Ok(Self::NotSquoted),
            "not_dquoted" => Ok(Self::NotDquoted),
            "not_quoted" => Ok(Self::NotQuoted),
            other => Err(ParseSettingError {
                setting: "history.expand_mode",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryConfig {
    /// Master bank location; session banks and alive markers are named
    /// after it.
    pub history_path: PathBuf,
    /// Distinguishes this process's session bank. Defaults to the pid.
    pub instance_id: u32,
    /// Write straight into the master bank and keep no session bank.
    pub shared: bool,
    pub max_lines: usize,
    pub ignore_leading_whitespace: bool,
    pub dupe_mode: DupeMode,
    pub expand_mode: ExpandMode,
    /// Floor for the deleted-record count that triggers compaction.
    pub min_compact_threshold: usize,
}

impl HistoryConfig {
    #[must_use]
    pub fn new(history_path: impl Into<PathBuf>) -> Self {
        Self {
            history_path: history_path.into(),
            instance_id: std::process::id(),
            shared: false,
            max_lines: DEFAULT_MAX_HISTORY_LINES,
            ignore_leading_whitespace: true,
            dupe_mode: DupeMode::default(),
            expand_mode: ExpandMode::default(),
            min_compact_threshold: DEFAULT_MIN_COMPACT_THRESHOLD,
        }
    }

    /// Active-line limit with out-of-range values clamped.
    #[must_use]
    pub fn max_history(&self) -> usize {
        if self.max_lines == 0 || self.max_lines > MAX_HISTORY_LINES {
            MAX_HISTORY_LINES
        } else {
            self.max_lines
        }
    }

    pub fn from_env() -> Self {
        let mut config = Self::new(default_history_path());
        config.shared = env_bool("TAPE_HISTORY_SHARED", false);
        config.ignore_leading_whitespace = env_bool("TAPE_HISTORY_IGNORE_SPACE", true);
        if let Some(max_lines) = env_parse("TAPE_HISTORY_MAX_LINES") {
            config.max_lines = max_lines;
        }
        if let Some(dupe_mode) = env_parse("TAPE_HISTORY_DUPE_MODE") {
            config.dupe_mode = dupe_mode;
        }
        if let Some(expand_mode) = env_parse("TAPE_HISTORY_EXPAND_MODE") {
            config.expand_mode = expand_mode;
        }
        if let Some(min_compact_threshold) = env_parse("TAPE_HISTORY_MIN_COMPACT") {
            config.min_compact_threshold = min_compact_threshold;
        }
        config
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogConfig {
    pub log_file: Option<String>,
    pub level: Option<String>,
}

impl LogConfig {
    pub fn from_env() -> Self {
        Self {
            log_file: env_string_opt("TAPE_HISTORY_LOG"),
            level: env_string_opt("TAPE_HISTORY_LOG_LEVEL"),
        }
    }
}

fn default_history_path() -> PathBuf {
    if let Some(path) = env_string_opt("TAPE_HISTORY_PATH") {
        return PathBuf::from(path);
    }
    if let Some(data) = env_string_opt("XDG_DATA_HOME") {
        return PathBuf::from(data).join("tape").join("history");
    }
    if let Some(home) = env_string_opt("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("share")
            .join("tape")
            .join("history");
    }
    PathBuf::from("tape_history")
}

fn env_bool(key: &str, default: bool) -> bool {
    match env_string_opt(key).as_deref().map(str::trim) {
        Some("1") | Some("true") => true,
        Some("0") | Some("false") => false,
        _ => default,
    }
}

fn env_parse<T: FromStr>(key: &str) -> Option<T> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}
