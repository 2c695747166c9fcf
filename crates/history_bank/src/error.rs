use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BankError {
    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to acquire {mode} lock on {path}: {source}")]
    Lock {
        mode: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("line of {length} bytes exceeds the {max} byte limit for {path}")]
    LineTooLong {
        path: PathBuf,
        length: usize,
        max: usize,
    },

    #[error("offset {offset} in {path} is beyond the addressable line range")]
    OffsetOverflow { path: PathBuf, offset: u64 },

    #[error("concurrency tag in {path} changed: expected '{expected}', found {found:?}")]
    StaleTag {
        path: PathBuf,
        expected: String,
        found: Option<String>,
    },
}

impl BankError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    #[must_use]
    pub fn lock(mode: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Lock {
            mode,
            path: path.into(),
            source,
        }
    }

    /// Whether the failure is an expected race with another process rather
    /// than a broken file.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::StaleTag { .. })
    }
}
