use std::path::PathBuf;

use history_bank::{BankError, BankKind, LineId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error(transparent)]
    Bank(#[from] BankError),

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history has not been initialised")]
    NotInitialised,

    #[error("no {bank} bank is open")]
    UnknownBank { bank: BankKind },

    #[error("master bank has no concurrency tag loaded")]
    MissingTag,

    #[error("history position {position} is out of range ({len} lines loaded)")]
    UnknownPosition { position: usize, len: usize },

    #[error("history line at {id} no longer holds the expected text")]
    LineMismatch { id: LineId },

    #[error("history line contains a line break")]
    EmbeddedLineBreak,
}

impl HistoryError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// The caller's view of a bank is out of date; reloading fixes it.
    #[must_use]
    pub fn needs_reload(&self) -> bool {
        match self {
            Self::Bank(error) => error.is_stale(),
            Self::UnknownPosition { .. } | Self::LineMismatch { .. } | Self::MissingTag => true,
            _ => false,
        }
    }
}
