//! Command history shared between concurrently running shells.
//!
//! History lives in one master bank file plus one session bank per running
//! process. New lines go to the session bank and are merged into master
//! when the process exits, or by whichever process next notices it died.
//! See [`HistoryDb`] for the entry points.

mod alive;
pub mod config;
mod error;
mod expand;
mod export;
mod history;
pub mod logging;
mod migrate;

pub use alive::{AliveMarker, MarkerState};
pub use config::{DupeMode, ExpandMode, HistoryConfig, LogConfig, MAX_HISTORY_LINES};
pub use error::HistoryError;
pub use expand::history_expansion_inhibited;
pub use export::{ExportIter, HistoryLine};
pub use history::{compaction_threshold, HistoryDb, DEFAULT_COMPACT_THRESHOLD};
pub use logging::init_logging;

pub use history_bank::{BankKind, ConcurrencyTag, LineId, MAX_LINE_LENGTH};
