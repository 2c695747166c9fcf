mod bank;
mod error;
mod line_id;
mod line_iter;
mod paths;
mod tag;

pub use bank::{Bank, ReadLock, WriteLock, MAX_LINE_LENGTH};
pub use error::BankError;
pub use line_id::{BankKind, LineId};
pub use line_iter::{is_line_breaker, LineIter};
pub use paths::{
    alive_marker_path, find_session_banks, legacy_history_path, session_bank_path,
    session_instance_id, LEGACY_HISTORY_FILE,
};
pub use tag::{ConcurrencyTag, DELETE_SENTINEL, MAX_TAG_SIZE, TAG_PREFIX};
