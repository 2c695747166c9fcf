//! One-time import of the untagged, one-line-per-entry history format.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

use history_bank::{legacy_history_path, Bank, BankError, BankKind};

use crate::error::HistoryError;

/// Creates the master bank at `master_path` and, while it is still empty,
/// fills it from the legacy file next to it. Returns how many lines were
/// imported; a missing legacy file imports nothing.
pub(crate) fn migrate_legacy(master_path: &Path) -> Result<usize, HistoryError> {
    let bank = Bank::open(master_path, BankKind::Master)?;
    let lock = bank.write_lock()?;
    if !lock.is_empty()? {
        return Ok(0);
    }

    let legacy_path = legacy_history_path(master_path);
    let legacy = match File::open(&legacy_path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(source) => {
            return Err(HistoryError::io(
                "opening legacy history",
                &legacy_path,
                source,
            ))
        }
    };

    lock.reset_with_tag()?;

    let mut imported = 0usize;
    for line in BufReader::new(legacy).split(b'\n') {
        let mut line = line
            .map_err(|source| HistoryError::io("reading legacy history", &legacy_path, source))?;
        while matches!(line.last(), Some(b'\r' | b'\n')) {
            line.pop();
        }
        if line.is_empty() {
            continue;
        }

        let text = String::from_utf8_lossy(&line);
        match lock.add(&text) {
            Ok(_) => imported += 1,
            Err(BankError::LineTooLong { length, .. }) => {
                tracing::warn!(length, "skipping oversized legacy history line");
            }
            Err(error) => return Err(error.into()),
        }
    }

    tracing::info!(
        from = %legacy_path.display(),
        to = %master_path.display(),
        imported,
        "migrated legacy history"
    );
    Ok(imported)
}
