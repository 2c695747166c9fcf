//! Streaming read of every active history line.

use history_bank::{BankKind, LineId, LineIter, ReadLock};

use crate::error::HistoryError;
use crate::history::HistoryDb;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLine {
    pub id: LineId,
    pub text: String,
}

/// Yields master lines then session lines. Each bank stays read-locked
/// while it is being walked; the lock is released before moving on.
pub struct ExportIter<'a> {
    db: &'a HistoryDb,
    next_bank: usize,
    // Iterator first so it is dropped before the lock.
    current: Option<(LineIter<'a>, ReadLock<'a>)>,
    buffer_size: usize,
    finished: bool,
}

impl<'a> ExportIter<'a> {
    pub(crate) fn new(db: &'a HistoryDb, buffer_size: usize) -> Self {
        Self {
            db,
            next_bank: 0,
            current: None,
            buffer_size,
            finished: false,
        }
    }

    fn open_next_bank(&mut self) -> Result<bool, HistoryError> {
        while let Some(&kind) = BankKind::ALL.get(self.next_bank) {
            self.next_bank += 1;
            let Some(bank) = self.db.bank(kind) else {
                continue;
            };
            let lock = bank.read_lock()?;
            let lines = lock.lines(self.buffer_size)?;
            self.current = Some((lines, lock));
            return Ok(true);
        }
        Ok(false)
    }

    fn advance(&mut self) -> Result<Option<HistoryLine>, HistoryError> {
        loop {
            if let Some((lines, _)) = self.current.as_mut() {
                if let Some((id, text)) = lines.next_line()? {
                    return Ok(Some(HistoryLine {
                        id,
                        text: String::from_utf8_lossy(text).into_owned(),
                    }));
                }
                self.current = None;
            }

            if !self.open_next_bank()? {
                return Ok(None);
            }
        }
    }
}

impl Iterator for ExportIter<'_> {
    type Item = Result<HistoryLine, HistoryError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        match self.advance() {
            Ok(Some(line)) => Some(Ok(line)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(error) => {
                self.finished = true;
                self.current = None;
                Some(Err(error))
            }
        }
    }
}

impl std::fmt::Debug for ExportIter<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportIter")
            .field("next_bank", &self.next_bank)
            .field("buffer_size", &self.buffer_size)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
