//! Chunked record scanner over a bank file.
//!
//! Bytes are pulled through a `BufReader` of the caller's chosen capacity.
//! A record that straddles a refill keeps growing in `record` until its
//! terminator arrives, so callers always see whole records no matter how
//! small the read buffer is.

use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::Path;

use crate::error::BankError;
use crate::line_id::{BankKind, LineId};
use crate::tag::{DELETE_SENTINEL, TAG_PREFIX};

#[inline]
pub fn is_line_breaker(byte: u8) -> bool {
    byte == 0x00 || byte == 0x0a || byte == 0x0d
}

pub struct LineIter<'a> {
    reader: BufReader<&'a File>,
    path: &'a Path,
    kind: BankKind,
    offset: u64,
    at_start: bool,
    deleted: usize,
    record: Vec<u8>,
}

impl<'a> LineIter<'a> {
    pub(crate) fn new(
        file: &'a File,
        path: &'a Path,
        kind: BankKind,
        buffer_size: usize,
    ) -> Result<Self, BankError> {
        let mut iter = Self {
            reader: BufReader::with_capacity(buffer_size.max(1), file),
            path,
            kind,
            offset: 0,
            at_start: true,
            deleted: 0,
            record: Vec::new(),
        };
        iter.set_file_offset(0)?;
        Ok(iter)
    }

    /// Moves the scan to `offset`, clamped to the current file size. Only a
    /// scan positioned at byte 0 treats its first record as a possible tag.
    pub fn set_file_offset(&mut self, offset: u64) -> Result<(), BankError> {
        let path = self.path;
        let len = self
            .reader
            .get_ref()
            .metadata()
            .map_err(|source| BankError::io("reading bank size", path, source))?
            .len();
        let offset = offset.min(len);
        self.reader
            .seek(SeekFrom::Start(offset))
            .map_err(|source| BankError::io("seeking bank", path, source))?;
        self.offset = offset;
        self.at_start = offset == 0;
        Ok(())
    }

    /// Soft-deleted records skipped so far.
    #[must_use]
    pub fn deleted_count(&self) -> usize {
        self.deleted
    }

    /// Next active record. Tag and soft-deleted records are consumed
    /// silently; the latter are counted.
    pub fn next_line(&mut self) -> Result<Option<(LineId, &[u8])>, BankError> {
        loop {
            let Some(start) = self.read_record()? else {
                return Ok(None);
            };

            let first = std::mem::replace(&mut self.at_start, false);
            if first && self.record.starts_with(TAG_PREFIX) {
                continue;
            }

            if self.record.first() == Some(&DELETE_SENTINEL) {
                self.deleted += 1;
                continue;
            }

            let offset = u32::try_from(start).map_err(|_| BankError::OffsetOverflow {
                path: self.path.to_path_buf(),
                offset: start,
            })?;
            return Ok(Some((LineId::new(self.kind, offset), &self.record)));
        }
    }

    /// Next record of any classification, with the offset of its first byte.
    pub fn next_raw(&mut self) -> Result<Option<(u64, &[u8])>, BankError> {
        let Some(start) = self.read_record()? else {
            return Ok(None);
        };
        self.at_start = false;
        Ok(Some((start, &self.record)))
    }

    fn read_record(&mut self) -> Result<Option<u64>, BankError> {
        let path = self.path;

        loop {
            let buf = self
                .reader
                .fill_buf()
                .map_err(|source| BankError::io("reading bank", path, source))?;
            if buf.is_empty() {
                return Ok(None);
            }

            let skip = buf.iter().take_while(|&&b| is_line_breaker(b)).count();
            let exhausted = skip == buf.len();
            self.reader.consume(skip);
            self.offset += skip as u64;
            if !exhausted {
                break;
            }
        }

        let start = self.offset;
        self.record.clear();

        loop {
            let buf = self
                .reader
                .fill_buf()
                .map_err(|source| BankError::io("reading bank", path, source))?;
            if buf.is_empty() {
                break;
            }

            match buf.iter().position(|&b| is_line_breaker(b)) {
                Some(end) => {
                    self.record.extend_from_slice(&buf[..end]);
                    self.reader.consume(end);
                    self.offset += end as u64;
                    break;
                }
                None => {
                    let len = buf.len();
                    self.record.extend_from_slice(buf);
                    self.reader.consume(len);
                    self.offset += len as u64;
                }
            }
        }

        Ok(Some(start))
    }
}
