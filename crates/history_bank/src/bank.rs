//! A bank is one append-mostly history file shared between processes.
//!
//! Every access goes through a scoped advisory lock: [`ReadLock`] holds a
//! shared lock, [`WriteLock`] an exclusive one, and both release it when
//! dropped. Lock acquisition blocks until granted.

use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::ops::Deref;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::BankError;
use crate::line_id::{BankKind, LineId};
use crate::line_iter::{is_line_breaker, LineIter};
use crate::tag::{ConcurrencyTag, DELETE_SENTINEL, MAX_TAG_SIZE};

/// Longest record a bank accepts, and the read buffer size used for full
/// scans.
pub const MAX_LINE_LENGTH: usize = 8192;

#[derive(Debug)]
pub struct Bank {
    kind: BankKind,
    path: PathBuf,
    file: File,
}

impl Bank {
    /// Opens `path` for reading and writing, creating it when absent.
    pub fn open(path: &Path, kind: BankKind) -> Result<Self, BankError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|source| BankError::io("opening bank", path, source))?;

        Ok(Self {
            kind,
            path: path.to_path_buf(),
            file,
        })
    }

    /// Opens `path` only if it exists. `Ok(None)` means another process
    /// removed it first.
    pub fn open_existing(path: &Path, kind: BankKind) -> Result<Option<Self>, BankError> {
        match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => Ok(Some(Self {
                kind,
                path: path.to_path_buf(),
                file,
            })),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(BankError::io("opening bank", path, source)),
        }
    }

    #[must_use]
    pub fn kind(&self) -> BankKind {
        self.kind
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn read_lock(&self) -> Result<ReadLock<'_>, BankError> {
        FileExt::lock_shared(&self.file)
            .map_err(|source| BankError::lock("shared", &self.path, source))?;
        Ok(ReadLock { bank: self })
    }

    pub fn write_lock(&self) -> Result<WriteLock<'_>, BankError> {
        FileExt::lock_exclusive(&self.file)
            .map_err(|source| BankError::lock("exclusive", &self.path, source))?;
        Ok(WriteLock {
            inner: ReadLock { bank: self },
        })
    }

    pub fn find(&self, text: &str) -> Result<Option<LineId>, BankError> {
        self.read_lock()?.find(text)
    }

    pub fn add(&self, text: &str) -> Result<LineId, BankError> {
        self.write_lock()?.add(text)
    }

    pub fn remove(&self, id: LineId) -> Result<(), BankError> {
        self.write_lock()?.remove(id)
    }

    /// Copies every byte of `other` onto the end of this bank.
    pub fn append(&self, other: &Bank) -> Result<(), BankError> {
        let dest = self.write_lock()?;
        let src = other.read_lock()?;
        dest.append(&src)
    }

    pub fn clear(&self) -> Result<(), BankError> {
        self.write_lock()?.clear()
    }

    pub fn extract_tag(&self) -> Result<Option<ConcurrencyTag>, BankError> {
        self.read_lock()?.extract_tag()
    }

    pub fn len(&self) -> Result<u64, BankError> {
        self.file
            .metadata()
            .map(|metadata| metadata.len())
            .map_err(|source| BankError::io("reading bank size", &self.path, source))
    }

    pub fn is_empty(&self) -> Result<bool, BankError> {
        Ok(self.len()? == 0)
    }
}

/// Shared lock on a bank. Read operations live here so that a
/// [`WriteLock`] can use them through `Deref`.
#[derive(Debug)]
pub struct ReadLock<'a> {
    bank: &'a Bank,
}

impl<'a> ReadLock<'a> {
    #[must_use]
    pub fn bank(&self) -> &'a Bank {
        self.bank
    }

    /// Scanner over this bank's records. It reads the file directly, so it
    /// must not be used after the lock is dropped.
    pub fn lines(&self, buffer_size: usize) -> Result<LineIter<'a>, BankError> {
        LineIter::new(
            &self.bank.file,
            &self.bank.path,
            self.bank.kind,
            buffer_size,
        )
    }

    /// First active record equal to `text`.
    pub fn find(&self, text: &str) -> Result<Option<LineId>, BankError> {
        let mut iter = self.lines(MAX_LINE_LENGTH)?;
        while let Some((id, line)) = iter.next_line()? {
            if line == text.as_bytes() {
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Every active record equal to `text`, in file order.
    pub fn find_all(&self, text: &str) -> Result<Vec<LineId>, BankError> {
        let mut found = Vec::new();
        let mut iter = self.lines(MAX_LINE_LENGTH)?;
        while let Some((id, line)) = iter.next_line()? {
            if line == text.as_bytes() {
                found.push(id);
            }
        }
        Ok(found)
    }

    /// The record starting exactly at `offset`, whatever its classification.
    pub fn record_at(&self, offset: u32) -> Result<Option<Vec<u8>>, BankError> {
        let mut iter = self.lines(MAX_LINE_LENGTH)?;
        iter.set_file_offset(u64::from(offset))?;
        match iter.next_raw()? {
            Some((start, record)) if start == u64::from(offset) => Ok(Some(record.to_vec())),
            _ => Ok(None),
        }
    }

    /// Reads the tag from record zero, if there is a valid one.
    pub fn extract_tag(&self) -> Result<Option<ConcurrencyTag>, BankError> {
        let mut file = &self.bank.file;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| BankError::io("seeking bank", &self.bank.path, source))?;

        let mut head = Vec::with_capacity(MAX_TAG_SIZE);
        file.take(MAX_TAG_SIZE as u64)
            .read_to_end(&mut head)
            .map_err(|source| BankError::io("reading tag", &self.bank.path, source))?;

        let tag = ConcurrencyTag::parse(&head);
        if tag.is_none() {
            tracing::debug!(path = %self.bank.path.display(), "no concurrency tag at start of bank");
        }
        Ok(tag)
    }

    pub fn len(&self) -> Result<u64, BankError> {
        self.bank.len()
    }

    pub fn is_empty(&self) -> Result<bool, BankError> {
        self.bank.is_empty()
    }
}

impl Drop for ReadLock<'_> {
    fn drop(&mut self) {
        if let Err(error) = FileExt::unlock(&self.bank.file) {
            tracing::warn!(path = %self.bank.path.display(), %error, "failed to unlock bank");
        }
    }
}

/// Exclusive lock on a bank.
#[derive(Debug)]
pub struct WriteLock<'a> {
    inner: ReadLock<'a>,
}

impl<'a> Deref for WriteLock<'a> {
    type Target = ReadLock<'a>;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl WriteLock<'_> {
    fn file(&self) -> &File {
        &self.inner.bank.file
    }

    fn path(&self) -> &Path {
        &self.inner.bank.path
    }

    /// Appends `text` and one terminator, returning the new record's id.
    pub fn add(&self, text: &str) -> Result<LineId, BankError> {
        if text.len() > MAX_LINE_LENGTH {
            return Err(BankError::LineTooLong {
                path: self.path().to_path_buf(),
                length: text.len(),
                max: MAX_LINE_LENGTH,
            });
        }

        let mut file = self.file();
        let end = file
            .seek(SeekFrom::End(0))
            .map_err(|source| BankError::io("seeking bank end", self.path(), source))?;

        // A torn write from a dead process must not glue onto this record.
        let mut record = Vec::with_capacity(text.len() + 2);
        if end > 0 && !self.last_byte_is_breaker(end)? {
            record.push(b'\n');
        }
        let start = end + record.len() as u64;
        record.extend_from_slice(text.as_bytes());
        record.push(b'\n');

        let offset = u32::try_from(start).map_err(|_| BankError::OffsetOverflow {
            path: self.path().to_path_buf(),
            offset: start,
        })?;

        file.seek(SeekFrom::Start(end))
            .map_err(|source| BankError::io("seeking bank end", self.path(), source))?;
        file.write_all(&record)
            .map_err(|source| BankError::io("appending record", self.path(), source))?;

        Ok(LineId::new(self.bank().kind(), offset))
    }

    /// Soft-deletes the record at `id` by overwriting its first byte. The
    /// file length never changes.
    pub fn remove(&self, id: LineId) -> Result<(), BankError> {
        let mut file = self.file();
        file.seek(SeekFrom::Start(u64::from(id.offset)))
            .map_err(|source| BankError::io("seeking record", self.path(), source))?;
        file.write_all(&[DELETE_SENTINEL])
            .map_err(|source| BankError::io("deleting record", self.path(), source))
    }

    /// [`WriteLock::remove`], but only if the tag on disk still equals
    /// `expected`. The check and the write happen under this one lock.
    pub fn remove_guarded(&self, id: LineId, expected: &ConcurrencyTag) -> Result<(), BankError> {
        let found = self.extract_tag()?;
        if found.as_ref() != Some(expected) {
            return Err(BankError::StaleTag {
                path: self.path().to_path_buf(),
                expected: expected.to_string(),
                found: found.map(|tag| tag.to_string()),
            });
        }
        self.remove(id)
    }

    pub fn clear(&self) -> Result<(), BankError> {
        let mut file = self.file();
        file.set_len(0)
            .map_err(|source| BankError::io("truncating bank", self.path(), source))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|source| BankError::io("seeking bank", self.path(), source))?;
        Ok(())
    }

    /// Truncates the bank and writes a fresh tag as record zero.
    pub fn reset_with_tag(&self) -> Result<ConcurrencyTag, BankError> {
        self.clear()?;
        let tag = ConcurrencyTag::generate();
        self.write_raw(tag.as_bytes())?;
        Ok(tag)
    }

    /// Rewrites the bank with only its active records, in order, behind a
    /// fresh tag.
    pub fn rewrite(&self) -> Result<ConcurrencyTag, BankError> {
        let mut keep = Vec::new();
        let mut kept = 0usize;
        let deleted;
        {
            let mut iter = self.lines(MAX_LINE_LENGTH)?;
            while let Some((_, line)) = iter.next_line()? {
                keep.extend_from_slice(line);
                keep.push(b'\n');
                kept += 1;
            }
            deleted = iter.deleted_count();
        }

        let tag = self.reset_with_tag()?;
        self.write_raw(&keep)?;

        tracing::info!(
            path = %self.path().display(),
            kept,
            deleted,
            tag = %tag,
            "rewrote bank"
        );
        Ok(tag)
    }

    /// Copies the raw content of `src` onto the end of this bank.
    pub fn append(&self, src: &ReadLock<'_>) -> Result<(), BankError> {
        let mut dest = self.file();
        dest.seek(SeekFrom::End(0))
            .map_err(|source| BankError::io("seeking bank end", self.path(), source))?;

        let src_path = src.bank().path();
        let mut src_file = &src.bank().file;
        src_file
            .seek(SeekFrom::Start(0))
            .map_err(|source| BankError::io("seeking bank", src_path, source))?;

        let mut buffer = vec![0u8; MAX_LINE_LENGTH];
        loop {
            let read = match src_file.read(&mut buffer) {
                Ok(0) => break,
                Ok(read) => read,
                Err(error) if error.kind() == io::ErrorKind::Interrupted => continue,
                Err(source) => return Err(BankError::io("reading bank", src_path, source)),
            };
            dest.write_all(&buffer[..read])
                .map_err(|source| BankError::io("appending bank", self.path(), source))?;
        }
        Ok(())
    }

    fn write_raw(&self, bytes: &[u8]) -> Result<(), BankError> {
        if bytes.is_empty() {
            return Ok(());
        }
        let mut file = self.file();
        file.seek(SeekFrom::End(0))
            .map_err(|source| BankError::io("seeking bank end", self.path(), source))?;
        file.write_all(bytes)
            .map_err(|source| BankError::io("writing bank", self.path(), source))?;
        if !bytes.last().is_some_and(|&b| is_line_breaker(b)) {
            file.write_all(b"\n")
                .map_err(|source| BankError::io("writing bank", self.path(), source))?;
        }
        Ok(())
    }

    fn last_byte_is_breaker(&self, end: u64) -> Result<bool, BankError> {
        let mut file = self.file();
        file.seek(SeekFrom::Start(end - 1))
            .map_err(|source| BankError::io("seeking bank", self.path(), source))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)
            .map_err(|source| BankError::io("reading bank", self.path(), source))?;
        Ok(is_line_breaker(last[0]))
    }
}
