//! The history orchestrator.
//!
//! A [`HistoryDb`] owns the shared master bank and, unless history is
//! shared, a private session bank that is folded into master when the
//! process goes away. Positions handed to the line editor index into an
//! in-memory map of line ids rebuilt on every [`HistoryDb::load`]: master
//! records first in file order, then session records.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use history_bank::{
    alive_marker_path, find_session_banks, is_line_breaker, session_bank_path, Bank, BankKind,
    ConcurrencyTag, LineId, MAX_LINE_LENGTH,
};

use crate::alive::{AliveMarker, MarkerState};
use crate::config::{DupeMode, HistoryConfig};
use crate::error::HistoryError;
use crate::export::ExportIter;
use crate::migrate::migrate_legacy;

/// Compaction threshold used when no line limit applies.
pub const DEFAULT_COMPACT_THRESHOLD: usize = 2500;

/// Deleted-record count above which compaction rewrites the master bank.
#[must_use]
pub fn compaction_threshold(force: bool, limit: usize, min_threshold: usize) -> usize {
    if force {
        0
    } else if limit > 0 {
        limit.max(min_threshold)
    } else {
        DEFAULT_COMPACT_THRESHOLD
    }
}

#[derive(Debug)]
pub struct HistoryDb {
    config: HistoryConfig,
    master: Option<Bank>,
    session: Option<Bank>,
    alive: Option<AliveMarker>,
    master_tag: Option<ConcurrencyTag>,
    index_map: Vec<LineId>,
    master_len: usize,
    master_deleted: usize,
}

impl HistoryDb {
    #[must_use]
    pub fn new(config: HistoryConfig) -> Self {
        Self {
            config,
            master: None,
            session: None,
            alive: None,
            master_tag: None,
            index_map: Vec::new(),
            master_len: 0,
            master_deleted: 0,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HistoryConfig {
        &self.config
    }

    #[must_use]
    pub fn is_initialised(&self) -> bool {
        self.master.is_some()
    }

    #[must_use]
    pub fn master_path(&self) -> &Path {
        &self.config.history_path
    }

    #[must_use]
    pub fn session_path(&self) -> PathBuf {
        session_bank_path(&self.config.history_path, self.config.instance_id)
    }

    /// Opens the banks. Calling it again after success does nothing.
    pub fn initialise(&mut self) -> Result<(), HistoryError> {
        if self.master.is_some() {
            return Ok(());
        }

        let master_path = self.config.history_path.clone();
        if let Some(dir) = master_path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|source| HistoryError::io("creating history directory", dir, source))?;
        }

        if !master_path.exists() {
            if let Err(error) = migrate_legacy(&master_path) {
                tracing::warn!(%error, "legacy history migration failed");
            }
        }

        let master = Bank::open(&master_path, BankKind::Master)?;
        let mut tag = master.extract_tag()?;
        if tag.is_none() {
            let lock = master.write_lock()?;
            tag = lock.extract_tag()?;
            if tag.is_none() {
                tag = Some(lock.rewrite()?);
            }
        }
        tracing::debug!(tag = ?tag.as_ref().map(ConcurrencyTag::as_str), "master bank tag");

        self.master = Some(master);
        self.master_tag = tag;

        if self.config.shared {
            return Ok(());
        }

        let session_path = self.session_path();
        self.alive = Some(AliveMarker::create(&alive_marker_path(&session_path))?);
        self.session = Some(Bank::open(&session_path, BankKind::Session)?);

        self.reap();
        Ok(())
    }

    #[must_use]
    pub fn bank(&self, kind: BankKind) -> Option<&Bank> {
        match kind {
            BankKind::Master => self.master.as_ref(),
            BankKind::Session => self.session.as_ref(),
        }
    }

    /// Bank that `add` writes to.
    #[must_use]
    pub fn active_bank(&self) -> BankKind {
        if self.config.shared {
            BankKind::Master
        } else {
            BankKind::Session
        }
    }

    /// Rebuilds the index map. With `can_clean`, over-limit lines are
    /// trimmed and the master bank compacted before the final reload.
    pub fn load(&mut self, can_clean: bool) {
        if let Err(error) = self.load_internal() {
            tracing::warn!(%error, "failed to load history");
            return;
        }

        if can_clean {
            self.trim_to_limit();
            self.compact(false);
            if let Err(error) = self.load_internal() {
                tracing::warn!(%error, "failed to reload history");
            }
        }
    }

    fn load_internal(&mut self) -> Result<(), HistoryError> {
        self.index_map.clear();
        self.master_len = 0;
        self.master_deleted = 0;

        for kind in BankKind::ALL {
            let Some(bank) = self.bank(kind) else {
                continue;
            };

            let lock = bank.read_lock()?;
            let tag = match kind {
                BankKind::Master => Some(lock.extract_tag()?),
                BankKind::Session => None,
            };

            let mut ids = Vec::new();
            let mut iter = lock.lines(MAX_LINE_LENGTH)?;
            while let Some((id, _)) = iter.next_line()? {
                ids.push(id);
            }
            let deleted = iter.deleted_count();
            drop(iter);
            drop(lock);

            self.index_map.extend(ids);
            if let Some(tag) = tag {
                self.master_tag = tag;
                self.master_len = self.index_map.len();
                self.master_deleted = deleted;
            }
        }

        tracing::debug!(
            master = self.master_len,
            session = self.index_map.len() - self.master_len,
            deleted = self.master_deleted,
            "loaded history"
        );
        Ok(())
    }

    /// Appends `text` to the active bank, honouring the whitespace and
    /// duplicate settings. Returns whether the line is now in the history.
    pub fn add(&mut self, text: &str) -> bool {
        match self.try_add(text) {
            Ok(added) => added,
            Err(error) => {
                tracing::warn!(%error, "failed to add history line");
                false
            }
        }
    }

    fn try_add(&mut self, text: &str) -> Result<bool, HistoryError> {
        if text.is_empty() {
            return Ok(false);
        }
        if self.config.ignore_leading_whitespace && text.starts_with([' ', '\t']) {
            return Ok(false);
        }
        if text.bytes().any(is_line_breaker) {
            return Err(HistoryError::EmbeddedLineBreak);
        }

        match self.config.dupe_mode {
            DupeMode::Add => {}
            DupeMode::Ignore => {
                if self.try_find(text)?.is_some() {
                    return Ok(true);
                }
            }
            DupeMode::ErasePrev => {
                self.remove_text(text);
            }
        }

        let kind = self.active_bank();
        let bank = self
            .bank(kind)
            .ok_or(HistoryError::UnknownBank { bank: kind })?;
        let id = bank.add(text)?;

        match id.bank {
            BankKind::Master => {
                self.index_map.insert(self.master_len, id);
                self.master_len += 1;
            }
            BankKind::Session => self.index_map.push(id),
        }
        Ok(true)
    }

    /// Soft-deletes the record `id`. Deletes from the master bank are
    /// refused if another process rewrote it since the last load.
    pub fn remove(&mut self, id: LineId) -> bool {
        match self.try_remove(id) {
            Ok(()) => true,
            Err(error) if error.needs_reload() => {
                tracing::warn!(%id, %error, "history changed on disk; reload before deleting");
                false
            }
            Err(error) => {
                tracing::warn!(%id, %error, "failed to delete history line");
                false
            }
        }
    }

    pub fn try_remove(&mut self, id: LineId) -> Result<(), HistoryError> {
        let bank = self
            .bank(id.bank)
            .ok_or(HistoryError::UnknownBank { bank: id.bank })?;

        {
            let lock = bank.write_lock()?;
            match id.bank {
                BankKind::Master => {
                    let tag = self.master_tag.as_ref().ok_or(HistoryError::MissingTag)?;
                    lock.remove_guarded(id, tag)?;
                }
                BankKind::Session => lock.remove(id)?,
            }
        }

        self.forget(id);
        Ok(())
    }

    /// Deletes the line at history `position`, optionally checking first
    /// that the record on disk still reads `expected`.
    pub fn remove_at(&mut self, position: usize, expected: Option<&str>) -> bool {
        match self.try_remove_at(position, expected) {
            Ok(()) => true,
            Err(error) => {
                tracing::warn!(position, %error, "failed to delete history line");
                false
            }
        }
    }

    pub fn try_remove_at(
        &mut self,
        position: usize,
        expected: Option<&str>,
    ) -> Result<(), HistoryError> {
        let id = *self
            .index_map
            .get(position)
            .ok_or(HistoryError::UnknownPosition {
                position,
                len: self.index_map.len(),
            })?;

        if let Some(expected) = expected {
            let bank = self
                .bank(id.bank)
                .ok_or(HistoryError::UnknownBank { bank: id.bank })?;
            let record = bank.read_lock()?.record_at(id.offset)?;
            if record.as_deref() != Some(expected.as_bytes()) {
                return Err(HistoryError::LineMismatch { id });
            }
        }

        self.try_remove(id)
    }

    /// Soft-deletes every active copy of `text` in every bank. Ids are
    /// found and deleted under one write lock, so no tag check is needed.
    pub fn remove_text(&mut self, text: &str) -> usize {
        let mut removed = Vec::new();

        for kind in BankKind::ALL {
            let Some(bank) = self.bank(kind) else {
                continue;
            };

            let result = bank.write_lock().and_then(|lock| {
                for id in lock.find_all(text)? {
                    lock.remove(id)?;
                    removed.push(id);
                }
                Ok(())
            });
            if let Err(error) = result {
                tracing::warn!(bank = %kind, %error, "failed to erase duplicate history lines");
            }
        }

        for id in &removed {
            self.forget(*id);
        }
        removed.len()
    }

    /// First active record equal to `text`, master bank first.
    pub fn find(&self, text: &str) -> Option<LineId> {
        self.try_find(text).unwrap_or_else(|error| {
            tracing::warn!(%error, "failed to search history");
            None
        })
    }

    pub fn try_find(&self, text: &str) -> Result<Option<LineId>, HistoryError> {
        for kind in BankKind::ALL {
            if let Some(bank) = self.bank(kind) {
                if let Some(id) = bank.find(text)? {
                    return Ok(Some(id));
                }
            }
        }
        Ok(None)
    }

    /// Soft-deletes the oldest master lines until at most the configured
    /// limit remain. Stops at the first failed delete.
    pub fn trim_to_limit(&mut self) {
        let limit = self.config.max_history();
        if limit == 0 || self.master_len <= limit {
            return;
        }

        let mut removed = 0usize;
        while self.master_len > limit {
            let Some(&id) = self.index_map.first() else {
                break;
            };
            if id.bank != BankKind::Master {
                tracing::warn!(%id, "oldest history line is not in the master bank");
                break;
            }
            if !self.remove(id) {
                break;
            }
            removed += 1;
        }

        if self.master_len > limit {
            tracing::warn!(
                removed,
                over_limit = self.master_len - limit,
                "stopped trimming history early"
            );
        } else {
            tracing::info!(removed, limit, "trimmed history to limit");
        }
    }

    /// Rewrites the master bank without its soft-deleted records once there
    /// are enough of them, or whenever `force` is set and any exist.
    pub fn compact(&mut self, force: bool) {
        let threshold = compaction_threshold(
            force,
            self.config.max_history(),
            self.config.min_compact_threshold,
        );
        tracing::debug!(
            active = self.master_len,
            deleted = self.master_deleted,
            threshold,
            "checking history compaction"
        );
        if self.master_deleted <= threshold {
            return;
        }

        let Some(master) = self.master.as_ref() else {
            return;
        };
        match master.write_lock().and_then(|lock| lock.rewrite()) {
            Ok(tag) => {
                tracing::info!(
                    active = self.master_len,
                    deleted = self.master_deleted,
                    %tag,
                    "compacted history"
                );
            }
            Err(error) => tracing::warn!(%error, "failed to compact history"),
        }
    }

    /// Folds abandoned session banks into master. Returns how many were
    /// merged.
    pub fn reap(&mut self) -> usize {
        match self.try_reap() {
            Ok(reaped) => reaped,
            Err(error) => {
                tracing::warn!(%error, "failed to reap session banks");
                0
            }
        }
    }

    fn try_reap(&self) -> Result<usize, HistoryError> {
        let master = self.master.as_ref().ok_or(HistoryError::NotInitialised)?;

        let mut reaped = 0usize;
        for (instance_id, path) in find_session_banks(&self.config.history_path)? {
            if self.session.is_some() && instance_id == self.config.instance_id {
                continue;
            }

            match reap_one(master, &path) {
                Ok(true) => {
                    reaped += 1;
                    tracing::info!(session = %path.display(), "reaped session history");
                }
                Ok(false) => {}
                Err(error) => {
                    tracing::warn!(session = %path.display(), %error, "failed to reap session history");
                }
            }
        }
        Ok(reaped)
    }

    /// Truncates every open bank; the master bank restarts with a new tag.
    pub fn clear(&mut self) -> Result<(), HistoryError> {
        for kind in BankKind::ALL {
            let Some(bank) = self.bank(kind) else {
                continue;
            };
            let lock = bank.write_lock()?;
            match kind {
                BankKind::Master => {
                    let tag = lock.reset_with_tag()?;
                    drop(lock);
                    self.master_tag = Some(tag);
                }
                BankKind::Session => lock.clear()?,
            }
        }

        self.index_map.clear();
        self.master_len = 0;
        self.master_deleted = 0;
        Ok(())
    }

    /// Streams every active line, master bank first.
    pub fn iter(&self) -> ExportIter<'_> {
        ExportIter::new(self, MAX_LINE_LENGTH)
    }

    /// [`HistoryDb::iter`] with a caller-chosen read buffer size.
    pub fn iter_with_buffer(&self, buffer_size: usize) -> ExportIter<'_> {
        ExportIter::new(self, buffer_size)
    }

    /// Lines in the index map as of the last load.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index_map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index_map.is_empty()
    }

    #[must_use]
    pub fn line_id(&self, position: usize) -> Option<LineId> {
        self.index_map.get(position).copied()
    }

    #[must_use]
    pub fn master_len(&self) -> usize {
        self.master_len
    }

    #[must_use]
    pub fn master_deleted_count(&self) -> usize {
        self.master_deleted
    }

    #[must_use]
    pub fn master_tag(&self) -> Option<&ConcurrencyTag> {
        self.master_tag.as_ref()
    }

    /// Closes the session, drops the alive marker and reaps, which merges
    /// this process's own session into master.
    pub fn shutdown(mut self) {
        self.shut_down();
    }

    fn shut_down(&mut self) {
        if self.master.is_none() {
            return;
        }

        self.session = None;
        self.alive = None;
        self.reap();
        self.master = None;
    }

    fn forget(&mut self, id: LineId) {
        let (start, end) = match id.bank {
            BankKind::Master => (0, self.master_len),
            BankKind::Session => (self.master_len, self.index_map.len()),
        };

        match self.index_map[start..end].binary_search(&id) {
            Ok(found) => {
                self.index_map.remove(start + found);
                if id.bank == BankKind::Master {
                    self.master_len -= 1;
                    self.master_deleted += 1;
                }
            }
            Err(_) => tracing::debug!(%id, "deleted line was not in the index map"),
        }
    }
}

impl Drop for HistoryDb {
    fn drop(&mut self) {
        self.shut_down();
    }
}

/// Appends one orphaned session to master and deletes it. The master write
/// lock is held throughout, so a concurrent reaper finds the file gone.
fn reap_one(master: &Bank, session_path: &Path) -> Result<bool, HistoryError> {
    if AliveMarker::probe(&alive_marker_path(session_path))? == MarkerState::Alive {
        return Ok(false);
    }

    let dest = master.write_lock()?;
    let Some(orphan) = Bank::open_existing(session_path, BankKind::Session)? else {
        return Ok(false);
    };

    {
        let src = orphan.read_lock()?;
        if !src.is_empty()? {
            dest.append(&src)?;
        }
    }
    drop(orphan);

    match fs::remove_file(session_path) {
        Ok(()) => {}
        Err(error) if error.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(HistoryError::io(
                "removing reaped session",
                session_path,
                source,
            ))
        }
    }
    drop(dest);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::{compaction_threshold, DEFAULT_COMPACT_THRESHOLD};

    #[test]
    fn threshold_is_zero_when_forced() {
        assert_eq!(compaction_threshold(true, 2500, 200), 0);
    }

    #[test]
    fn threshold_uses_the_larger_of_limit_and_floor() {
        assert_eq!(compaction_threshold(false, 2500, 200), 2500);
        assert_eq!(compaction_threshold(false, 6, 200), 200);
        assert_eq!(compaction_threshold(false, 6, 0), 6);
    }

    #[test]
    fn threshold_falls_back_without_a_limit() {
        assert_eq!(
            compaction_threshold(false, 0, 200),
            DEFAULT_COMPACT_THRESHOLD
        );
    }
}
