//! Alive markers.
//!
//! Each process with a session bank keeps an empty `<session>~` file under
//! an exclusive advisory lock for as long as the session is in use. A marker
//! nobody holds a lock on was left behind by a process that died.
//! The lock is what makes the marker auto-deleting: it dies with its owner.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::HistoryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerState {
    /// No marker file exists.
    Missing,
    /// The owning process still holds the marker.
    Alive,
    /// The marker was stale and has been deleted.
    Abandoned,
}

#[derive(Debug)]
pub struct AliveMarker {
    path: PathBuf,
    file: Option<File>,
}

impl AliveMarker {
    /// Creates and locks the marker. It is locked under a temporary name and
    /// then renamed into place, so no reaper ever sees it unlocked.
    pub fn create(path: &Path) -> Result<Self, HistoryError> {
        let staging = {
            let mut name = path.as_os_str().to_owned();
            name.push(".new");
            PathBuf::from(name)
        };

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&staging)
            .map_err(|source| HistoryError::io("creating alive marker", &staging, source))?;
        FileExt::try_lock_exclusive(&file)
            .map_err(|source| HistoryError::io("locking alive marker", &staging, source))?;
        fs::rename(&staging, path)
            .map_err(|source| HistoryError::io("publishing alive marker", path, source))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: Some(file),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Decides whether the session guarded by `path` is still running,
    /// deleting the marker if its owner is gone.
    pub fn probe(path: &Path) -> Result<MarkerState, HistoryError> {
        let file = match OpenOptions::new().read(true).open(path) {
            Ok(file) => file,
            Err(error) if error.kind() == io::ErrorKind::NotFound => {
                return Ok(MarkerState::Missing)
            }
            Err(source) => return Err(HistoryError::io("opening alive marker", path, source)),
        };

        match FileExt::try_lock_exclusive(&file) {
            Ok(()) => {}
            Err(error) if error.kind() == fs2::lock_contended_error().kind() => {
                return Ok(MarkerState::Alive)
            }
            Err(source) => return Err(HistoryError::io("probing alive marker", path, source)),
        }

        drop(file);
        match fs::remove_file(path) {
            Ok(()) => Ok(MarkerState::Abandoned),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(MarkerState::Abandoned),
            Err(source) => Err(HistoryError::io("removing alive marker", path, source)),
        }
    }
}

impl Drop for AliveMarker {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(error) = FileExt::unlock(&file) {
                tracing::warn!(path = %self.path.display(), %error, "failed to unlock alive marker");
            }
        }
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(error) if error.kind() == io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::warn!(path = %self.path.display(), %error, "failed to remove alive marker");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;

    use super::{AliveMarker, MarkerState};

    #[test]
    fn held_marker_reads_as_alive() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("history_1~");
        let marker = AliveMarker::create(&path).expect("marker should be created");

        assert!(path.exists());
        assert_eq!(AliveMarker::probe(&path).expect("probe"), MarkerState::Alive);
        assert!(path.exists());

        drop(marker);
        assert!(!path.exists());
        assert_eq!(AliveMarker::probe(&path).expect("probe"), MarkerState::Missing);
    }

    #[test]
    fn unheld_marker_is_abandoned_and_removed() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let path = dir.path().join("history_2~");
        File::create(&path).expect("stale marker");

        assert_eq!(
            AliveMarker::probe(&path).expect("probe"),
            MarkerState::Abandoned
        );
        assert!(!path.exists());
    }
}
