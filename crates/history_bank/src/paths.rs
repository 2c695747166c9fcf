use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::BankError;

/// File name of the pre-tag history format, looked up next to the master
/// bank.
pub const LEGACY_HISTORY_FILE: &str = ".history";

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// `<history-root>_<instance-id>`
#[must_use]
pub fn session_bank_path(history_root: &Path, instance_id: u32) -> PathBuf {
    with_suffix(history_root, &format!("_{instance_id}"))
}

/// `<session-bank>~`
#[must_use]
pub fn alive_marker_path(session_bank: &Path) -> PathBuf {
    with_suffix(session_bank, "~")
}

#[must_use]
pub fn legacy_history_path(history_root: &Path) -> PathBuf {
    match history_root.parent() {
        Some(dir) => dir.join(LEGACY_HISTORY_FILE),
        None => PathBuf::from(LEGACY_HISTORY_FILE),
    }
}

/// Instance id encoded in `candidate` if it names a session bank of
/// `history_root`.
#[must_use]
pub fn session_instance_id(history_root: &Path, candidate: &Path) -> Option<u32> {
    let root_name = history_root.file_name()?.to_str()?;
    let name = candidate.file_name()?.to_str()?;
    let digits = name.strip_prefix(root_name)?.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Session banks sitting next to `history_root`, ordered by instance id.
pub fn find_session_banks(history_root: &Path) -> Result<Vec<(u32, PathBuf)>, BankError> {
    let dir = match history_root.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let entries = match fs::read_dir(&dir) {
        Ok(entries) => entries,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => return Err(BankError::io("listing session banks", &dir, source)),
    };

    let mut sessions = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|source| BankError::io("listing session banks", &dir, source))?;
        let path = entry.path();
        if let Some(id) = session_instance_id(history_root, &path) {
            sessions.push((id, dir.join(entry.file_name())));
        }
    }

    sessions.sort();
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::path::Path;

    use super::{
        alive_marker_path, find_session_banks, legacy_history_path, session_bank_path,
        session_instance_id,
    };

    #[test]
    fn session_and_marker_names_extend_the_root() {
        let root = Path::new("/tmp/hist/history");
        let session = session_bank_path(root, 4242);
        assert_eq!(session, Path::new("/tmp/hist/history_4242"));
        assert_eq!(
            alive_marker_path(&session),
            Path::new("/tmp/hist/history_4242~")
        );
        assert_eq!(legacy_history_path(root), Path::new("/tmp/hist/.history"));
    }

    #[test]
    fn only_numeric_suffixes_are_sessions() {
        let root = Path::new("/tmp/hist/history");
        assert_eq!(
            session_instance_id(root, Path::new("/tmp/hist/history_17")),
            Some(17)
        );
        assert_eq!(
            session_instance_id(root, Path::new("/tmp/hist/history_17~")),
            None
        );
        assert_eq!(
            session_instance_id(root, Path::new("/tmp/hist/history_")),
            None
        );
        assert_eq!(
            session_instance_id(root, Path::new("/tmp/hist/history_backup")),
            None
        );
        assert_eq!(
            session_instance_id(root, Path::new("/tmp/hist/history")),
            None
        );
        assert_eq!(
            session_instance_id(root, Path::new("/tmp/hist/other_17")),
            None
        );
    }

    #[test]
    fn find_session_banks_lists_siblings_in_id_order() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let root = dir.path().join("history");
        for name in ["history", "history_30", "history_30~", "history_4", "history_x"] {
            File::create(dir.path().join(name)).expect("file should be created");
        }

        let sessions = find_session_banks(&root).expect("listing should succeed");
        assert_eq!(
            sessions,
            vec![
                (4, dir.path().join("history_4")),
                (30, dir.path().join("history_30")),
            ]
        );
    }

    #[test]
    fn missing_directory_has_no_sessions() {
        let dir = tempfile::tempdir().expect("tempdir should be created");
        let root = dir.path().join("absent").join("history");
        assert!(find_session_banks(&root)
            .expect("listing should succeed")
            .is_empty());
    }
}
