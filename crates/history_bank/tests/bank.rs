use std::fs;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use history_bank::{Bank, BankError, BankKind, ConcurrencyTag, LineId, MAX_LINE_LENGTH};
use tempfile::TempDir;

fn bank_path() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let path = dir.path().join("history");
    (dir, path)
}

fn active_lines(bank: &Bank) -> Vec<String> {
    let lock = bank.read_lock().expect("read lock");
    let mut iter = lock.lines(MAX_LINE_LENGTH).expect("iter");
    let mut lines = Vec::new();
    while let Some((_, text)) = iter.next_line().expect("scan") {
        lines.push(String::from_utf8_lossy(text).into_owned());
    }
    lines
}

fn tagged_bank(path: &PathBuf, lines: &[&str]) -> (Bank, ConcurrencyTag) {
    let bank = Bank::open(path, BankKind::Master).expect("bank should open");
    let tag = {
        let lock = bank.write_lock().expect("write lock");
        let tag = lock.reset_with_tag().expect("tag should be written");
        for line in lines {
            lock.add(line).expect("line should be added");
        }
        tag
    };
    (bank, tag)
}

#[test]
fn open_creates_missing_file() {
    let (_dir, path) = bank_path();
    let bank = Bank::open(&path, BankKind::Session).expect("bank should open");
    assert!(path.exists());
    assert!(bank.is_empty().expect("size"));
    assert_eq!(bank.kind(), BankKind::Session);
}

#[test]
fn open_existing_reports_missing_file_as_none() {
    let (_dir, path) = bank_path();
    assert!(Bank::open_existing(&path, BankKind::Session)
        .expect("open should not fail")
        .is_none());
}

#[test]
fn add_find_remove_round_trip() {
    let (_dir, path) = bank_path();
    let bank = Bank::open(&path, BankKind::Master).expect("bank should open");

    bank.add("ls").expect("add");
    let id = bank.add("echo hi").expect("add");
    assert_eq!(id, LineId::new(BankKind::Master, 3));
    assert_eq!(bank.find("echo hi").expect("find"), Some(id));

    bank.remove(id).expect("remove");
    assert_eq!(bank.find("echo hi").expect("find"), None);
    assert_eq!(active_lines(&bank), vec!["ls".to_string()]);
}

#[test]
fn find_requires_an_exact_match() {
    let (_dir, path) = bank_path();
    let bank = Bank::open(&path, BankKind::Master).expect("bank should open");
    bank.add("git status").expect("add");

    assert!(bank.find("git").expect("find").is_none());
    assert!(bank.find("git status --short").expect("find").is_none());
    assert!(bank.find("git status").expect("find").is_some());
}

#[test]
fn soft_delete_preserves_file_size() {
    let (_dir, path) = bank_path();
    let (bank, _tag) = tagged_bank(&path, &["a", "bb", "ccc"]);
    let before = bank.len().expect("size");

    let id = bank.find("bb").expect("find").expect("present");
    bank.remove(id).expect("remove");

    assert_eq!(bank.len().expect("size"), before);
    let raw = fs::read(&path).expect("raw content");
    assert_eq!(raw[id.offset as usize], b'|');
}

#[test]
fn add_rejects_lines_over_the_limit() {
    let (_dir, path) = bank_path();
    let bank = Bank::open(&path, BankKind::Session).expect("bank should open");
    let long = "x".repeat(MAX_LINE_LENGTH + 1);

    let error = bank.add(&long).err().expect("long line must fail");
    assert!(matches!(error, BankError::LineTooLong { .. }));
    assert!(bank.is_empty().expect("size"));
}

#[test]
fn add_after_a_torn_record_starts_a_new_line() {
    let (_dir, path) = bank_path();
    fs::write(&path, b"partial").expect("seed");
    let bank = Bank::open(&path, BankKind::Session).expect("bank should open");

    let id = bank.add("next").expect("add");
    assert_eq!(id.offset, 8);
    assert_eq!(fs::read(&path).expect("raw"), b"partial\nnext\n".to_vec());
}

#[test]
fn append_copies_raw_bytes() {
    let (dir, path) = bank_path();
    let (master, _tag) = tagged_bank(&path, &["one"]);
    let session_path = dir.path().join("history_7");
    fs::write(&session_path, b"x\n|gone\ny\n").expect("seed session");
    let session = Bank::open(&session_path, BankKind::Session).expect("session");

    let before = fs::read(&path).expect("raw");
    master.append(&session).expect("append");
    let after = fs::read(&path).expect("raw");

    assert_eq!(&after[..before.len()], &before[..]);
    assert_eq!(&after[before.len()..], b"x\n|gone\ny\n");
    assert_eq!(
        active_lines(&master),
        vec!["one".to_string(), "x".to_string(), "y".to_string()]
    );
}

#[test]
fn clear_truncates() {
    let (_dir, path) = bank_path();
    let (bank, _tag) = tagged_bank(&path, &["a", "b"]);
    bank.clear().expect("clear");
    assert_eq!(bank.len().expect("size"), 0);
    assert!(bank.extract_tag().expect("tag read").is_none());
}

#[test]
fn extract_tag_reads_record_zero() {
    let (_dir, path) = bank_path();
    let (bank, tag) = tagged_bank(&path, &["a"]);
    assert_eq!(bank.extract_tag().expect("tag read"), Some(tag));
}

#[test]
fn untagged_bank_has_no_tag() {
    let (_dir, path) = bank_path();
    fs::write(&path, b"ls\ncd\n").expect("seed");
    let bank = Bank::open(&path, BankKind::Master).expect("bank should open");
    assert!(bank.extract_tag().expect("tag read").is_none());
}

#[test]
fn rewrite_keeps_active_records_in_order_with_a_new_tag() {
    let (_dir, path) = bank_path();
    let (bank, first_tag) = tagged_bank(&path, &["a", "b", "c", "d"]);
    let id = bank.find("b").expect("find").expect("present");
    bank.remove(id).expect("remove");

    let second_tag = bank.write_lock().expect("lock").rewrite().expect("rewrite");
    assert_ne!(second_tag, first_tag);
    assert_eq!(
        active_lines(&bank),
        vec!["a".to_string(), "c".to_string(), "d".to_string()]
    );

    let third_tag = bank.write_lock().expect("lock").rewrite().expect("rewrite");
    assert_ne!(third_tag, second_tag);
    assert_eq!(
        active_lines(&bank),
        vec!["a".to_string(), "c".to_string(), "d".to_string()]
    );

    let raw = fs::read(&path).expect("raw");
    let expected = format!("{third_tag}\na\nc\nd\n");
    assert_eq!(raw, expected.into_bytes());
}

#[test]
fn guarded_remove_rejects_offsets_from_before_a_rewrite() {
    let (_dir, path) = bank_path();
    let (handle_a, tag_a) = tagged_bank(&path, &["a", "b", "c"]);
    let stale_id = handle_a.find("b").expect("find").expect("present");

    let handle_b = Bank::open(&path, BankKind::Master).expect("second handle");
    handle_b.write_lock().expect("lock").rewrite().expect("rewrite");
    let before = fs::read(&path).expect("raw");

    let error = handle_a
        .write_lock()
        .expect("lock")
        .remove_guarded(stale_id, &tag_a)
        .err()
        .expect("stale tag must fail");
    assert!(error.is_stale());
    assert_eq!(fs::read(&path).expect("raw"), before);
}

#[test]
fn guarded_remove_deletes_when_tag_matches() {
    let (_dir, path) = bank_path();
    let (bank, tag) = tagged_bank(&path, &["a", "b"]);
    let id = bank.find("a").expect("find").expect("present");

    bank.write_lock()
        .expect("lock")
        .remove_guarded(id, &tag)
        .expect("matching tag should delete");
    assert_eq!(active_lines(&bank), vec!["b".to_string()]);
}

#[test]
fn record_at_returns_raw_record_or_none() {
    let (_dir, path) = bank_path();
    let (bank, _tag) = tagged_bank(&path, &["alpha", "beta"]);
    let id = bank.find("beta").expect("find").expect("present");

    let lock = bank.read_lock().expect("lock");
    assert_eq!(lock.record_at(id.offset).expect("read"), Some(b"beta".to_vec()));
    assert_eq!(lock.record_at(id.offset + 1).expect("read"), Some(b"eta".to_vec()));
    assert_eq!(lock.record_at(id.offset - 1).expect("read"), None);
}

#[test]
fn writer_blocks_readers_on_other_handles() {
    let (_dir, path) = bank_path();
    let writer = Bank::open(&path, BankKind::Master).expect("writer");
    let reader = Bank::open(&path, BankKind::Master).expect("reader");

    let lock = writer.write_lock().expect("write lock");
    lock.add("held").expect("add");

    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let found = reader.find("held").expect("find");
        tx.send(found.is_some()).expect("send");
    });

    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    drop(lock);
    assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(true));
    handle.join().expect("reader thread");
}
