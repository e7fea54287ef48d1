use std::cell::RefCell;
use std::fs;

use bucket_mirror_core::error::LedgerError;
use bucket_mirror_core::ledger::{ingest_all, Ledger};
use tempfile::tempdir;

#[test]
fn record_makes_an_id_seen() {
    let dir = tempdir().unwrap();
    let mut ledger = Ledger::open(dir.path().join("download_archive.txt")).unwrap();

    assert!(!ledger.seen("youtube abc123"));
    ledger.record("youtube abc123").unwrap();
    assert!(ledger.seen("youtube abc123"));
    assert_eq!(ledger.len(), 1);
}

#[test]
fn entries_survive_a_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("archive.txt");
    {
        let mut ledger = Ledger::open(&path).unwrap();
        ledger.record("one").unwrap();
        ledger.record("two").unwrap();
        ledger.record("one").unwrap();
    }

    let reopened = Ledger::open(&path).unwrap();
    assert_eq!(reopened.ids().collect::<Vec<_>>(), vec!["one", "two"]);
    assert_eq!(fs::read_to_string(&path).unwrap(), "one\ntwo\n");
}

#[test]
fn existing_file_lines_are_trimmed() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.txt");
    fs::write(&path, "youtube aaa\r\n\n  youtube bbb  \n").unwrap();

    let ledger = Ledger::open(&path).unwrap();
    assert!(ledger.seen("youtube aaa"));
    assert!(ledger.seen("youtube bbb"));
    assert_eq!(ledger.len(), 2);
}

#[test]
fn blank_or_multiline_ids_are_rejected() {
    let dir = tempdir().unwrap();
    let mut ledger = Ledger::open(dir.path().join("archive.txt")).unwrap();

    assert!(matches!(ledger.record("  "), Err(LedgerError::InvalidId(_))));
    assert!(matches!(ledger.record("a\nb"), Err(LedgerError::InvalidId(_))));
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn ingest_skips_ids_already_recorded() {
    let dir = tempdir().unwrap();
    let mut ledger = Ledger::open(dir.path().join("archive.txt")).unwrap();
    ledger.record("old").unwrap();
    let fetched = RefCell::new(Vec::new());

    let report = ingest_all(
        &mut ledger,
        vec!["old".to_string(), "new".to_string()],
        |id| {
            fetched.borrow_mut().push(id);
            async { Ok::<(), String>(()) }
        },
    )
    .await;

    assert!(report.is_success());
    assert_eq!(fetched.into_inner(), vec!["new".to_string()]);
    assert_eq!(report.skipped, vec!["old".to_string()]);
    assert!(ledger.seen("new"));
}

#[tokio::test]
async fn failed_fetch_is_not_recorded() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.txt");
    let mut ledger = Ledger::open(&path).unwrap();

    let report = ingest_all(&mut ledger, vec!["broken".to_string()], |_| async {
        Err::<(), _>("HTTP 403")
    })
    .await;

    assert!(!report.is_success());
    assert_eq!(report.failed, vec![("broken".to_string(), "HTTP 403".to_string())]);
    assert!(!Ledger::open(&path).unwrap().seen("broken"));
}

#[tokio::test]
async fn crash_before_record_refetches_once() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.txt");
    let fetches = RefCell::new(0usize);

    // First process fetched but died before recording.
    {
        let ledger = Ledger::open(&path).unwrap();
        assert!(!ledger.seen("item"));
        *fetches.borrow_mut() += 1;
    }

    for _ in 0..2 {
        let mut ledger = Ledger::open(&path).unwrap();
        ingest_all(&mut ledger, vec!["item".to_string()], |_| {
            *fetches.borrow_mut() += 1;
            async { Ok::<(), String>(()) }
        })
        .await;
    }

    assert_eq!(fetches.into_inner(), 2);
}

#[test]
fn unterminated_last_line_is_dropped_before_appending() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.txt");
    fs::write(&path, "youtube done\nyoutube vid").unwrap();

    {
        let mut ledger = Ledger::open(&path).unwrap();
        assert!(ledger.seen("youtube done"));
        assert!(!ledger.seen("youtube vid"));
        ledger.record("youtube def").unwrap();
    }

    let reopened = Ledger::open(&path).unwrap();
    assert!(reopened.seen("youtube done"));
    assert!(reopened.seen("youtube def"));
    assert!(!reopened.seen("youtube vid"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "youtube done\nyoutube def\n"
    );
}

#[test]
fn record_after_lone_fragment_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("archive.txt");
    fs::write(&path, "abc").unwrap();

    Ledger::open(&path).unwrap().record("def").unwrap();

    let reopened = Ledger::open(&path).unwrap();
    assert!(reopened.seen("def"));
    assert!(!reopened.seen("abcdef"));
    assert_eq!(fs::read_to_string(&path).unwrap(), "def\n");
}

#[tokio::test]
async fn invalid_ids_are_never_fetched() {
    let dir = tempdir().unwrap();
    let mut ledger = Ledger::open(dir.path().join("archive.txt")).unwrap();
    let fetched = RefCell::new(Vec::new());

    let report = ingest_all(
        &mut ledger,
        vec!["  ".to_string(), "a\nb".to_string(), "ok".to_string()],
        |id| {
            fetched.borrow_mut().push(id);
            async { Ok::<(), String>(()) }
        },
    )
    .await;

    assert_eq!(fetched.into_inner(), vec!["ok".to_string()]);
    assert_eq!(report.fetched, vec!["ok".to_string()]);
    assert_eq!(report.failed.len(), 2);
    assert!(report.record_warnings.is_empty());
    assert!(!report.is_success());
}
