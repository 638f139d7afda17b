//! Consumer loop integration tests

use std::fs;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tempfile::TempDir;

use journal_bookkeeper::bookkeeper::{BookKeeper, BookKeeperConfig, Collaborators};
use journal_bookkeeper::collaborators::PackageHandler;
use journal_bookkeeper::error::{ApplyError, InvalidationError, SendError};
use journal_bookkeeper::store::{FileStore, MemoryStore, SessionFactory, StoreSession};
use journal_bookkeeper::subscriber::{read_journal, JournalEntry, Subscriber};
use journal_bookkeeper::types::{
    PackageMessage, PackageStatus, PackageStatusMessage, ProcessorProperties, RequestType, Status,
};

const SUB_AGENT: &str = "sub1";

/// Fails for packages whose id starts with `bad`, or for the first N calls
#[derive(Default)]
struct TestHandler {
    failures_left: AtomicU32,
    always_fail: AtomicBool,
    applied: Mutex<Vec<String>>,
}

impl PackageHandler for TestHandler {
    fn apply(&self, _session: &mut dyn StoreSession, msg: &PackageMessage) -> Result<(), ApplyError> {
        if self.always_fail.load(Ordering::SeqCst) || msg.pkg_id.starts_with("bad") {
            return Err(ApplyError::new("cannot install package"));
        }
        if self.failures_left.load(Ordering::SeqCst) > 0 {
            self.failures_left.fetch_sub(1, Ordering::SeqCst);
            return Err(ApplyError::new("transient failure"));
        }
        self.applied.lock().push(msg.pkg_id.clone());
        Ok(())
    }
}

fn entry(offset: u64, req_type: RequestType, pkg_id: &str) -> JournalEntry {
    JournalEntry::new(
        offset,
        PackageMessage::new("pub1", req_type, pkg_id, vec![format!("/content/{}", pkg_id)]),
    )
}

fn journal() -> Vec<JournalEntry> {
    vec![
        entry(1, RequestType::Add, "pkg-1"),
        entry(2, RequestType::Test, "test-2"),
        entry(3, RequestType::Invalidate, "inv-3"),
        entry(4, RequestType::Delete, "pkg-4"),
    ]
}

fn bookkeeper(
    store: Arc<dyn SessionFactory>,
    config: BookKeeperConfig,
    collaborators: Collaborators,
) -> Arc<BookKeeper> {
    Arc::new(BookKeeper::new(store, config, collaborators).with_retry_delay(Duration::from_millis(5)))
}

#[test]
fn test_entries_routed_by_request_type() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(TestHandler::default());
    let invalidated = Arc::new(Mutex::new(Vec::new()));
    let processor = {
        let invalidated = Arc::clone(&invalidated);
        move |props: &ProcessorProperties| -> Result<(), InvalidationError> {
            invalidated.lock().push(props.package_id.clone());
            Ok(())
        }
    };
    let collaborators = Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>)
        .with_invalidation_processor(Arc::new(processor));
    let bk = bookkeeper(store.clone(), BookKeeperConfig::new("sling-1", SUB_AGENT), collaborators);

    let summary = Subscriber::new(Arc::clone(&bk)).run(journal());

    assert_eq!(summary.handled, 4);
    assert_eq!(summary.already_processed, 0);
    assert_eq!(summary.retries, 0);
    assert!(!summary.interrupted);
    assert_eq!(*handler.applied.lock(), vec!["pkg-1".to_string(), "pkg-4".to_string()]);
    assert_eq!(*invalidated.lock(), vec!["inv-3".to_string()]);
    assert_eq!(bk.load_offset().unwrap(), Some(4));
}

#[test]
fn test_replay_skips_processed_entries() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(TestHandler::default());
    let config = BookKeeperConfig::new("sling-1", SUB_AGENT);

    let first = bookkeeper(
        store.clone(),
        config.clone(),
        Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>),
    );
    Subscriber::new(first).run(journal());

    let second = bookkeeper(
        store.clone(),
        config,
        Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>),
    );
    let mut entries = journal();
    entries.push(entry(5, RequestType::Add, "pkg-5"));
    let summary = Subscriber::new(Arc::clone(&second)).run(entries);

    assert_eq!(summary.already_processed, 4);
    assert_eq!(summary.handled, 1);
    assert_eq!(handler.applied.lock().len(), 3);
    assert_eq!(second.load_offset().unwrap(), Some(5));
}

#[test]
fn test_transient_failures_are_retried_in_place() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(TestHandler::default());
    handler.failures_left.store(2, Ordering::SeqCst);
    let bk = bookkeeper(
        store,
        BookKeeperConfig::new("sling-1", SUB_AGENT).with_max_retries(5),
        Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>),
    );

    let summary = Subscriber::new(Arc::clone(&bk)).run(vec![
        entry(1, RequestType::Add, "pkg-1"),
        entry(2, RequestType::Add, "pkg-2"),
    ]);

    assert_eq!(summary.handled, 2);
    assert_eq!(summary.retries, 2);
    assert_eq!(*handler.applied.lock(), vec!["pkg-1".to_string(), "pkg-2".to_string()]);
    assert_eq!(bk.retries("pub1"), 0);
    assert_eq!(bk.metrics_snapshot().transient_import_errors, 1);
}

#[test]
fn test_exhausted_entry_is_given_up_and_passed() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(TestHandler::default());
    let bk = bookkeeper(
        store.clone(),
        BookKeeperConfig::new("sling-1", SUB_AGENT).with_max_retries(2),
        Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>),
    );

    let summary = Subscriber::new(Arc::clone(&bk)).run(vec![
        entry(1, RequestType::Add, "bad-1"),
        entry(2, RequestType::Add, "pkg-2"),
    ]);

    assert_eq!(summary.handled, 2);
    assert_eq!(summary.retries, 2);
    assert_eq!(*handler.applied.lock(), vec!["pkg-2".to_string()]);
    assert_eq!(bk.load_offset().unwrap(), Some(2));
    assert_eq!(bk.metrics_snapshot().permanent_import_errors, 1);
}

struct CrashingHandler;

impl PackageHandler for CrashingHandler {
    fn apply(&self, _session: &mut dyn StoreSession, msg: &PackageMessage) -> Result<(), ApplyError> {
        if msg.pkg_id.starts_with("crash") {
            panic!("handler crashed on {}", msg.pkg_id);
        }
        Ok(())
    }
}

#[test]
fn test_panicking_handler_does_not_stop_the_loop() {
    let bk = bookkeeper(
        Arc::new(MemoryStore::new()),
        BookKeeperConfig::new("sling-1", SUB_AGENT).with_max_retries(1),
        Collaborators::new(Arc::new(CrashingHandler)),
    );

    let summary = Subscriber::new(Arc::clone(&bk)).run(vec![
        entry(1, RequestType::Add, "crash-1"),
        entry(2, RequestType::Add, "pkg-2"),
    ]);

    assert_eq!(summary.handled, 2);
    assert_eq!(summary.retries, 1);
    assert_eq!(bk.load_offset().unwrap(), Some(2));
    assert_eq!(bk.metrics_snapshot().permanent_import_errors, 1);
}

#[test]
fn test_interrupt_stops_retry_loop() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(TestHandler::default());
    handler.always_fail.store(true, Ordering::SeqCst);
    let bk = Arc::new(
        BookKeeper::new(
            store,
            BookKeeperConfig::new("sling-1", SUB_AGENT),
            Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>),
        )
        .with_retry_delay(Duration::from_secs(30)),
    );

    let interrupt = bk.interrupt().clone();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        interrupt.trigger();
    });

    let summary = Subscriber::new(Arc::clone(&bk)).run(journal());
    stopper.join().unwrap();

    assert!(summary.interrupted);
    assert_eq!(summary.handled, 0);
    assert_eq!(summary.retries, 1);
    assert_eq!(bk.load_offset().unwrap(), None);
}

#[test]
fn test_initial_offset_seeds_start_position() {
    let store = Arc::new(MemoryStore::new());
    let handler = Arc::new(TestHandler::default());
    let bk = bookkeeper(
        store,
        BookKeeperConfig::new("sling-1", SUB_AGENT),
        Collaborators::new(Arc::clone(&handler) as Arc<dyn PackageHandler>),
    );

    let summary = Subscriber::new(Arc::clone(&bk))
        .with_initial_offset(2)
        .run(journal());

    assert_eq!(summary.already_processed, 2);
    assert_eq!(summary.handled, 2);
    assert_eq!(*handler.applied.lock(), vec!["pkg-4".to_string()]);
}

#[test]
fn test_editable_mode_sends_status_per_entry() {
    let store = Arc::new(MemoryStore::new());
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let failures_left = Arc::new(AtomicU32::new(1));
    let status_sink = {
        let statuses = Arc::clone(&statuses);
        let failures_left = Arc::clone(&failures_left);
        move |msg: &PackageStatusMessage| -> Result<(), SendError> {
            if failures_left.load(Ordering::SeqCst) > 0 {
                failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(SendError("journal unreachable".to_string()));
            }
            statuses.lock().push(msg.clone());
            Ok(())
        }
    };
    let collaborators = Collaborators::new(Arc::new(TestHandler::default()))
        .with_status_sink(Arc::new(status_sink));
    let bk = bookkeeper(
        store.clone(),
        BookKeeperConfig::new("sling-1", SUB_AGENT).with_editable(true),
        collaborators,
    );

    let summary = Subscriber::new(Arc::clone(&bk)).run(vec![
        entry(1, RequestType::Add, "pkg-1"),
        entry(2, RequestType::Delete, "pkg-2"),
    ]);

    assert_eq!(summary.handled, 2);
    let offsets: Vec<Option<u64>> = statuses.lock().iter().map(|s| s.offset).collect();
    assert_eq!(offsets, vec![Some(1), Some(2)]);

    let status = PackageStatus::from_map(&store.record("statuses", SUB_AGENT).unwrap());
    assert_eq!(status.status, Some(Status::Imported));
    assert!(status.sent);
}

#[test]
fn test_replay_journal_file_into_file_store() {
    let temp_dir = TempDir::new().unwrap();
    let journal_path = temp_dir.path().join("journal.jsonl");
    let lines: Vec<String> = journal()
        .iter()
        .map(|entry| entry.to_json_line().unwrap())
        .collect();
    fs::write(&journal_path, lines.join("\n")).unwrap();
    let data_dir = temp_dir.path().join("data");

    let run = || {
        let store = Arc::new(FileStore::open(&data_dir).unwrap());
        let bk = bookkeeper(
            store,
            BookKeeperConfig::new("sling-1", SUB_AGENT),
            Collaborators::new(Arc::new(TestHandler::default())),
        );
        let summary = Subscriber::new(Arc::clone(&bk)).run(read_journal(&journal_path).unwrap());
        (summary, bk.load_offset().unwrap())
    };

    let (first, offset) = run();
    assert_eq!(first.handled, 4);
    assert_eq!(offset, Some(4));

    let (second, offset) = run();
    assert_eq!(second.handled, 0);
    assert_eq!(second.already_processed, 4);
    assert_eq!(offset, Some(4));
}
