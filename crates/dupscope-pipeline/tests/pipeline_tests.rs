//! Integration tests for the indexing pipeline.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dupscope_core::{HashKey, HashMode, IndexConfig};
use dupscope_index::IndexStore;
use dupscope_pipeline::{Indexer, PipelineError};
use dupscope_scan::{ContentSource, ReadSeek};
use tempfile::TempDir;

/// Fails the `fail_on`-th open (1-based), or every open of `fail_name`.
struct FailingSource {
    opens: AtomicUsize,
    fail_on: Option<usize>,
    fail_name: Option<&'static str>,
    failed: Mutex<Vec<PathBuf>>,
}

impl FailingSource {
    fn on_open(n: usize) -> Self {
        Self {
            opens: AtomicUsize::new(0),
            fail_on: Some(n),
            fail_name: None,
            failed: Mutex::new(Vec::new()),
        }
    }

    fn on_name(name: &'static str) -> Self {
        Self {
            opens: AtomicUsize::new(0),
            fail_on: None,
            fail_name: Some(name),
            failed: Mutex::new(Vec::new()),
        }
    }
}

impl ContentSource for FailingSource {
    fn open(&self, path: &Path) -> io::Result<Box<dyn ReadSeek>> {
        let n = self.opens.fetch_add(1, Ordering::SeqCst) + 1;
        let by_count = self.fail_on == Some(n);
        let by_name = self
            .fail_name
            .is_some_and(|name| path.file_name().is_some_and(|f| f == name));
        if by_count || by_name {
            self.failed.lock().unwrap().push(path.to_path_buf());
            return Err(io::Error::from(io::ErrorKind::PermissionDenied));
        }
        Ok(Box::new(File::open(path)?))
    }
}

struct Fixture {
    temp: TempDir,
    store: Arc<IndexStore>,
}

impl Fixture {
    fn new() -> Self {
        let temp = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::open(temp.path().join("state/index.db")).unwrap());
        fs::create_dir(temp.path().join("data")).unwrap();
        Self { temp, store }
    }

    fn data(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    fn write(&self, rel: impl AsRef<Path>, content: impl AsRef<[u8]>) -> PathBuf {
        let path = self.data().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, content).unwrap();
        path
    }

    fn config(&self) -> IndexConfig {
        IndexConfig::new([self.data()])
    }

    fn index(&self, config: IndexConfig) -> Result<dupscope_pipeline::IndexSummary, PipelineError> {
        Indexer::new(config, Arc::clone(&self.store)).run()
    }

    fn key_of(&self, path: &Path) -> Option<HashKey> {
        let path = path.canonicalize().unwrap();
        self.store
            .record_by_folder_filename(path.parent().unwrap(), path.file_name().unwrap())
            .unwrap()
            .map(|r| r.key)
    }

    fn snapshot(&self) -> Vec<(PathBuf, OsString, HashKey)> {
        self.store
            .all_records()
            .unwrap()
            .into_iter()
            .map(|r| (r.folder, r.name, r.key))
            .collect()
    }
}

fn mixed_tree(fx: &Fixture) {
    fx.write("a.txt", "0123456789");
    fx.write("b.txt", "0123456789");
    fx.write("c.txt", "abcdefghij");
    fx.write("d.txt", "twenty bytes exactly");
    fx.write("e.txt", "thirty bytes of unique content");
    fx.write("sub/f.txt", "0123456789");
    fx.write("sub/deeper/g.txt", "forty bytes of content in a deep subdir!");
    fx.write("sub/empty.txt", "");
}

/// Every size shared by two or more records has no placeholder left, and
/// every size held by one record keeps it.
fn assert_placeholder_invariants(records: &[(PathBuf, OsString, HashKey)]) {
    let mut by_size: HashMap<u64, Vec<&HashKey>> = HashMap::new();
    for (_, _, key) in records {
        by_size.entry(key.size).or_default().push(key);
    }
    for (size, keys) in by_size {
        if keys.len() >= 2 {
            assert!(
                keys.iter().all(|k| !k.is_placeholder()),
                "size {size} still has a placeholder"
            );
        } else {
            assert!(keys[0].is_placeholder(), "lone size {size} was hashed");
        }
    }
}

#[test]
fn test_placeholder_invariants_hold() {
    let fx = Fixture::new();
    mixed_tree(&fx);

    let summary = fx.index(fx.config()).unwrap();
    assert_eq!(summary.files_indexed, 7);
    assert_eq!(summary.errors, 0);

    let records = fx.snapshot();
    assert_eq!(records.len(), 7);
    assert_placeholder_invariants(&records);

    let a = fx.key_of(&fx.data().join("a.txt")).unwrap();
    let b = fx.key_of(&fx.data().join("b.txt")).unwrap();
    let c = fx.key_of(&fx.data().join("c.txt")).unwrap();
    let f = fx.key_of(&fx.data().join("sub/f.txt")).unwrap();
    assert_eq!(a, b);
    assert_eq!(a, f);
    assert_ne!(a, c);
    assert!(fx.key_of(&fx.data().join("sub/empty.txt")).is_none());
}

#[test]
fn test_reindex_is_idempotent() {
    let fx = Fixture::new();
    mixed_tree(&fx);

    fx.index(fx.config()).unwrap();
    let first = fx.snapshot();
    fx.index(fx.config()).unwrap();
    let second = fx.snapshot();

    assert_eq!(first, second);
    assert_eq!(fx.store.count_files().unwrap(), 7);
}

#[test]
fn test_many_workers_same_result() {
    let fx = Fixture::new();
    for i in 0..40 {
        fx.write(&format!("dir{}/file{i:02}.bin", i % 4), vec![(i % 3) as u8; 64]);
    }
    for i in 0..10 {
        fx.write(&format!("solo/{i}.bin"), vec![7u8; 100 + i]);
    }

    let mut config = fx.config();
    config.workers = 8;
    fx.index(config).unwrap();

    let records = fx.snapshot();
    assert_eq!(records.len(), 50);
    assert_placeholder_invariants(&records);

    let digests: std::collections::HashSet<_> = records
        .iter()
        .filter(|(_, _, k)| k.size == 64)
        .map(|(_, _, k)| k.digest.clone())
        .collect();
    assert_eq!(digests.len(), 3);
}

#[test]
fn test_later_run_promotes_earlier_placeholder() {
    let fx = Fixture::new();
    let first = fx.write("left/one.bin", "same-size-A");
    fx.index(IndexConfig::new([fx.data().join("left")])).unwrap();
    assert!(fx.key_of(&first).unwrap().is_placeholder());

    let second = fx.write("right/two.bin", "same-size-B");
    let summary = fx.index(IndexConfig::new([fx.data().join("right")])).unwrap();
    assert!(summary.promotions >= 1);

    let one = fx.key_of(&first).unwrap();
    let two = fx.key_of(&second).unwrap();
    assert!(!one.is_placeholder());
    assert!(!two.is_placeholder());
    assert_ne!(one, two);
}

#[test]
fn test_full_and_quick_modes_differ_on_large_files() {
    let fx = Fixture::new();
    let base: Vec<u8> = (0..20_000).map(|i| (i % 251) as u8).collect();
    let mut other = base.clone();
    other[10_000] ^= 0xff;
    let a = fx.write("a.bin", &base);
    let b = fx.write("b.bin", &other);

    let mut quick = fx.config();
    quick.quick_window = 1024;
    fx.index(quick).unwrap();
    assert_eq!(fx.key_of(&a), fx.key_of(&b));

    let mut full = fx.config();
    full.hash_mode = HashMode::Full;
    fx.index(full).unwrap();
    assert_ne!(fx.key_of(&a), fx.key_of(&b));
}

#[test]
fn test_ignore_errors_skips_failed_file() {
    let fx = Fixture::new();
    fx.write("x1.bin", "same");
    fx.write("x2.bin", "same");
    let bad = fx.write("x3.bin", "same");

    let mut config = fx.config();
    config.ignore_errors = true;
    let source = Arc::new(FailingSource::on_name("x3.bin"));
    let summary = Indexer::new(config, Arc::clone(&fx.store))
        .with_source(source)
        .run()
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(fx.store.count_files().unwrap(), 2);
    assert!(fx.key_of(&bad).is_none());
}

#[test]
fn test_permission_failure_cancels_run() {
    let fx = Fixture::new();
    for i in 0..200 {
        fx.write(&format!("f{i:03}.bin"), format!("content-{i:03}"));
    }

    let mut config = fx.config();
    config.workers = 3;
    let depth = config.queue_depth() as u64;
    let source = Arc::new(FailingSource::on_open(2));
    let indexer = Indexer::new(config, Arc::clone(&fx.store)).with_source(source.clone());
    let cancel = indexer.cancel_token();

    let err = indexer.run().unwrap_err();
    assert!(matches!(err, PipelineError::Fingerprint(_)), "got {err:?}");
    assert!(cancel.is_cancelled());
    assert!(fx.store.count_files().unwrap() < 200);

    // The failed file never received a digest.
    let failed = source.failed.lock().unwrap().clone();
    assert_eq!(failed.len(), 1);
    let key = fx.key_of(&failed[0]);
    assert!(key.is_none_or(|k| k.is_placeholder()));

    // Writes stop soon after the failure: at most the queued and in-flight work lands.
    assert!(fx.store.count_files().unwrap() <= 2 + 2 * depth + 3);
}

#[test]
fn test_unreadable_placeholder_fails_once() {
    let fx = Fixture::new();
    for name in ["a.bin", "b.bin", "c.bin", "d.bin", "e.bin", "f.bin"] {
        fx.write(name, "same");
    }

    let mut config = fx.config();
    config.ignore_errors = true;
    config.workers = 1;
    let source = Arc::new(FailingSource::on_name("a.bin"));
    let summary = Indexer::new(config, Arc::clone(&fx.store))
        .with_source(source.clone())
        .run()
        .unwrap();

    assert_eq!(summary.errors, 1);
    assert_eq!(source.failed.lock().unwrap().len(), 1);
    let hashed = fx.snapshot().into_iter().filter(|(_, _, k)| !k.is_placeholder()).count();
    assert_eq!(hashed, 5);
}

#[test]
fn test_vanished_placeholder_is_dropped() {
    let fx = Fixture::new();
    let first = fx.write("left/one.bin", "same-size-A");
    fx.index(IndexConfig::new([fx.data().join("left")])).unwrap();
    let left = fx.data().join("left").canonicalize().unwrap();
    fs::remove_file(&first).unwrap();

    let second = fx.write("right/two.bin", "same-size-B");
    let summary = fx.index(IndexConfig::new([fx.data().join("right")])).unwrap();

    assert_eq!(summary.errors, 0);
    assert!(fx.store.record_by_folder_filename(&left, "one.bin").unwrap().is_none());
    assert!(fx.key_of(&second).is_some());
    assert_eq!(fx.store.count_files().unwrap(), 1);
}

#[cfg(unix)]
#[test]
fn test_non_utf8_names_are_indexed() {
    use std::os::unix::ffi::OsStrExt;

    let fx = Fixture::new();
    let a = fx.write(OsStr::from_bytes(b"a\xff.bin"), "same");
    let b = fx.write(OsStr::from_bytes(b"b\xff.bin"), "same");
    // Both names read as "x\u{FFFD}" when decoded lossily.
    let x1 = fx.write(OsStr::from_bytes(b"x\xfe"), "1");
    let x2 = fx.write(OsStr::from_bytes(b"x\xff"), "22");

    let summary = fx.index(fx.config()).unwrap();
    assert_eq!(summary.errors, 0);
    assert_eq!(fx.store.count_files().unwrap(), 4);

    let ka = fx.key_of(&a).unwrap();
    assert!(!ka.is_placeholder());
    assert_eq!(Some(ka), fx.key_of(&b));
    assert_eq!(fx.key_of(&x1).unwrap().size, 1);
    assert_eq!(fx.key_of(&x2).unwrap().size, 2);
}

#[test]
fn test_missing_root_fails_unless_ignored() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");
    let missing = fx.data().join("nope");

    let err = fx
        .index(IndexConfig::new([missing.clone(), fx.data()]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Scan(_)));

    let mut config = IndexConfig::new([missing, fx.data()]);
    config.ignore_errors = true;
    let summary = fx.index(config).unwrap();
    assert_eq!(summary.files_indexed, 1);
    assert_eq!(summary.warnings.len(), 1);
}

#[test]
fn test_external_cancel_reports_interrupted() {
    let fx = Fixture::new();
    fx.write("a.txt", "a");

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let err = Indexer::new(fx.config(), Arc::clone(&fx.store))
        .with_cancel_token(cancel)
        .run()
        .unwrap_err();
    assert!(err.is_interrupted());
}

#[test]
fn test_progress_subscription_receives_final_snapshot() {
    let fx = Fixture::new();
    mixed_tree(&fx);

    let indexer = Indexer::new(fx.config(), Arc::clone(&fx.store));
    let mut progress = indexer.subscribe();
    let summary = indexer.run().unwrap();

    let mut last = None;
    while let Ok(update) = progress.try_recv() {
        last = Some(update);
    }
    let last = last.unwrap();
    assert_eq!(last.files_indexed, summary.files_indexed);
    assert_eq!(last.files_discovered, Some(7));
}
