//! SQLite-backed fingerprint index.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use rusqlite::types::{Type, ValueRef};
use rusqlite::{Connection, OptionalExtension, Row, Transaction, params};
use tracing::{debug, info};

use dupscope_core::{HashKey, IndexRecord, MAX_DIGEST_LEN, default_index_path};

use crate::error::{IndexError, IndexResult};
use crate::sql::*;

/// Default time a connection waits on a locked database.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Default memory-mapped I/O window.
pub const DEFAULT_MMAP_SIZE: i64 = 256 * 1024 * 1024;

/// Connection tuning for [`IndexStore::open_with`].
#[derive(Debug, Clone, Copy)]
pub struct StoreOptions {
    /// How long a statement waits for a lock before failing.
    pub busy_timeout: Duration,
    /// Memory-mapped I/O window in bytes.
    pub mmap_size: i64,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            mmap_size: DEFAULT_MMAP_SIZE,
        }
    }
}

/// Durable map from (folder, filename) to the file's [`HashKey`].
///
/// The store owns exactly two connections: a writer used by every mutating
/// operation and a query-only reader. Each is guarded by its own mutex, so the
/// store can be shared behind an `Arc` while writes stay serialized.
#[derive(Debug)]
pub struct IndexStore {
    path: PathBuf,
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl IndexStore {
    /// Open or create the index at `path` with default options.
    pub fn open(path: impl AsRef<Path>) -> IndexResult<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open or create the index at the per-user default location.
    pub fn open_default() -> IndexResult<Self> {
        let path = default_index_path().ok_or(IndexError::NoConfigDir)?;
        Self::open(path)
    }

    /// Open or create the index at `path`.
    ///
    /// Missing parent directories are created. The schema is applied
    /// idempotently and every statement is compiled up front.
    pub fn open_with(path: impl AsRef<Path>, options: StoreOptions) -> IndexResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let writer = Connection::open(&path)?;
        configure(&writer, &options)?;
        writer.execute_batch(SCHEMA)?;
        warm(&writer, WRITER_STATEMENTS)?;

        let reader = Connection::open(&path)?;
        configure(&reader, &options)?;
        reader.pragma_update(None, "query_only", true)?;
        warm(&reader, READER_STATEMENTS)?;

        info!(path = %path.display(), "index opened");

        Ok(Self {
            path,
            writer: Mutex::new(writer),
            reader: Mutex::new(reader),
        })
    }

    /// Location of the database file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Insert or replace the record for (`folder`, `name`).
    pub fn upsert(
        &self,
        folder: impl AsRef<Path>,
        name: impl AsRef<OsStr>,
        key: &HashKey,
    ) -> IndexResult<()> {
        let (folder, name) = (folder.as_ref(), name.as_ref());
        check_digest(&key.digest)?;
        let size = to_db_size(key.size)?;

        let mut conn = lock(&self.writer);
        let tx = conn.transaction()?;
        let folder_pk = resolve_folder(&tx, folder)?;
        tx.prepare_cached(UPSERT_FILE)?
            .execute(params![folder_pk, name.as_encoded_bytes(), key.digest, size])?;
        tx.commit()?;

        debug!(path = %folder.join(name).display(), size = key.size, "upserted");
        Ok(())
    }

    /// Replace the digest of an existing record.
    ///
    /// Returns [`IndexError::NotFound`] when the file is not indexed.
    pub fn update_hash(
        &self,
        folder: impl AsRef<Path>,
        name: impl AsRef<OsStr>,
        digest: &str,
    ) -> IndexResult<()> {
        let (folder, name) = (folder.as_ref(), name.as_ref());
        check_digest(digest)?;

        let mut conn = lock(&self.writer);
        let tx = conn.transaction()?;
        let folder_pk = find_folder(&tx, folder)?.ok_or_else(|| not_found(folder, name))?;
        let changed = tx
            .prepare_cached(UPDATE_HASH)?
            .execute(params![folder_pk, name.as_encoded_bytes(), digest])?;
        if changed == 0 {
            return Err(not_found(folder, name));
        }
        tx.commit()?;

        debug!(path = %folder.join(name).display(), "hash updated");
        Ok(())
    }

    /// Delete the record for (`folder`, `name`).
    ///
    /// Returns [`IndexError::NotFound`] when the file is not indexed.
    pub fn remove(&self, folder: impl AsRef<Path>, name: impl AsRef<OsStr>) -> IndexResult<()> {
        let (folder, name) = (folder.as_ref(), name.as_ref());
        let mut conn = lock(&self.writer);
        let tx = conn.transaction()?;
        let folder_pk = find_folder(&tx, folder)?.ok_or_else(|| not_found(folder, name))?;
        let changed = tx
            .prepare_cached(DELETE_FILE)?
            .execute(params![folder_pk, name.as_encoded_bytes()])?;
        if changed == 0 {
            return Err(not_found(folder, name));
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete every file and folder record.
    pub fn clear_all(&self) -> IndexResult<()> {
        let mut conn = lock(&self.writer);
        let tx = conn.transaction()?;
        let files = tx.prepare_cached(DELETE_ALL_FILES)?.execute([])?;
        let folders = tx.prepare_cached(DELETE_ALL_FOLDERS)?.execute([])?;
        tx.commit()?;

        info!(files, folders, "index cleared");
        Ok(())
    }

    /// Number of records with the given size.
    pub fn count_by_size(&self, size: u64) -> IndexResult<u64> {
        let size = to_db_size(size)?;
        let conn = lock(&self.reader);
        let count: i64 = conn
            .prepare_cached(COUNT_BY_SIZE)?
            .query_row(params![size], |row| row.get(0))?;
        Ok(from_db_count(count))
    }

    /// Records sharing `digest` and `size`, ordered by folder then filename.
    pub fn records_by_hash_and_size(&self, digest: &str, size: u64) -> IndexResult<Vec<IndexRecord>> {
        let size = to_db_size(size)?;
        let conn = lock(&self.reader);
        let mut stmt = conn.prepare_cached(RECORDS_BY_HASH_AND_SIZE)?;
        let records = stmt
            .query_map(params![digest, size], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// The record for (`folder`, `name`), if indexed.
    pub fn record_by_folder_filename(
        &self,
        folder: impl AsRef<Path>,
        name: impl AsRef<OsStr>,
    ) -> IndexResult<Option<IndexRecord>> {
        let (folder, name) = (folder.as_ref(), name.as_ref());
        let conn = lock(&self.reader);
        let record = conn
            .prepare_cached(RECORD_BY_FOLDER_FILENAME)?
            .query_row(
                params![folder.as_os_str().as_encoded_bytes(), name.as_encoded_bytes()],
                map_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Every record, ordered by folder then filename.
    pub fn all_records(&self) -> IndexResult<Vec<IndexRecord>> {
        let conn = lock(&self.reader);
        let mut stmt = conn.prepare_cached(ALL_RECORDS)?;
        let records = stmt
            .query_map([], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Number of indexed files.
    pub fn count_files(&self) -> IndexResult<u64> {
        self.count(COUNT_FILES)
    }

    /// Number of known folders.
    pub fn count_folders(&self) -> IndexResult<u64> {
        self.count(COUNT_FOLDERS)
    }

    fn count(&self, sql: &str) -> IndexResult<u64> {
        let conn = lock(&self.reader);
        let count: i64 = conn.prepare_cached(sql)?.query_row([], |row| row.get(0))?;
        Ok(from_db_count(count))
    }
}

fn configure(conn: &Connection, options: &StoreOptions) -> IndexResult<()> {
    let mode: String =
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
    if !mode.eq_ignore_ascii_case("wal") {
        debug!(mode, "WAL journal not available");
    }
    conn.pragma_update(None, "foreign_keys", true)?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    // Some builds report the new size as a row, others return nothing.
    conn.query_row(&format!("PRAGMA mmap_size = {}", options.mmap_size), [], |row| {
        row.get::<_, i64>(0)
    })
    .optional()?;
    conn.busy_timeout(options.busy_timeout)?;
    Ok(())
}

fn warm(conn: &Connection, statements: &[&str]) -> IndexResult<()> {
    conn.set_prepared_statement_cache_capacity(statements.len().max(16));
    for sql in statements {
        conn.prepare_cached(sql)?;
    }
    Ok(())
}

fn lock(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}

fn find_folder(conn: &Connection, folder: &Path) -> IndexResult<Option<i64>> {
    let pk = conn
        .prepare_cached(SELECT_FOLDER_PK)?
        .query_row(params![folder.as_os_str().as_encoded_bytes()], |row| row.get(0))
        .optional()?;
    Ok(pk)
}

fn resolve_folder(tx: &Transaction<'_>, folder: &Path) -> IndexResult<i64> {
    if let Some(pk) = find_folder(tx, folder)? {
        return Ok(pk);
    }
    tx.prepare_cached(INSERT_FOLDER)?
        .execute(params![folder.as_os_str().as_encoded_bytes()])?;
    Ok(tx.last_insert_rowid())
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<IndexRecord> {
    let size: i64 = row.get(3)?;
    Ok(IndexRecord {
        folder: PathBuf::from(os_string(row, 0)?),
        name: os_string(row, 1)?,
        key: HashKey::new(from_db_count(size), row.get::<_, String>(2)?),
    })
}

/// Decode a stored name back into the exact OS string it was written from.
fn os_string(row: &Row<'_>, idx: usize) -> rusqlite::Result<OsString> {
    let bytes = match row.get_ref(idx)? {
        ValueRef::Blob(bytes) | ValueRef::Text(bytes) => bytes.to_vec(),
        other => {
            return Err(rusqlite::Error::InvalidColumnType(idx, "name".into(), other.data_type()));
        }
    };
    os_string_from_bytes(bytes)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Blob, err.into()))
}

#[cfg(unix)]
fn os_string_from_bytes(bytes: Vec<u8>) -> Result<OsString, std::string::FromUtf8Error> {
    use std::os::unix::ffi::OsStringExt;
    Ok(OsString::from_vec(bytes))
}

// Elsewhere only names that are valid UTF-8 can be rebuilt without unsafe code.
#[cfg(not(unix))]
fn os_string_from_bytes(bytes: Vec<u8>) -> Result<OsString, std::string::FromUtf8Error> {
    String::from_utf8(bytes).map(OsString::from)
}

fn check_digest(digest: &str) -> IndexResult<()> {
    if digest.len() > MAX_DIGEST_LEN {
        return Err(IndexError::HashTooLong {
            len: digest.len(),
            max: MAX_DIGEST_LEN,
        });
    }
    Ok(())
}

fn to_db_size(size: u64) -> IndexResult<i64> {
    i64::try_from(size).map_err(|_| IndexError::SizeOutOfRange { size })
}

fn from_db_count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

fn not_found(folder: &Path, name: &OsStr) -> IndexError {
    IndexError::NotFound {
        folder: folder.to_path_buf(),
        name: name.to_os_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open_temp() -> (TempDir, IndexStore) {
        let temp = TempDir::new().unwrap();
        let store = IndexStore::open(temp.path().join("index.db")).unwrap();
        (temp, store)
    }

    #[test]
    fn test_open_creates_parent_directories() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/dir/index.db");
        let store = IndexStore::open(&path).unwrap();
        assert!(path.exists());
        assert_eq!(store.path(), path.as_path());
        assert_eq!(store.count_files().unwrap(), 0);
    }

    #[test]
    fn test_reopen_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("index.db");
        {
            let store = IndexStore::open(&path).unwrap();
            store.upsert("/a", "x", &HashKey::new(3, "abc")).unwrap();
        }
        let store = IndexStore::open(&path).unwrap();
        assert_eq!(store.count_files().unwrap(), 1);
    }

    #[test]
    fn test_upsert_replaces_existing_row() {
        let (_temp, store) = open_temp();
        store.upsert("/a", "x", &HashKey::placeholder(10)).unwrap();
        store.upsert("/a", "x", &HashKey::new(12, "beef")).unwrap();

        let record = store.record_by_folder_filename("/a", "x").unwrap().unwrap();
        assert_eq!(record.key, HashKey::new(12, "beef"));
        assert_eq!(store.count_files().unwrap(), 1);
        assert_eq!(store.count_folders().unwrap(), 1);
    }

    #[test]
    fn test_digest_length_is_enforced_before_write() {
        let (_temp, store) = open_temp();
        let long = "f".repeat(MAX_DIGEST_LEN + 1);

        let err = store.upsert("/a", "x", &HashKey::new(1, long.clone())).unwrap_err();
        assert!(matches!(err, IndexError::HashTooLong { len: 65, max: 64 }));
        assert_eq!(store.count_folders().unwrap(), 0);

        store.upsert("/a", "x", &HashKey::new(1, "f".repeat(MAX_DIGEST_LEN))).unwrap();
        assert!(store.update_hash("/a", "x", &long).is_err());
    }

    #[test]
    fn test_oversized_size_rejected() {
        let (_temp, store) = open_temp();
        let err = store.upsert("/a", "x", &HashKey::new(u64::MAX, "aa")).unwrap_err();
        assert!(matches!(err, IndexError::SizeOutOfRange { .. }));
    }

    #[test]
    fn test_update_and_remove_missing_rows() {
        let (_temp, store) = open_temp();
        assert!(matches!(
            store.update_hash("/nowhere", "x", "aa"),
            Err(IndexError::NotFound { .. })
        ));

        store.upsert("/a", "x", &HashKey::new(1, "aa")).unwrap();
        assert!(matches!(
            store.update_hash("/a", "y", "aa"),
            Err(IndexError::NotFound { .. })
        ));
        assert!(matches!(store.remove("/a", "y"), Err(IndexError::NotFound { .. })));

        store.remove("/a", "x").unwrap();
        assert!(store.record_by_folder_filename("/a", "x").unwrap().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_stay_distinct() {
        use std::os::unix::ffi::OsStrExt;

        let (_temp, store) = open_temp();
        let folder = Path::new(OsStr::from_bytes(b"/data/\xe9t\xe9"));
        let fe = OsStr::from_bytes(b"x\xfe");
        let ff = OsStr::from_bytes(b"x\xff");

        store.upsert(folder, fe, &HashKey::placeholder(1)).unwrap();
        store.upsert(folder, ff, &HashKey::placeholder(2)).unwrap();
        assert_eq!(store.count_files().unwrap(), 2);

        let record = store.record_by_folder_filename(folder, ff).unwrap().unwrap();
        assert_eq!(record.folder.as_path(), folder);
        assert_eq!(record.name, ff);
        assert_eq!(record.key.size, 2);

        store.update_hash(folder, fe, "aa").unwrap();
        let records = store.records_by_hash_and_size("aa", 1).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].path().as_os_str().as_bytes(), b"/data/\xe9t\xe9/x\xfe");
    }
}
