//! SQL statements used by the index store.
//!
//! Every statement here is warmed into the statement cache of the connection
//! that runs it when the store is opened.

pub(crate) const SCHEMA: &str = include_str!("schema.sql");

pub(crate) const SELECT_FOLDER_PK: &str = "SELECT folder_pk FROM folders WHERE foldername = ?1";

pub(crate) const INSERT_FOLDER: &str = "INSERT INTO folders (foldername) VALUES (?1)";

pub(crate) const UPSERT_FILE: &str = "INSERT INTO files (folders_fk, filename, hash, filesize)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT(folders_fk, filename) DO UPDATE SET
         hash = excluded.hash,
         filesize = excluded.filesize";

pub(crate) const UPDATE_HASH: &str =
    "UPDATE files SET hash = ?3 WHERE folders_fk = ?1 AND filename = ?2";

pub(crate) const DELETE_FILE: &str = "DELETE FROM files WHERE folders_fk = ?1 AND filename = ?2";

pub(crate) const DELETE_ALL_FILES: &str = "DELETE FROM files";

pub(crate) const DELETE_ALL_FOLDERS: &str = "DELETE FROM folders";

pub(crate) const COUNT_BY_SIZE: &str = "SELECT COUNT(*) FROM files WHERE filesize = ?1";

pub(crate) const RECORDS_BY_HASH_AND_SIZE: &str =
    "SELECT fo.foldername, fi.filename, fi.hash, fi.filesize
     FROM files fi
     JOIN folders fo ON fo.folder_pk = fi.folders_fk
     WHERE fi.hash = ?1 AND fi.filesize = ?2
     ORDER BY fo.foldername, fi.filename";

pub(crate) const RECORD_BY_FOLDER_FILENAME: &str =
    "SELECT fo.foldername, fi.filename, fi.hash, fi.filesize
     FROM files fi
     JOIN folders fo ON fo.folder_pk = fi.folders_fk
     WHERE fo.foldername = ?1 AND fi.filename = ?2";

pub(crate) const ALL_RECORDS: &str = "SELECT fo.foldername, fi.filename, fi.hash, fi.filesize
     FROM files fi
     JOIN folders fo ON fo.folder_pk = fi.folders_fk
     ORDER BY fo.foldername, fi.filename";

pub(crate) const COUNT_FILES: &str = "SELECT COUNT(*) FROM files";

pub(crate) const COUNT_FOLDERS: &str = "SELECT COUNT(*) FROM folders";

/// Statements run on the writer connection.
pub(crate) const WRITER_STATEMENTS: &[&str] = &[
    SELECT_FOLDER_PK,
    INSERT_FOLDER,
    UPSERT_FILE,
    UPDATE_HASH,
    DELETE_FILE,
    DELETE_ALL_FILES,
    DELETE_ALL_FOLDERS,
];

/// Statements run on the reader connection.
pub(crate) const READER_STATEMENTS: &[&str] = &[
    COUNT_BY_SIZE,
    RECORDS_BY_HASH_AND_SIZE,
    RECORD_BY_FOLDER_FILENAME,
    ALL_RECORDS,
    COUNT_FILES,
    COUNT_FOLDERS,
];
