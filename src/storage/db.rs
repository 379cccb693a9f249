use redb::{Database as RedbDatabase, ReadTransaction, WriteTransaction};
use std::path::Path;
use thiserror::Error;

use super::tables::*;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),
    #[error("Deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("Serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("Inconsistent pool state: {0}")]
    Inconsistent(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Database error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),
    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),
}

/// Durable lease store backed by redb.
///
/// redb allows a single write transaction at a time, so every mutating
/// store operation is serialized against all others.
pub struct Database {
    db: RedbDatabase,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self, DatabaseError> {
        std::fs::create_dir_all(data_dir.as_ref())?;
        let db_path = data_dir.as_ref().join("lease-manager.redb");
        let db = RedbDatabase::create(db_path)?;

        // Initialize tables
        let write_txn = db.begin_write()?;
        {
            // Create tables if they don't exist
            let _ = write_txn.open_table(IDENTIFIERS)?;
            let _ = write_txn.open_table(IDENTIFIER_VALUES)?;
            let _ = write_txn.open_table(HOLDERS)?;
            let _ = write_txn.open_table(FREE_IDENTIFIERS)?;
            let _ = write_txn.open_table(RENEWALS)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Begin a read transaction
    pub fn begin_read(&self) -> Result<ReadTransaction, DatabaseError> {
        Ok(self.db.begin_read()?)
    }

    /// Begin a write transaction
    pub fn begin_write(&self) -> Result<WriteTransaction, DatabaseError> {
        Ok(self.db.begin_write()?)
    }
}

/// Commit when something changed, otherwise abort and skip the fsync.
pub(super) fn finish(write_txn: WriteTransaction, changed: bool) -> Result<(), DatabaseError> {
    if changed {
        write_txn.commit()?;
    } else {
        write_txn.abort()?;
    }
    Ok(())
}

/// Key into the renewal index, at the microsecond precision timestamps are stored with.
pub(super) fn renewal_key(at: &chrono::DateTime<chrono::Utc>, seq: u64) -> (i64, u64) {
    (at.timestamp_micros(), seq)
}
