//! The boundary through which workers persist and retire records.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::db::{record_repo, Database, DatabaseError};
use crate::record::{DraftRecord, Record};

/// Counts reported by [`RecordStore::deletion_stats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletionStats {
    /// Records that carry a deletion deadline.
    pub marked: u64,
    /// Records whose deadline has passed.
    pub due: u64,
}

/// Persistence for finished records.
///
/// Import and export workers hand drafts to [`create`](RecordStore::create);
/// the retention sweeper uses the claim and delete operations.
pub trait RecordStore: Send + Sync {
    fn create(&self, draft: DraftRecord) -> Result<Record, DatabaseError>;

    fn find(&self, id: i64) -> Result<Option<Record>, DatabaseError>;

    /// Claims the oldest record due for deletion at `now`, pushing its
    /// deadline to `now + postpone` in the same transaction.
    fn claim_due_deletion(
        &self,
        now: DateTime<Utc>,
        postpone: Duration,
    ) -> Result<Option<Record>, DatabaseError>;

    fn delete(&self, id: i64) -> Result<bool, DatabaseError>;

    fn deletion_stats(&self, now: DateTime<Utc>) -> Result<DeletionStats, DatabaseError>;
}

/// [`RecordStore`] backed by the `records` table.
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Sets or clears a record's deletion deadline.
    pub fn schedule_deletion(
        &self,
        id: i64,
        delete_ts: Option<DateTime<Utc>>,
    ) -> Result<bool, DatabaseError> {
        record_repo::set_delete_ts(&self.db, id, delete_ts)
    }

    pub fn count(&self) -> Result<u64, DatabaseError> {
        record_repo::count(&self.db)
    }
}

impl RecordStore for SqliteRecordStore {
    fn create(&self, draft: DraftRecord) -> Result<Record, DatabaseError> {
        let record = record_repo::insert(&self.db, &draft)?;
        log::debug!(
            "Created record {} ({} file(s))",
            record.id,
            record.files.len()
        );
        Ok(record)
    }

    fn find(&self, id: i64) -> Result<Option<Record>, DatabaseError> {
        record_repo::find_by_id(&self.db, id)
    }

    fn claim_due_deletion(
        &self,
        now: DateTime<Utc>,
        postpone: Duration,
    ) -> Result<Option<Record>, DatabaseError> {
        record_repo::claim_due_deletion(&self.db, now, postpone)
    }

    fn delete(&self, id: i64) -> Result<bool, DatabaseError> {
        record_repo::delete(&self.db, id)
    }

    fn deletion_stats(&self, now: DateTime<Utc>) -> Result<DeletionStats, DatabaseError> {
        let (marked, due) = record_repo::deletion_counts(&self.db, now)?;
        Ok(DeletionStats { marked, due })
    }
}
