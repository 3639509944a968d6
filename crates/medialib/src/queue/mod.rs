//! Persisted work queues for import and export jobs.
//!
//! Both queues share one implementation, [`WorkQueue`], parameterized by a
//! [`JobKind`] that names the table and the payload. Every state change
//! runs in its own `IMMEDIATE` transaction, so a claim is the mutual
//! exclusion point for a job row.

mod job;

pub use job::{
    Export, ExportJob, ExportPayload, Import, ImportJob, ImportPayload, Job, JobKind, JobMetadata,
    JobState, Outcome,
};

use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::db::{format_ts, parse_json, parse_ts, Database};
use crate::error::QueueError;

const COLUMNS: &str = "id, endpoint_id, state, payload, metadata, record_id, create_ts, update_ts";

/// Result of [`WorkQueue::create`].
#[derive(Debug, Clone)]
pub struct Enqueued<P> {
    pub job: Job<P>,
    /// False when an existing job with the same key was returned.
    pub created: bool,
}

/// Filter for [`WorkQueue::list`]. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub endpoint_id: Option<String>,
    pub state: Option<JobState>,
    pub limit: Option<u32>,
}

/// A persisted job queue for one [`JobKind`].
pub struct WorkQueue<K: JobKind> {
    db: Database,
    _kind: PhantomData<K>,
}

impl<K: JobKind> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            db: self.db.clone(),
            _kind: PhantomData,
        }
    }
}

pub type ImportQueue = WorkQueue<Import>;
pub type ExportQueue = WorkQueue<Export>;

fn job_from_row<P: serde::de::DeserializeOwned>(row: &Row<'_>) -> Result<Job<P>, rusqlite::Error> {
    let state: String = row.get(2)?;
    let payload: String = row.get(3)?;
    let metadata: String = row.get(4)?;
    let create_ts: String = row.get(6)?;
    let update_ts: String = row.get(7)?;

    Ok(Job {
        id: row.get(0)?,
        endpoint_id: row.get(1)?,
        state: JobState::parse(&state).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown job state '{}'", state).into(),
            )
        })?,
        payload: parse_json(3, &payload)?,
        metadata: parse_json(4, &metadata)?,
        record_id: row.get(5)?,
        create_ts: parse_ts(6, &create_ts)?,
        update_ts: parse_ts(7, &update_ts)?,
    })
}

impl<K: JobKind> WorkQueue<K> {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            _kind: PhantomData,
        }
    }

    fn find_in(conn: &Connection, id: i64) -> rusqlite::Result<Option<Job<K::Payload>>> {
        let sql = format!("SELECT {} FROM {} WHERE id = ?1", COLUMNS, K::TABLE);
        conn.query_row(&sql, params![id], job_from_row).optional()
    }

    fn find_by_key(
        conn: &Connection,
        endpoint_id: &str,
        key: &str,
    ) -> rusqlite::Result<Option<Job<K::Payload>>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE endpoint_id = ?1 AND job_key = ?2",
            COLUMNS,
            K::TABLE
        );
        conn.query_row(&sql, params![endpoint_id, key], job_from_row)
            .optional()
    }

    /// Enqueues a job unless one with the same key already exists for the
    /// endpoint, in which case that job is returned untouched.
    pub fn create(
        &self,
        endpoint_id: &str,
        payload: K::Payload,
        metadata: JobMetadata,
    ) -> Result<Enqueued<K::Payload>, QueueError> {
        let key = K::key(&payload);
        let payload_json = serde_json::to_string(&payload)?;
        let metadata_json = serde_json::to_string(&metadata)?;
        let now = format_ts(Utc::now());

        let enqueued = self.db.with_tx(|tx| -> Result<_, QueueError> {
            if let Some(job) = Self::find_by_key(tx, endpoint_id, &key)? {
                return Ok(Enqueued {
                    job,
                    created: false,
                });
            }

            let sql = format!(
                "INSERT INTO {} (endpoint_id, job_key, state, payload, metadata, create_ts, update_ts)
                 VALUES (?1, ?2, 'new', ?3, ?4, ?5, ?5)",
                K::TABLE
            );
            tx.execute(&sql, params![endpoint_id, key, payload_json, metadata_json, now])?;
            let id = tx.last_insert_rowid();
            let job = Self::find_in(tx, id)?.ok_or(QueueError::NotFound(id))?;
            Ok(Enqueued { job, created: true })
        })?;

        if enqueued.created {
            log::debug!(
                "Created {} job {} for endpoint '{}' ({})",
                K::NAME,
                enqueued.job.id,
                endpoint_id,
                key
            );
        }
        Ok(enqueued)
    }

    /// Claims the oldest `new` job of the endpoint and marks it `active`.
    ///
    /// Returns `None` when the endpoint has no claimable work.
    pub fn claim(&self, endpoint_id: &str) -> Result<Option<Job<K::Payload>>, QueueError> {
        let now = format_ts(Utc::now());

        self.db.with_tx(|tx| -> Result<_, QueueError> {
            let sql = format!(
                "SELECT id FROM {} WHERE endpoint_id = ?1 AND state = 'new'
                 ORDER BY create_ts ASC, id ASC LIMIT 1",
                K::TABLE
            );
            let id: Option<i64> = tx
                .query_row(&sql, params![endpoint_id], |r| r.get(0))
                .optional()?;
            let Some(id) = id else {
                return Ok(None);
            };

            let sql = format!(
                "UPDATE {} SET state = 'active', update_ts = ?2 WHERE id = ?1 AND state = 'new'",
                K::TABLE
            );
            let changed = tx.execute(&sql, params![id, now])?;
            if changed == 0 {
                log::debug!("{} job {} was claimed elsewhere", K::NAME, id);
                return Ok(None);
            }

            Ok(Self::find_in(tx, id)?)
        })
    }

    /// Finishes an `active` job.
    ///
    /// The job's metadata and `record_id` are written back as given; a
    /// failure stores its reason in `metadata.error`.
    pub fn complete(
        &self,
        job: &Job<K::Payload>,
        outcome: Outcome,
    ) -> Result<Job<K::Payload>, QueueError> {
        let to = outcome.state();
        let mut metadata = job.metadata.clone();
        metadata.error = match outcome {
            Outcome::Failed(reason) => Some(reason),
            Outcome::Done | Outcome::Keep => None,
        };
        let metadata_json = serde_json::to_string(&metadata)?;
        let now = format_ts(Utc::now());

        self.db.with_tx(|tx| -> Result<_, QueueError> {
            let sql = format!(
                "UPDATE {} SET state = ?2, metadata = ?3, record_id = ?4, update_ts = ?5
                 WHERE id = ?1 AND state = 'active'",
                K::TABLE
            );
            let changed = tx.execute(
                &sql,
                params![job.id, to.as_str(), metadata_json, job.record_id, now],
            )?;
            let current = Self::find_in(tx, job.id)?.ok_or(QueueError::NotFound(job.id))?;
            if changed == 0 {
                return Err(QueueError::InvalidTransition {
                    id: job.id,
                    from: current.state,
                    to,
                });
            }
            Ok(current)
        })
    }

    fn transition(
        &self,
        id: i64,
        allowed: &[JobState],
        to: JobState,
    ) -> Result<Job<K::Payload>, QueueError> {
        let now = format_ts(Utc::now());

        self.db.with_tx(|tx| -> Result<_, QueueError> {
            let mut job = Self::find_in(tx, id)?.ok_or(QueueError::NotFound(id))?;
            if !allowed.contains(&job.state) {
                return Err(QueueError::InvalidTransition {
                    id,
                    from: job.state,
                    to,
                });
            }

            if to == JobState::New {
                job.metadata.error = None;
            }
            let metadata_json = serde_json::to_string(&job.metadata)?;
            let sql = format!(
                "UPDATE {} SET state = ?2, metadata = ?3, update_ts = ?4 WHERE id = ?1",
                K::TABLE
            );
            tx.execute(&sql, params![id, to.as_str(), metadata_json, now])?;
            Self::find_in(tx, id)?.ok_or(QueueError::NotFound(id))
        })
    }

    /// Returns a job to `new` and clears its error.
    ///
    /// Accepts `failed` jobs, and `active` or `hold` jobs for manual
    /// recovery. Jobs left `active` by a crash are only recovered this way.
    pub fn reset(&self, id: i64) -> Result<Job<K::Payload>, QueueError> {
        let job = self.transition(
            id,
            &[JobState::Failed, JobState::Active, JobState::Hold],
            JobState::New,
        )?;
        log::info!("Reset {} job {}", K::NAME, id);
        Ok(job)
    }

    /// Parks a pending or failed job so no worker picks it up.
    pub fn hold(&self, id: i64) -> Result<Job<K::Payload>, QueueError> {
        self.transition(id, &[JobState::New, JobState::Failed], JobState::Hold)
    }

    pub fn find(&self, id: i64) -> Result<Option<Job<K::Payload>>, QueueError> {
        let job = self.db.with_conn(|conn| Ok(Self::find_in(conn, id)?))?;
        Ok(job)
    }

    pub fn list(&self, filter: &JobFilter) -> Result<Vec<Job<K::Payload>>, QueueError> {
        let mut clauses = Vec::new();
        let mut values: Vec<String> = Vec::new();
        if let Some(endpoint_id) = &filter.endpoint_id {
            values.push(endpoint_id.clone());
            clauses.push(format!("endpoint_id = ?{}", values.len()));
        }
        if let Some(state) = filter.state {
            values.push(state.as_str().to_string());
            clauses.push(format!("state = ?{}", values.len()));
        }

        let mut sql = format!("SELECT {} FROM {}", COLUMNS, K::TABLE);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY create_ts DESC, id DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let jobs = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), job_from_row)?;
            let jobs = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(jobs)
        })?;
        Ok(jobs)
    }

    /// Job counts per state, optionally for a single endpoint.
    pub fn count_by_state(
        &self,
        endpoint_id: Option<&str>,
    ) -> Result<Vec<(JobState, u64)>, QueueError> {
        let sql = format!(
            "SELECT state, COUNT(*) FROM {}
             WHERE ?1 IS NULL OR endpoint_id = ?1
             GROUP BY state ORDER BY state",
            K::TABLE
        );
        let rows: Vec<(String, u64)> = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![endpoint_id], |r| Ok((r.get(0)?, r.get(1)?)))?;
            let rows = rows.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })?;

        Ok(rows
            .into_iter()
            .filter_map(|(state, n)| JobState::parse(&state).map(|s| (s, n)))
            .collect())
    }

    /// Removes a job row outright. Returns whether it existed.
    pub fn delete(&self, id: i64) -> Result<bool, QueueError> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", K::TABLE);
        let removed = self.db.with_conn(|conn| {
            let n = conn.execute(&sql, params![id])?;
            Ok(n > 0)
        })?;
        if removed {
            log::info!("Deleted {} job {}", K::NAME, id);
        }
        Ok(removed)
    }

    /// Deletes `done` jobs last updated before `cutoff`.
    pub fn purge_done_before(&self, cutoff: DateTime<Utc>) -> Result<u64, QueueError> {
        let sql = format!(
            "DELETE FROM {} WHERE state = 'done' AND update_ts < ?1",
            K::TABLE
        );
        let n = self.db.with_conn(|conn| {
            let n = conn.execute(&sql, params![format_ts(cutoff)])?;
            Ok(n as u64)
        })?;
        Ok(n)
    }
}
