//! Record repository: persistence for the `records` table.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{format_ts, latest_ts, parse_json, parse_ts, Database, DatabaseError};
use crate::record::{Access, DraftRecord, MediaKind, Record, RecordState};

const COLUMNS: &str = "id, original_filename, export_filename, kind, state, hidden, access, \
                       tags, files, notes, source, delete_ts, create_ts, update_ts";

fn conversion_error(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("unexpected value '{}'", value).into(),
    )
}

fn record_from_row(row: &Row<'_>) -> Result<Record, rusqlite::Error> {
    let kind: String = row.get(3)?;
    let state: String = row.get(4)?;
    let access: String = row.get(6)?;
    let tags: String = row.get(7)?;
    let files: String = row.get(8)?;
    let delete_ts: Option<String> = row.get(11)?;
    let create_ts: String = row.get(12)?;
    let update_ts: String = row.get(13)?;

    Ok(Record {
        id: row.get(0)?,
        original_filename: row.get(1)?,
        export_filename: row.get(2)?,
        kind: MediaKind::parse(&kind).ok_or_else(|| conversion_error(3, &kind))?,
        state: RecordState::parse(&state).ok_or_else(|| conversion_error(4, &state))?,
        hidden: row.get(5)?,
        access: Access::parse(&access).ok_or_else(|| conversion_error(6, &access))?,
        tags: parse_json(7, &tags)?,
        files: parse_json(8, &files)?,
        notes: row.get(9)?,
        source: row.get(10)?,
        delete_ts: delete_ts.map(|ts| parse_ts(11, &ts)).transpose()?,
        create_ts: parse_ts(12, &create_ts)?,
        update_ts: parse_ts(13, &update_ts)?,
    })
}

fn find_in(conn: &Connection, id: i64) -> Result<Option<Record>, DatabaseError> {
    let sql = format!("SELECT {} FROM records WHERE id = ?1", COLUMNS);
    let record = conn
        .query_row(&sql, params![id], record_from_row)
        .optional()?;
    Ok(record)
}

/// Inserts a drafted record and returns it with its assigned id.
pub fn insert(db: &Database, draft: &DraftRecord) -> Result<Record, DatabaseError> {
    let tags = serde_json::to_string(&draft.tags)?;
    let files = serde_json::to_string(&draft.files)?;
    let now = format_ts(Utc::now());

    db.with_tx(|tx| {
        tx.execute(
            "INSERT INTO records (original_filename, export_filename, kind, state, hidden, access,
             tags, files, notes, source, delete_ts, create_ts, update_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)",
            params![
                draft.original_filename,
                draft.export_filename,
                draft.kind.as_str(),
                draft.state.as_str(),
                draft.hidden,
                draft.access.as_str(),
                tags,
                files,
                draft.notes,
                draft.source,
                draft.delete_ts.map(format_ts),
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        find_in(tx, id)?.ok_or(DatabaseError::Sqlite(rusqlite::Error::QueryReturnedNoRows))
    })
}

/// Finds a record by its ID.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<Record>, DatabaseError> {
    db.with_conn(|conn| find_in(conn, id))
}

/// Sets or clears the deletion deadline of a record.
pub fn set_delete_ts(
    db: &Database,
    id: i64,
    delete_ts: Option<DateTime<Utc>>,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute(
            "UPDATE records SET delete_ts = ?2, update_ts = ?3 WHERE id = ?1",
            params![id, delete_ts.map(format_ts), format_ts(Utc::now())],
        )?;
        Ok(n > 0)
    })
}

/// Claims the record with the oldest due deletion deadline.
///
/// In the same transaction the deadline is moved to `now + postpone`, so
/// the record is not handed out again until that lease expires. A lease
/// past [`latest_ts`] is capped there.
pub fn claim_due_deletion(
    db: &Database,
    now: DateTime<Utc>,
    postpone: Duration,
) -> Result<Option<Record>, DatabaseError> {
    db.with_tx(|tx| {
        let id: Option<i64> = tx
            .query_row(
                "SELECT id FROM records
                 WHERE delete_ts IS NOT NULL AND delete_ts <= ?1
                 ORDER BY delete_ts ASC, id ASC
                 LIMIT 1",
                params![format_ts(now)],
                |r| r.get(0),
            )
            .optional()?;

        let Some(id) = id else {
            return Ok(None);
        };

        let lease = now
            .checked_add_signed(postpone)
            .map_or_else(latest_ts, |ts| ts.min(latest_ts()));
        tx.execute(
            "UPDATE records SET delete_ts = ?2 WHERE id = ?1",
            params![id, format_ts(lease)],
        )?;

        find_in(tx, id)
    })
}

/// Deletes a record row. Returns whether a row was removed.
pub fn delete(db: &Database, id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.execute("DELETE FROM records WHERE id = ?1", params![id])?;
        Ok(n > 0)
    })
}

/// Returns `(marked, due)`: records with any deadline, and those whose
/// deadline is at or before `now`.
pub fn deletion_counts(db: &Database, now: DateTime<Utc>) -> Result<(u64, u64), DatabaseError> {
    db.with_conn(|conn| {
        let counts = conn.query_row(
            "SELECT
                COUNT(*) FILTER (WHERE delete_ts IS NOT NULL),
                COUNT(*) FILTER (WHERE delete_ts IS NOT NULL AND delete_ts <= ?1)
             FROM records",
            params![format_ts(now)],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(counts)
    })
}

/// Counts all records.
pub fn count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let n = conn.query_row("SELECT COUNT(*) FROM records", [], |r| r.get(0))?;
        Ok(n)
    })
}
