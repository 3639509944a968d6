//! Long-running loops: per-endpoint scanners, importers and exporters,
//! plus the retention and janitor sweeps.
//!
//! Each loop blocks on its own [`WakeSignal`] with a timeout and runs one
//! round per wake. Rounds never propagate errors out of the loop.

pub mod export;
pub mod import;
pub mod janitor;
pub mod pool;
pub mod retention;
pub mod scanner;
pub mod wake;

pub use export::ExportCoordinator;
pub use import::ImportCoordinator;
pub use janitor::{Janitor, JanitorReport};
pub use pool::WorkerPool;
pub use retention::{RetentionSweeper, SweepReport};
pub use scanner::{ScanReport, Scanner};
pub use wake::{wake_pair, WakeHandle, WakeSignal, Woken};

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::{IntervalsConfig, RetentionConfig};
use crate::db::Database;
use crate::endpoint::{EndpointDefaults, EndpointRegistry};
use crate::error::HandlerError;
use crate::handler::{ExportHandlers, ImportHandlers};
use crate::queue::{ExportQueue, ImportQueue, JobMetadata};
use crate::record::{DraftRecord, RecordState, RecordStore, SqliteRecordStore};
use crate::storage::FileTransferEngine;

/// Shared services handed to every worker.
#[derive(Clone)]
pub struct WorkerContext {
    pub registry: EndpointRegistry,
    pub imports: ImportQueue,
    pub exports: ExportQueue,
    pub records: Arc<dyn RecordStore>,
    pub import_handlers: Arc<ImportHandlers>,
    pub export_handlers: Arc<ExportHandlers>,
    pub transfer: FileTransferEngine,
    pub intervals: IntervalsConfig,
    pub retention: RetentionConfig,
}

impl WorkerContext {
    /// Builds a context over one database, with the SQLite record store
    /// and a local-filesystem transfer engine.
    pub fn new(
        db: Database,
        registry: EndpointRegistry,
        import_handlers: ImportHandlers,
        export_handlers: ExportHandlers,
    ) -> Self {
        Self {
            imports: ImportQueue::new(db.clone()),
            exports: ExportQueue::new(db.clone()),
            records: Arc::new(SqliteRecordStore::new(db)),
            import_handlers: Arc::new(import_handlers),
            export_handlers: Arc::new(export_handlers),
            transfer: FileTransferEngine::new(registry.clone()),
            registry,
            intervals: IntervalsConfig::default(),
            retention: RetentionConfig::default(),
        }
    }

    pub fn with_intervals(mut self, intervals: IntervalsConfig) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn with_retention(mut self, retention: RetentionConfig) -> Self {
        self.retention = retention;
        self
    }

    pub fn with_transfer(mut self, transfer: FileTransferEngine) -> Self {
        self.transfer = transfer;
        self
    }
}

/// Applies job metadata and endpoint defaults to a handler's draft.
///
/// Per field, the job's value wins, then the endpoint default, then
/// whatever the handler suggested. Fails when the endpoint's retention
/// puts the deletion date out of range.
pub fn merge_metadata(
    draft: &mut DraftRecord,
    metadata: &JobMetadata,
    defaults: &EndpointDefaults,
    now: DateTime<Utc>,
) -> Result<(), HandlerError> {
    let suggested = std::mem::take(&mut draft.tags);
    let mut tags = match &metadata.tags {
        Some(tags) => tags.clone(),
        None => defaults.tags.clone(),
    };
    for tag in suggested {
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    if defaults.auto_tag {
        let kind = draft.kind.as_str().to_string();
        if !tags.contains(&kind) {
            tags.push(kind);
        }
    }
    draft.tags = tags;

    draft.hidden = metadata.hidden.unwrap_or(defaults.hidden);
    draft.access = metadata.access.unwrap_or(defaults.access);
    let retention_ts = match (metadata.delete_ts, defaults.retention_days) {
        (None, Some(days)) => Some(
            chrono::Duration::try_days(i64::from(days))
                .and_then(|d| now.checked_add_signed(d))
                .ok_or_else(|| {
                    HandlerError::Failed(format!("Retention of {} days is out of range", days))
                })?,
        ),
        _ => None,
    };
    draft.delete_ts = metadata.delete_ts.or(retention_ts).or(draft.delete_ts);
    if metadata.notes.is_some() {
        draft.notes = metadata.notes.clone();
    }
    draft.source = metadata
        .source
        .clone()
        .or_else(|| defaults.source.clone())
        .or(draft.source.take());
    draft.state = RecordState::Online;
    Ok(())
}

/// Runs a handler call, turning a panic into a handler error.
pub(crate) fn guarded<T>(f: impl FnOnce() -> Result<T, HandlerError>) -> Result<T, HandlerError> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(HandlerError::Failed(format!(
            "Handler panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}

/// Runs `round` once, then again on every wake or timeout until shutdown.
pub(crate) fn run_loop(
    name: &str,
    signal: WakeSignal,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    mut round: impl FnMut(),
) {
    log::info!("Started {} (interval {:?})", name, interval);

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }
        round();

        if signal.wait(interval) == Woken::Closed {
            break;
        }
    }

    log::info!("Stopped {}", name);
}
