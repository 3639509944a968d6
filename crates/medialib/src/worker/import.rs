use std::sync::Arc;

use chrono::Utc;

use crate::endpoint::Endpoint;
use crate::error::{QueueError, WorkerError};
use crate::handler::{detect_mime, ImportContext, ImportHandlers};
use crate::queue::{ImportJob, ImportQueue, Outcome};
use crate::record::{FileReference, MediaKind, RecordStore};
use crate::storage::FileTransferEngine;
use crate::worker::{guarded, merge_metadata, WorkerContext};

/// Drains the import queue of one endpoint.
pub struct ImportCoordinator {
    endpoint: Endpoint,
    queue: ImportQueue,
    records: Arc<dyn RecordStore>,
    handlers: Arc<ImportHandlers>,
    transfer: FileTransferEngine,
}

impl ImportCoordinator {
    pub fn new(endpoint_id: &str, ctx: &WorkerContext) -> Result<Self, WorkerError> {
        let endpoint = ctx
            .registry
            .get(endpoint_id)
            .ok_or_else(|| WorkerError::UnknownEndpoint {
                role: "import",
                endpoint: endpoint_id.to_string(),
            })?
            .clone();

        Ok(Self {
            endpoint,
            queue: ctx.imports.clone(),
            records: Arc::clone(&ctx.records),
            handlers: Arc::clone(&ctx.import_handlers),
            transfer: ctx.transfer.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Claims and processes jobs until the queue is empty. Returns the
    /// number of jobs processed.
    ///
    /// A queue error ends the round early; it is logged, not returned.
    pub fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let job = match self.queue.claim(&self.endpoint.id) {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    log::error!("Import queue for '{}' failed: {}", self.endpoint.id, e);
                    break;
                }
            };

            if let Err(e) = self.process(job) {
                log::error!("Could not finish import job: {}", e);
                break;
            }
            processed += 1;
        }

        if processed > 0 {
            log::info!(
                "Import round for '{}' processed {} job(s)",
                self.endpoint.id,
                processed
            );
        }
        processed
    }

    /// Runs one claimed job and records its outcome.
    pub fn process(&self, mut job: ImportJob) -> Result<ImportJob, QueueError> {
        let span = tracing::info_span!(
            "import_job",
            job_id = job.id,
            endpoint = %self.endpoint.id,
            path = %job.payload.path
        );
        let _enter = span.enter();

        let outcome = match self.import(&job) {
            Ok(imported) => {
                job.record_id = Some(imported.record_id);
                log::info!("Import job {} done: {}", job.id, job.payload.path);
                if imported.source_kept {
                    Outcome::Keep
                } else {
                    Outcome::Done
                }
            }
            Err(reason) => {
                log::error!("Import job {} failed: {}", job.id, reason);
                Outcome::Failed(reason)
            }
        };

        self.queue.complete(&job, outcome)
    }

    /// Returns the created record, or the failure reason.
    ///
    /// The source file is only removed once its record is stored. If the
    /// record cannot be built or stored, the files the handler placed are
    /// removed again so a reset job starts from a clean slate.
    fn import(&self, job: &ImportJob) -> Result<Imported, String> {
        let source_path = self
            .endpoint
            .resolve(&job.payload.path)
            .map_err(|e| format!("Import failed: {}", e))?;

        let mime = detect_mime(&source_path).unwrap_or_else(|| "unknown".to_string());
        log::debug!("Detected '{}' for {}", mime, source_path.display());

        let handler = self
            .handlers
            .get(&mime)
            .ok_or_else(|| format!("No handler for type {}", mime))?;

        let ctx = ImportContext {
            job,
            endpoint: &self.endpoint,
            source_path,
            mime: &mime,
            kind: MediaKind::from_mime(&mime),
            transfer: &self.transfer,
        };

        let mut draft = guarded(|| {
            let analysis = handler.analyze(&ctx)?;
            handler.run(&ctx, &analysis)
        })
        .map_err(|e| format!("Import failed: {}", e))?;
        let placed = draft.files.clone();

        let merged = merge_metadata(&mut draft, &job.metadata, &self.endpoint.defaults, Utc::now());
        if let Err(e) = merged {
            self.discard(job, &placed);
            return Err(format!("Import failed: {}", e));
        }

        let record = match self.records.create(draft) {
            Ok(record) => record,
            Err(e) => {
                self.discard(job, &placed);
                return Err(format!("Could not store record: {}", e));
            }
        };
        log::debug!("Created record {} for import job {}", record.id, job.id);

        Ok(Imported {
            record_id: record.id,
            source_kept: self.release_source(job),
        })
    }

    /// Removes the imported original unless the endpoint keeps it.
    /// Returns whether the original is still in place.
    fn release_source(&self, job: &ImportJob) -> bool {
        if self.endpoint.defaults.keep_original {
            return true;
        }
        match self.transfer.remove(&self.endpoint.id, &job.payload.path) {
            Ok(_) => false,
            Err(e) => {
                log::error!(
                    "Could not remove original {}:{}: {}",
                    self.endpoint.id,
                    job.payload.path,
                    e
                );
                true
            }
        }
    }

    fn discard(&self, job: &ImportJob, files: &[FileReference]) {
        for file in files {
            if file.endpoint_id == self.endpoint.id && file.path == job.payload.path {
                continue;
            }
            match self.transfer.remove(&file.endpoint_id, &file.path) {
                Ok(_) => log::debug!("Discarded {}:{}", file.endpoint_id, file.path),
                Err(e) => log::warn!(
                    "Could not discard {}:{} after failed import: {}",
                    file.endpoint_id,
                    file.path,
                    e
                ),
            }
        }
    }
}

struct Imported {
    record_id: i64,
    source_kept: bool,
}
