use std::sync::Arc;

use chrono::Utc;

use crate::endpoint::Endpoint;
use crate::error::{QueueError, WorkerError};
use crate::handler::{ExportContext, ExportHandlers};
use crate::queue::{ExportJob, ExportQueue, Outcome};
use crate::record::RecordStore;
use crate::storage::FileTransferEngine;
use crate::worker::{guarded, merge_metadata, WorkerContext};

/// Drains the export queue of one destination endpoint.
pub struct ExportCoordinator {
    endpoint: Endpoint,
    queue: ExportQueue,
    records: Arc<dyn RecordStore>,
    handlers: Arc<ExportHandlers>,
    transfer: FileTransferEngine,
}

impl ExportCoordinator {
    pub fn new(endpoint_id: &str, ctx: &WorkerContext) -> Result<Self, WorkerError> {
        let endpoint = ctx
            .registry
            .get(endpoint_id)
            .ok_or_else(|| WorkerError::UnknownEndpoint {
                role: "export",
                endpoint: endpoint_id.to_string(),
            })?
            .clone();

        Ok(Self {
            endpoint,
            queue: ctx.exports.clone(),
            records: Arc::clone(&ctx.records),
            handlers: Arc::clone(&ctx.export_handlers),
            transfer: ctx.transfer.clone(),
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Claims and processes jobs until the queue is empty. Returns the
    /// number of jobs processed.
    pub fn drain(&self) -> usize {
        let mut processed = 0;
        loop {
            let job = match self.queue.claim(&self.endpoint.id) {
                Ok(Some(job)) => job,
                Ok(None) => break,
                Err(e) => {
                    log::error!("Export queue for '{}' failed: {}", self.endpoint.id, e);
                    break;
                }
            };

            if let Err(e) = self.process(job) {
                log::error!("Could not finish export job: {}", e);
                break;
            }
            processed += 1;
        }

        if processed > 0 {
            log::info!(
                "Export round for '{}' processed {} job(s)",
                self.endpoint.id,
                processed
            );
        }
        processed
    }

    pub fn process(&self, mut job: ExportJob) -> Result<ExportJob, QueueError> {
        let span = tracing::info_span!(
            "export_job",
            job_id = job.id,
            endpoint = %self.endpoint.id,
            record_id = job.payload.record_id
        );
        let _enter = span.enter();

        let outcome = match self.export(&mut job) {
            Ok(()) => {
                log::info!(
                    "Export job {} delivered {}",
                    job.id,
                    job.metadata.delivered_path.as_deref().unwrap_or("")
                );
                if self.endpoint.defaults.keep_original {
                    Outcome::Keep
                } else {
                    Outcome::Done
                }
            }
            Err(reason) => {
                log::error!("Export job {} failed: {}", job.id, reason);
                Outcome::Failed(reason)
            }
        };

        self.queue.complete(&job, outcome)
    }

    fn export(&self, job: &mut ExportJob) -> Result<(), String> {
        let record_id = job.payload.record_id;
        let record = self
            .records
            .find(record_id)
            .map_err(|e| format!("Could not load record {}: {}", record_id, e))?
            .ok_or_else(|| format!("Record {} not found", record_id))?;

        let protocol = self.endpoint.protocol().map(str::to_string);
        let handler = self.handlers.get(&protocol).ok_or_else(|| {
            format!(
                "No handler for protocol {}",
                protocol.as_deref().unwrap_or("local")
            )
        })?;

        let delivery = {
            let ctx = ExportContext {
                job,
                endpoint: &self.endpoint,
                record: &record,
                transfer: &self.transfer,
            };
            guarded(|| {
                let plan = handler.analyze(&ctx)?;
                handler.run(&ctx, &plan)
            })
            .map_err(|e| format!("Export failed: {}", e))?
        };

        job.metadata.delivered_path = Some(delivery.relative_path);
        job.record_id = match delivery.draft {
            Some(mut draft) => {
                merge_metadata(&mut draft, &job.metadata, &self.endpoint.defaults, Utc::now())
                    .map_err(|e| format!("Export failed: {}", e))?;
                let created = self
                    .records
                    .create(draft)
                    .map_err(|e| format!("Could not store record: {}", e))?;
                Some(created.id)
            }
            None => Some(record.id),
        };

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::endpoint::{EndpointKind, EndpointRegistry};
    use crate::handler::{default_export_handlers, default_import_handlers};
    use crate::queue::{ExportPayload, JobMetadata, JobState};
    use crate::record::{DraftRecord, FileReference, Purpose, RecordState};
    use std::path::PathBuf;

    struct Setup {
        _dir: tempfile::TempDir,
        out: PathBuf,
        ctx: WorkerContext,
    }

    fn setup(server: Option<&str>) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let out = dir.path().join("out");
        std::fs::create_dir_all(images.join("2026")).unwrap();
        std::fs::write(images.join("2026/a.jpg"), b"pixels").unwrap();

        let images_ep = Endpoint::new("images", EndpointKind::Image, &images);
        let mut out_ep = Endpoint::new("out", EndpointKind::Export, &out);
        out_ep.capabilities.export = true;
        out_ep.server = server.map(str::to_string);
        let registry = EndpointRegistry::new(vec![images_ep, out_ep]).unwrap();

        let ctx = WorkerContext::new(
            Database::open_in_memory().unwrap(),
            registry,
            default_import_handlers(),
            default_export_handlers(),
        );
        Setup {
            _dir: dir,
            out,
            ctx,
        }
    }

    fn stored_record(ctx: &WorkerContext) -> i64 {
        ctx.records
            .create(DraftRecord {
                original_filename: Some("a.jpg".to_string()),
                state: RecordState::Online,
                files: vec![FileReference {
                    path: "2026/a.jpg".to_string(),
                    endpoint_id: "images".to_string(),
                    size: 6,
                    purpose: Purpose::Primary,
                    mime: Some("image/jpeg".to_string()),
                    width: None,
                    height: None,
                }],
                ..Default::default()
            })
            .unwrap()
            .id
    }

    fn enqueue(ctx: &WorkerContext, record_id: i64, path: Option<&str>) -> ExportJob {
        ctx.exports
            .create(
                "out",
                ExportPayload {
                    record_id,
                    path: path.map(str::to_string),
                },
                JobMetadata::default(),
            )
            .unwrap()
            .job
    }

    #[test]
    fn test_local_export_delivers_file() {
        let s = setup(None);
        let record_id = stored_record(&s.ctx);
        let job = enqueue(&s.ctx, record_id, Some("shared/best.jpg"));

        let coordinator = ExportCoordinator::new("out", &s.ctx).unwrap();
        assert_eq!(coordinator.drain(), 1);

        let job = s.ctx.exports.find(job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Done);
        assert_eq!(job.record_id, Some(record_id));
        assert_eq!(job.metadata.delivered_path.as_deref(), Some("shared/best.jpg"));
        assert_eq!(std::fs::read(s.out.join("shared/best.jpg")).unwrap(), b"pixels");
    }

    #[test]
    fn test_missing_record_fails_job() {
        let s = setup(None);
        let job = enqueue(&s.ctx, 404, None);

        ExportCoordinator::new("out", &s.ctx).unwrap().drain();

        let job = s.ctx.exports.find(job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error(), Some("Record 404 not found"));
    }

    #[test]
    fn test_unknown_protocol_fails_job() {
        let s = setup(Some("ftp://example.com"));
        let record_id = stored_record(&s.ctx);
        let job = enqueue(&s.ctx, record_id, None);

        ExportCoordinator::new("out", &s.ctx).unwrap().drain();

        let job = s.ctx.exports.find(job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error(), Some("No handler for protocol ftp"));
    }

    #[test]
    fn test_missing_candidate_fails_job() {
        let s = setup(None);
        let record_id = stored_record(&s.ctx);
        let job = s
            .ctx
            .exports
            .create(
                "out",
                ExportPayload {
                    record_id,
                    path: None,
                },
                JobMetadata {
                    wants: Some(Purpose::Thumb),
                    ..Default::default()
                },
            )
            .unwrap()
            .job;

        ExportCoordinator::new("out", &s.ctx).unwrap().drain();

        let job = s.ctx.exports.find(job.id).unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error().unwrap().contains("thumb"));
    }
}
