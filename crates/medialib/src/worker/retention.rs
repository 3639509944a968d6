use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::db::DatabaseError;
use crate::endpoint::EndpointRegistry;
use crate::record::{Record, RecordStore};
use crate::storage::FileTransferEngine;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub claimed: usize,
    pub deleted: usize,
    /// Records kept because a file lives on a read-only or unknown endpoint.
    pub blocked: usize,
    /// Records kept because removing a file failed.
    pub failed: usize,
}

/// Deletes records whose deletion deadline has passed, together with
/// their files.
///
/// Claiming a record pushes its deadline out by `postpone`, so a record
/// that cannot be deleted now is retried once that lease runs out.
pub struct RetentionSweeper {
    records: Arc<dyn RecordStore>,
    registry: EndpointRegistry,
    transfer: FileTransferEngine,
    postpone: Duration,
}

enum Verdict {
    Deleted,
    Blocked,
    Failed,
}

impl RetentionSweeper {
    pub fn new(
        records: Arc<dyn RecordStore>,
        transfer: FileTransferEngine,
        postpone: Duration,
    ) -> Self {
        Self {
            records,
            registry: transfer.registry().clone(),
            transfer,
            postpone,
        }
    }

    /// Runs one sweep: claims due records one at a time until none is left.
    pub fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, DatabaseError> {
        let mut report = SweepReport::default();
        let mut seen = HashSet::new();

        while let Some(record) = self.records.claim_due_deletion(now, self.postpone)? {
            if !seen.insert(record.id) {
                log::warn!(
                    "Record {} claimed twice in one sweep, stopping",
                    record.id
                );
                break;
            }
            report.claimed += 1;

            match self.retire(&record)? {
                Verdict::Deleted => report.deleted += 1,
                Verdict::Blocked => report.blocked += 1,
                Verdict::Failed => report.failed += 1,
            }
        }

        if report.claimed > 0 {
            log::info!(
                "Retention sweep: {} claimed, {} deleted, {} blocked, {} failed",
                report.claimed,
                report.deleted,
                report.blocked,
                report.failed
            );
        }
        Ok(report)
    }

    fn retire(&self, record: &Record) -> Result<Verdict, DatabaseError> {
        log::info!(
            "Deleting record {} {}",
            record.id,
            record.original_filename.as_deref().unwrap_or("")
        );

        for file in &record.files {
            match self.registry.get(&file.endpoint_id) {
                Some(endpoint) if endpoint.defaults.read_only => {
                    log::warn!(
                        "Record {} has a file on read-only endpoint '{}', skipping",
                        record.id,
                        endpoint.id
                    );
                    return Ok(Verdict::Blocked);
                }
                Some(_) => {}
                None => {
                    log::warn!(
                        "Record {} has a file on unknown endpoint '{}', skipping",
                        record.id,
                        file.endpoint_id
                    );
                    return Ok(Verdict::Blocked);
                }
            }
        }

        // A failure part way leaves earlier files removed; the next sweep
        // sees them as already gone and finishes the rest.
        for file in &record.files {
            match self.transfer.remove(&file.endpoint_id, &file.path) {
                Ok(true) => log::info!("Deleted file {}:{}", file.endpoint_id, file.path),
                Ok(false) => log::debug!("File {}:{} already gone", file.endpoint_id, file.path),
                Err(e) => {
                    log::error!("Record {} cannot be deleted: {}", record.id, e);
                    return Ok(Verdict::Failed);
                }
            }
        }

        self.records.delete(record.id)?;
        log::info!("Deleted record {}", record.id);
        Ok(Verdict::Deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::endpoint::{Endpoint, EndpointKind};
    use crate::record::{DraftRecord, FileReference, Purpose, SqliteRecordStore};
    use crate::storage::{FileOps, LocalFileOps};
    use std::io;
    use std::path::Path;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Setup {
        _dir: tempfile::TempDir,
        store: Arc<SqliteRecordStore>,
        sweeper: RetentionSweeper,
        images: std::path::PathBuf,
        archive: std::path::PathBuf,
    }

    fn setup() -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let archive = dir.path().join("archive");
        std::fs::create_dir_all(&images).unwrap();
        std::fs::create_dir_all(&archive).unwrap();

        let images_ep = Endpoint::new("images", EndpointKind::Image, &images);
        let mut archive_ep = Endpoint::new("archive", EndpointKind::Other, &archive);
        archive_ep.defaults.read_only = true;
        let registry = EndpointRegistry::new(vec![images_ep, archive_ep]).unwrap();

        let store = Arc::new(SqliteRecordStore::new(Database::open_in_memory().unwrap()));
        let sweeper = RetentionSweeper::new(
            store.clone(),
            FileTransferEngine::new(registry),
            Duration::hours(24),
        );
        Setup {
            _dir: dir,
            store,
            sweeper,
            images,
            archive,
        }
    }

    fn due_record(s: &Setup, files: &[(&str, &str, &Path)]) -> i64 {
        let files = files
            .iter()
            .map(|(endpoint, path, root)| {
                std::fs::write(root.join(path), b"x").unwrap();
                FileReference {
                    path: path.to_string(),
                    endpoint_id: endpoint.to_string(),
                    size: 1,
                    purpose: Purpose::Primary,
                    mime: None,
                    width: None,
                    height: None,
                }
            })
            .collect();
        s.store
            .create(DraftRecord {
                files,
                delete_ts: Some(Utc::now() - Duration::minutes(5)),
                ..Default::default()
            })
            .unwrap()
            .id
    }

    #[test]
    fn test_deletes_due_record_and_files() {
        let s = setup();
        let id = due_record(&s, &[("images", "a.jpg", s.images.as_path())]);

        let report = s.sweeper.sweep(Utc::now()).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(s.store.find(id).unwrap().is_none());
        assert!(!s.images.join("a.jpg").exists());
    }

    #[test]
    fn test_read_only_blocks_and_extends_lease() {
        let s = setup();
        let id = due_record(
            &s,
            &[
                ("images", "a.jpg", s.images.as_path()),
                ("archive", "a.jpg", s.archive.as_path()),
            ],
        );

        let now = Utc::now();
        let report = s.sweeper.sweep(now).unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.blocked, 1);

        let record = s.store.find(id).unwrap().unwrap();
        assert!(record.delete_ts.unwrap() >= now + Duration::hours(24));
        assert!(s.images.join("a.jpg").exists());

        let again = s.sweeper.sweep(Utc::now()).unwrap();
        assert_eq!(again.claimed, 0);
    }

    #[test]
    fn test_unknown_endpoint_blocks() {
        let s = setup();
        let id = s
            .store
            .create(DraftRecord {
                files: vec![FileReference {
                    path: "a.jpg".to_string(),
                    endpoint_id: "retired".to_string(),
                    size: 1,
                    purpose: Purpose::Primary,
                    mime: None,
                    width: None,
                    height: None,
                }],
                delete_ts: Some(Utc::now() - Duration::minutes(1)),
                ..Default::default()
            })
            .unwrap()
            .id;

        let report = s.sweeper.sweep(Utc::now()).unwrap();
        assert_eq!(report.blocked, 1);
        assert!(s.store.find(id).unwrap().is_some());
    }

    #[test]
    fn test_not_due_is_left_alone() {
        let s = setup();
        let id = s
            .store
            .create(DraftRecord {
                delete_ts: Some(Utc::now() + Duration::hours(1)),
                ..Default::default()
            })
            .unwrap()
            .id;
        s.store.create(DraftRecord::default()).unwrap();

        assert_eq!(s.sweeper.sweep(Utc::now()).unwrap(), SweepReport::default());
        assert!(s.store.find(id).unwrap().is_some());
    }

    #[test]
    fn test_zero_postpone_does_not_spin() {
        let s = setup();
        let sweeper = RetentionSweeper::new(
            s.store.clone(),
            s.sweeper.transfer.clone(),
            Duration::zero(),
        );
        due_record(&s, &[("archive", "b.jpg", s.archive.as_path())]);

        let report = sweeper.sweep(Utc::now()).unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.blocked, 1);
    }

    /// Refuses to remove `b.jpg` while `locked` is set.
    struct LockedFileOps {
        locked: AtomicBool,
    }

    impl FileOps for LockedFileOps {
        fn hard_link(&self, src: &Path, dst: &Path) -> io::Result<()> {
            LocalFileOps.hard_link(src, dst)
        }

        fn copy_new(&self, src: &Path, dst: &Path) -> io::Result<u64> {
            LocalFileOps.copy_new(src, dst)
        }

        fn remove(&self, path: &Path) -> io::Result<()> {
            if self.locked.load(Ordering::SeqCst) && path.ends_with("b.jpg") {
                return Err(io::Error::from(io::ErrorKind::PermissionDenied));
            }
            LocalFileOps.remove(path)
        }

        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            LocalFileOps.create_dir_all(path)
        }
    }

    #[test]
    fn test_partial_removal_finishes_on_next_sweep() {
        let s = setup();
        let ops = Arc::new(LockedFileOps {
            locked: AtomicBool::new(true),
        });
        let sweeper = RetentionSweeper::new(
            s.store.clone(),
            FileTransferEngine::with_ops(s.sweeper.registry.clone(), ops.clone()),
            Duration::hours(24),
        );
        let id = due_record(
            &s,
            &[
                ("images", "a.jpg", s.images.as_path()),
                ("images", "b.jpg", s.images.as_path()),
            ],
        );

        let now = Utc::now();
        let report = sweeper.sweep(now).unwrap();
        assert_eq!(report.claimed, 1);
        assert_eq!(report.failed, 1);
        assert!(!s.images.join("a.jpg").exists());
        assert!(s.images.join("b.jpg").exists());
        assert!(s.store.find(id).unwrap().is_some());

        ops.locked.store(false, Ordering::SeqCst);
        let report = sweeper.sweep(now + Duration::hours(25)).unwrap();
        assert_eq!(report.deleted, 1);
        assert!(!s.images.join("b.jpg").exists());
        assert!(s.store.find(id).unwrap().is_none());
    }
}
