use chrono::{DateTime, Duration, Utc};

use crate::error::QueueError;
use crate::queue::{ExportQueue, ImportQueue};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JanitorReport {
    pub imports: u64,
    pub exports: u64,
}

/// Purges `done` jobs older than a window from both queues.
pub struct Janitor {
    imports: ImportQueue,
    exports: ExportQueue,
    window: Duration,
}

impl Janitor {
    pub fn new(imports: ImportQueue, exports: ExportQueue, window: Duration) -> Self {
        Self {
            imports,
            exports,
            window,
        }
    }

    pub fn sweep(&self, now: DateTime<Utc>) -> Result<JanitorReport, QueueError> {
        let Some(cutoff) = now.checked_sub_signed(self.window) else {
            log::debug!("Janitor window reaches past the earliest time, nothing to purge");
            return Ok(JanitorReport::default());
        };
        let report = JanitorReport {
            imports: self.imports.purge_done_before(cutoff)?,
            exports: self.exports.purge_done_before(cutoff)?,
        };

        if report.imports + report.exports > 0 {
            log::info!(
                "Janitor removed {} import and {} export job(s)",
                report.imports,
                report.exports
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::queue::{ExportPayload, ImportPayload, JobMetadata, Outcome};

    #[test]
    fn test_sweep_purges_old_done_jobs() {
        let db = Database::open_in_memory().unwrap();
        let imports = ImportQueue::new(db.clone());
        let exports = ExportQueue::new(db);

        imports
            .create("drop", ImportPayload { path: "a.jpg".into() }, JobMetadata::default())
            .unwrap();
        imports
            .create("drop", ImportPayload { path: "b.jpg".into() }, JobMetadata::default())
            .unwrap();
        exports
            .create(
                "out",
                ExportPayload {
                    record_id: 1,
                    path: None,
                },
                JobMetadata::default(),
            )
            .unwrap();

        let a = imports.claim("drop").unwrap().unwrap();
        imports.complete(&a, Outcome::Done).unwrap();
        let b = imports.claim("drop").unwrap().unwrap();
        imports.complete(&b, Outcome::Failed("x".into())).unwrap();
        let e = exports.claim("out").unwrap().unwrap();
        exports.complete(&e, Outcome::Done).unwrap();

        let janitor = Janitor::new(imports.clone(), exports.clone(), Duration::hours(1));

        // Nothing is old enough yet.
        assert_eq!(janitor.sweep(Utc::now()).unwrap(), JanitorReport::default());

        let later = Utc::now() + Duration::hours(2);
        let report = janitor.sweep(later).unwrap();
        assert_eq!(report, JanitorReport { imports: 1, exports: 1 });
        assert!(imports.find(a.id).unwrap().is_none());
        assert!(imports.find(b.id).unwrap().is_some());
    }

    #[test]
    fn test_unbounded_window_purges_nothing() {
        let db = Database::open_in_memory().unwrap();
        let imports = ImportQueue::new(db.clone());
        imports
            .create("drop", ImportPayload { path: "a.jpg".into() }, JobMetadata::default())
            .unwrap();
        let job = imports.claim("drop").unwrap().unwrap();
        imports.complete(&job, Outcome::Done).unwrap();

        let janitor = Janitor::new(imports.clone(), ExportQueue::new(db), Duration::MAX);
        assert_eq!(janitor.sweep(Utc::now()).unwrap(), JanitorReport::default());
        assert!(imports.find(job.id).unwrap().is_some());
    }
}
