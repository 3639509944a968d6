use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::endpoint::Endpoint;
use crate::error::WorkerError;
use crate::queue::{ImportPayload, ImportQueue, JobMetadata};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Files that passed the filters.
    pub seen: usize,
    /// Import jobs newly created for them.
    pub created: usize,
}

/// Walks one endpoint's root and queues an import job per file.
///
/// Hidden files and directories (leading `.`) are skipped, as are files
/// outside the extension allow-list or matching an exclude pattern. The
/// scan never touches the files themselves.
pub struct Scanner {
    endpoint: Endpoint,
    queue: ImportQueue,
    excludes: Vec<glob::Pattern>,
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|s| s.starts_with('.'))
            .unwrap_or(false)
}

impl Scanner {
    pub fn new(endpoint: Endpoint, queue: ImportQueue) -> Self {
        let excludes = endpoint
            .exclude
            .iter()
            .filter_map(|p| match glob::Pattern::new(p) {
                Ok(pattern) => Some(pattern),
                Err(e) => {
                    log::warn!("Ignoring exclude pattern '{}' on '{}': {}", p, endpoint.id, e);
                    None
                }
            })
            .collect();

        Self {
            endpoint,
            queue,
            excludes,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    fn is_excluded(&self, relative: &Path) -> bool {
        self.excludes.iter().any(|p| p.matches_path(relative))
    }

    pub fn scan(&self) -> Result<ScanReport, WorkerError> {
        let root = &self.endpoint.root;
        let mut report = ScanReport::default();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(WorkerError::ScanFailed {
                        path: root.clone(),
                        source: e,
                    })
                }
                Err(e) => {
                    log::warn!("Skipping unreadable entry in '{}': {}", self.endpoint.id, e);
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let relative = match entry.path().strip_prefix(root) {
                Ok(relative) => relative,
                Err(_) => continue,
            };
            if !self.endpoint.accepts_extension(relative) || self.is_excluded(relative) {
                continue;
            }

            report.seen += 1;
            let payload = ImportPayload {
                path: relative.to_string_lossy().into_owned(),
            };
            if self
                .queue
                .create(&self.endpoint.id, payload, JobMetadata::default())?
                .created
            {
                report.created += 1;
            }
        }

        if report.created > 0 {
            log::info!(
                "Scan of '{}' queued {} new file(s)",
                self.endpoint.id,
                report.created
            );
        } else {
            log::debug!("Scan of '{}' found nothing new", self.endpoint.id);
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::endpoint::EndpointKind;
    use crate::queue::JobFilter;

    fn write(root: &Path, rel: &str) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_filters_and_dedups() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        write(root, "a.jpg");
        write(root, "sub/b.JPG");
        write(root, "notes.txt");
        write(root, ".hidden.jpg");
        write(root, ".thumbs/c.jpg");
        write(root, "tmp/d.jpg");

        let mut endpoint = Endpoint::new("drop", EndpointKind::DropFolder, root);
        endpoint.extensions = vec!["jpg".to_string()];
        endpoint.exclude = vec!["tmp/*".to_string()];
        let queue = ImportQueue::new(Database::open_in_memory().unwrap());
        let scanner = Scanner::new(endpoint, queue.clone());

        let report = scanner.scan().unwrap();
        assert_eq!(report, ScanReport { seen: 2, created: 2 });

        let mut paths: Vec<String> = queue
            .list(&JobFilter::default())
            .unwrap()
            .into_iter()
            .map(|j| j.payload.path)
            .collect();
        paths.sort();
        assert_eq!(paths, vec!["a.jpg", "sub/b.JPG"]);

        let again = scanner.scan().unwrap();
        assert_eq!(again, ScanReport { seen: 2, created: 0 });
        assert!(root.join("a.jpg").exists());
    }

    #[test]
    fn test_missing_root_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::new("drop", EndpointKind::DropFolder, dir.path().join("gone"));
        let queue = ImportQueue::new(Database::open_in_memory().unwrap());
        assert!(matches!(
            Scanner::new(endpoint, queue).scan(),
            Err(WorkerError::ScanFailed { .. })
        ));
    }
}
