//! Collision-safe placement of files into endpoints.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::endpoint::{EndpointRegistry, FolderHints};
use crate::error::TransferError;
use crate::storage::ops::{FileOps, LocalFileOps};

/// Upper bound on numbered variants tried for one file name.
const MAX_ATTEMPTS: u32 = 1000;

/// Where a file comes from and where it should go.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    /// Source endpoint; when `None`, `source_path` is absolute.
    pub source: Option<String>,
    pub source_path: PathBuf,
    pub destination: String,
    /// Folder relative to the destination root. Defaults to the
    /// destination's subfolder template.
    pub dest_folder: Option<PathBuf>,
    pub filename: String,
    /// Try a hard link before copying.
    pub link: bool,
    /// Defaults to the source endpoint's `keep_original`, or true for an
    /// absolute source.
    pub keep_original: Option<bool>,
    pub date: Option<chrono::NaiveDate>,
    pub kind: Option<String>,
    pub tag_source: Option<String>,
}

impl TransferRequest {
    pub fn new(destination: impl Into<String>, filename: impl Into<String>) -> Self {
        Self {
            source: None,
            source_path: PathBuf::new(),
            destination: destination.into(),
            dest_folder: None,
            filename: filename.into(),
            link: false,
            keep_original: None,
            date: None,
            kind: None,
            tag_source: None,
        }
    }

    pub fn from_endpoint(mut self, endpoint_id: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        self.source = Some(endpoint_id.into());
        self.source_path = path.into();
        self
    }

    pub fn from_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = None;
        self.source_path = path.into();
        self
    }

    pub fn dest_folder(mut self, folder: impl Into<PathBuf>) -> Self {
        self.dest_folder = Some(folder.into());
        self
    }

    pub fn link(mut self, link: bool) -> Self {
        self.link = link;
        self
    }

    pub fn keep_original(mut self, keep: bool) -> Self {
        self.keep_original = Some(keep);
        self
    }

    pub fn kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    pub fn tag_source(mut self, source: impl Into<String>) -> Self {
        self.tag_source = Some(source.into());
        self
    }

    fn hints(&self) -> FolderHints<'_> {
        FolderHints {
            date: self.date,
            kind: self.kind.as_deref(),
            source: self.tag_source.as_deref(),
        }
    }
}

/// Where a transferred file ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOutcome {
    /// Relative to the destination endpoint root.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    pub linked: bool,
    pub source_removed: bool,
}

/// Places files into endpoints without ever overwriting.
///
/// Name collisions are resolved by inserting `_1`, `_2`, ... before the
/// extension. A hard link that fails with a cross-device error downgrades
/// the rest of that transfer to copying.
#[derive(Clone)]
pub struct FileTransferEngine {
    registry: EndpointRegistry,
    ops: Arc<dyn FileOps>,
}

impl FileTransferEngine {
    pub fn new(registry: EndpointRegistry) -> Self {
        Self::with_ops(registry, Arc::new(LocalFileOps))
    }

    pub fn with_ops(registry: EndpointRegistry, ops: Arc<dyn FileOps>) -> Self {
        Self { registry, ops }
    }

    pub fn registry(&self) -> &EndpointRegistry {
        &self.registry
    }

    /// Absolute path of the request's source file.
    pub fn source_path(&self, request: &TransferRequest) -> Result<PathBuf, TransferError> {
        match &request.source {
            Some(id) => self
                .registry
                .get(id)
                .ok_or_else(|| TransferError::UnknownEndpoint(id.clone()))?
                .resolve(&request.source_path),
            None => Ok(request.source_path.clone()),
        }
    }

    pub fn transfer(&self, request: &TransferRequest) -> Result<TransferOutcome, TransferError> {
        let src = self.source_path(request)?;
        let destination = self
            .registry
            .get(&request.destination)
            .ok_or_else(|| TransferError::UnknownEndpoint(request.destination.clone()))?;

        let keep_original = request.keep_original.unwrap_or_else(|| {
            request
                .source
                .as_deref()
                .and_then(|id| self.registry.get(id))
                .map(|e| e.defaults.keep_original)
                .unwrap_or(true)
        });

        let folder_rel = match &request.dest_folder {
            Some(folder) => folder.clone(),
            None => destination.suggest_folder(&request.hints()),
        };
        let folder = destination.resolve(&folder_rel)?;
        self.ops
            .create_dir_all(&folder)
            .map_err(|e| TransferError::CreateDirectory {
                path: folder.clone(),
                source: e,
            })?;

        let filename = Path::new(&request.filename)
            .file_name()
            .and_then(|n| n.to_str())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| TransferError::OutsideRoot(PathBuf::from(&request.filename)))?;
        let (stem, ext) = split_filename(filename);

        let mut link = request.link;
        let mut attempt = 0;
        let (name, target) = loop {
            if attempt > MAX_ATTEMPTS {
                return Err(TransferError::NoFreeName(folder.join(filename)));
            }
            let name = numbered_name(stem, ext, attempt);
            let target = folder.join(&name);

            let result = if link {
                log::debug!("Linking {} -> {}", src.display(), target.display());
                self.ops.hard_link(&src, &target)
            } else {
                log::debug!("Copying {} -> {}", src.display(), target.display());
                self.ops.copy_new(&src, &target).map(|_| ())
            };

            match result {
                Ok(()) => break (name, target),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => attempt += 1,
                Err(e) if link && is_cross_device(&e) => {
                    log::debug!(
                        "Cross-device link {} -> {}, copying instead",
                        src.display(),
                        target.display()
                    );
                    link = false;
                }
                Err(e) if link => {
                    return Err(TransferError::Link {
                        from: src,
                        to: target,
                        source: e,
                    })
                }
                Err(e) => {
                    return Err(TransferError::Copy {
                        from: src,
                        to: target,
                        source: e,
                    })
                }
            }
        };

        let mut source_removed = false;
        if !keep_original {
            log::debug!("Removing original {}", src.display());
            self.ops.remove(&src).map_err(|e| TransferError::Remove {
                path: src.clone(),
                source: e,
            })?;
            source_removed = true;
        }

        Ok(TransferOutcome {
            relative_path: folder_rel.join(name).to_string_lossy().into_owned(),
            absolute_path: target,
            linked: link,
            source_removed,
        })
    }

    /// Removes a file stored at an endpoint. Returns false if it was
    /// already gone.
    pub fn remove(&self, endpoint_id: &str, relative: &str) -> Result<bool, TransferError> {
        let endpoint = self
            .registry
            .get(endpoint_id)
            .ok_or_else(|| TransferError::UnknownEndpoint(endpoint_id.to_string()))?;
        let path = endpoint.resolve(relative)?;

        match self.ops.remove(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(TransferError::Remove { path, source: e }),
        }
    }
}

fn is_cross_device(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::CrossesDevices
}

/// Splits `name.ext` into `("name", ".ext")`. Leading dots do not start
/// an extension.
fn split_filename(filename: &str) -> (&str, &str) {
    match filename.rfind('.') {
        Some(pos) if pos > 0 && !filename[..pos].chars().all(|c| c == '.') => {
            (&filename[..pos], &filename[pos..])
        }
        _ => (filename, ""),
    }
}

fn numbered_name(stem: &str, ext: &str, attempt: u32) -> String {
    if attempt == 0 {
        format!("{}{}", stem, ext)
    } else {
        format!("{}_{}{}", stem, attempt, ext)
    }
}
