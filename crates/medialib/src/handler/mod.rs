//! Pluggable content handlers and the registries that dispatch to them.
//!
//! Import handlers are keyed by detected MIME type, export handlers by the
//! destination endpoint's protocol. Registries are filled before the
//! workers start and are read-only afterwards.

pub mod detect;
pub mod library;
pub mod local_export;

pub use detect::{detect_mime, extension_for_mime};
pub use library::LibraryImportHandler;
pub use local_export::LocalExportHandler;

use std::collections::HashMap;
use std::hash::Hash;
use std::path::PathBuf;
use std::sync::Arc;

use crate::endpoint::Endpoint;
use crate::error::HandlerError;
use crate::queue::{ExportJob, ImportJob};
use crate::record::{DraftRecord, FileReference, MediaKind, Record};
use crate::storage::FileTransferEngine;

/// Append-only map from a dispatch key to a handler.
pub struct HandlerRegistry<K, H: ?Sized> {
    handlers: HashMap<K, Arc<H>>,
}

impl<K, H: ?Sized> Default for HandlerRegistry<K, H> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash + std::fmt::Debug, H: ?Sized> HandlerRegistry<K, H> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `key`. The first registration of a key
    /// wins; later ones are ignored and reported as `false`.
    pub fn register(&mut self, key: K, handler: Arc<H>) -> bool {
        if self.handlers.contains_key(&key) {
            log::warn!("Handler for {:?} already registered, ignoring", key);
            return false;
        }
        self.handlers.insert(key, handler);
        true
    }

    pub fn get(&self, key: &K) -> Option<Arc<H>> {
        self.handlers.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.handlers.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// What an import handler learned about a file before processing it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Analysis {
    pub size: u64,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Everything an import handler may look at for one job.
pub struct ImportContext<'a> {
    pub job: &'a ImportJob,
    /// Endpoint the job was queued at.
    pub endpoint: &'a Endpoint,
    /// Absolute path of the file to import.
    pub source_path: PathBuf,
    pub mime: &'a str,
    pub kind: MediaKind,
    pub transfer: &'a FileTransferEngine,
}

pub trait ImportHandler: Send + Sync {
    fn analyze(&self, ctx: &ImportContext<'_>) -> Result<Analysis, HandlerError>;

    /// Processes the file and drafts the record for it. Metadata merging
    /// and persistence are left to the caller.
    ///
    /// The source file must stay in place: the caller removes it once the
    /// record is stored, and removes the drafted files if storing fails.
    fn run(&self, ctx: &ImportContext<'_>, analysis: &Analysis)
        -> Result<DraftRecord, HandlerError>;
}

/// Everything an export handler may look at for one job.
pub struct ExportContext<'a> {
    pub job: &'a ExportJob,
    /// Destination endpoint.
    pub endpoint: &'a Endpoint,
    pub record: &'a Record,
    pub transfer: &'a FileTransferEngine,
}

/// The file an export handler decided to deliver and under what name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportPlan {
    pub file: FileReference,
    /// Folder relative to the destination root, when the job names one.
    pub dest_folder: Option<PathBuf>,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Relative to the destination endpoint root.
    pub relative_path: String,
    pub absolute_path: PathBuf,
    /// A new record for the delivered file. When `None` the job stays
    /// linked to the exported record.
    pub draft: Option<DraftRecord>,
}

pub trait ExportHandler: Send + Sync {
    fn analyze(&self, ctx: &ExportContext<'_>) -> Result<ExportPlan, HandlerError>;

    fn run(&self, ctx: &ExportContext<'_>, plan: &ExportPlan) -> Result<Delivery, HandlerError>;
}

pub type ImportHandlers = HandlerRegistry<String, dyn ImportHandler>;
/// Keyed by protocol; `None` is the local filesystem.
pub type ExportHandlers = HandlerRegistry<Option<String>, dyn ExportHandler>;

/// Import handlers shipped with the library.
pub fn default_import_handlers() -> ImportHandlers {
    let mut handlers = ImportHandlers::new();
    let library: Arc<dyn ImportHandler> = Arc::new(LibraryImportHandler::new());
    for mime in LibraryImportHandler::MIME_TYPES {
        handlers.register(mime.to_string(), library.clone());
    }
    handlers
}

/// Export handlers shipped with the library.
pub fn default_export_handlers() -> ExportHandlers {
    let mut handlers = ExportHandlers::new();
    handlers.register(None, Arc::new(LocalExportHandler::new()));
    handlers
}
