//! Configured storage endpoints and the read-only registry over them.

mod template;

pub use template::{expand, FolderHints};

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, TransferError};
use crate::record::{Access, MediaKind, Purpose};

/// What an endpoint is used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    #[default]
    DropFolder,
    Image,
    Video,
    Audio,
    Other,
    Proxy,
    Thumb,
    Upload,
    Export,
}

impl EndpointKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointKind::DropFolder => "drop_folder",
            EndpointKind::Image => "image",
            EndpointKind::Video => "video",
            EndpointKind::Audio => "audio",
            EndpointKind::Other => "other",
            EndpointKind::Proxy => "proxy",
            EndpointKind::Thumb => "thumb",
            EndpointKind::Upload => "upload",
            EndpointKind::Export => "export",
        }
    }

    /// The library kind that stores imported files of `kind`.
    pub fn library_for(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Image => EndpointKind::Image,
            MediaKind::Video => EndpointKind::Video,
            MediaKind::Audio => EndpointKind::Audio,
            MediaKind::Other => EndpointKind::Other,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    pub scan: bool,
    pub import: bool,
    pub export: bool,
}

/// Defaults applied to jobs and records handled at an endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointDefaults {
    pub auto_tag: bool,
    /// Leave source files in place after a transfer, and mark the job `keep`.
    pub keep_original: bool,
    /// Hard-link into the library instead of copying.
    pub link: bool,
    pub access: Access,
    pub hidden: bool,
    pub tags: Vec<String>,
    /// Files here are never deleted by the retention sweep.
    pub read_only: bool,
    /// Preferred file purposes when exporting to this endpoint.
    pub wants: Vec<Purpose>,
    pub source: Option<String>,
    /// Days until imported records are scheduled for deletion.
    pub retention_days: Option<u32>,
}

fn default_subfolder() -> String {
    "{date}".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub kind: EndpointKind,
    #[serde(default)]
    pub capabilities: Capabilities,
    pub root: PathBuf,
    /// Delivery server, e.g. `ftp://host`. `None` means the local filesystem.
    #[serde(default)]
    pub server: Option<String>,
    #[serde(default = "default_subfolder")]
    pub subfolder: String,
    /// Lowercase extensions (without dot) the scanner picks up. Empty means all.
    #[serde(default)]
    pub extensions: Vec<String>,
    /// Glob patterns, relative to the root, the scanner skips.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub defaults: EndpointDefaults,
}

impl Endpoint {
    pub fn new(id: impl Into<String>, kind: EndpointKind, root: impl Into<PathBuf>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            capabilities: Capabilities::default(),
            root: root.into(),
            server: None,
            subfolder: default_subfolder(),
            extensions: Vec::new(),
            exclude: Vec::new(),
            defaults: EndpointDefaults::default(),
        }
    }

    /// Dispatch key for export handlers: the server text before the first
    /// colon, or `None` for the local filesystem.
    pub fn protocol(&self) -> Option<&str> {
        self.server
            .as_deref()
            .filter(|s| !s.is_empty())
            .and_then(|s| s.split(':').next())
    }

    /// Relative folder for new files, from the `subfolder` template.
    pub fn suggest_folder(&self, hints: &FolderHints<'_>) -> PathBuf {
        PathBuf::from(expand(&self.subfolder, hints))
    }

    /// Joins a path relative to this endpoint's root, refusing anything
    /// that would leave it.
    pub fn resolve(&self, relative: impl AsRef<Path>) -> Result<PathBuf, TransferError> {
        let relative = relative.as_ref();
        let escapes = relative.components().any(|c| {
            matches!(
                c,
                Component::ParentDir | Component::RootDir | Component::Prefix(_)
            )
        });
        if escapes {
            return Err(TransferError::OutsideRoot(relative.to_path_buf()));
        }
        Ok(self.root.join(relative))
    }

    /// Path of `absolute` relative to this endpoint's root, as stored in
    /// jobs and file references.
    pub fn relative(&self, absolute: &Path) -> Result<String, TransferError> {
        absolute
            .strip_prefix(&self.root)
            .map(|p| p.to_string_lossy().into_owned())
            .map_err(|_| TransferError::OutsideRoot(absolute.to_path_buf()))
    }

    pub fn accepts_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(&e))
            })
            .unwrap_or(false)
    }
}

/// Read-only snapshot of all configured endpoints.
///
/// Built once at startup; cloning shares the same snapshot.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Debug, Default)]
struct RegistryInner {
    endpoints: Vec<Endpoint>,
    by_id: HashMap<String, usize>,
}

impl EndpointRegistry {
    pub fn new(endpoints: Vec<Endpoint>) -> Result<Self, ConfigError> {
        let mut by_id = HashMap::with_capacity(endpoints.len());
        for (idx, endpoint) in endpoints.iter().enumerate() {
            if by_id.insert(endpoint.id.clone(), idx).is_some() {
                return Err(ConfigError::InvalidEndpoint {
                    id: endpoint.id.clone(),
                    reason: "Duplicate endpoint ID".to_string(),
                });
            }
        }

        Ok(Self {
            inner: Arc::new(RegistryInner { endpoints, by_id }),
        })
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.inner.by_id.get(id).map(|&idx| &self.inner.endpoints[idx])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Endpoint> {
        self.inner.endpoints.iter()
    }

    pub fn scannable(&self) -> impl Iterator<Item = &Endpoint> {
        self.iter().filter(|e| e.capabilities.scan)
    }

    pub fn importable(&self) -> impl Iterator<Item = &Endpoint> {
        self.iter().filter(|e| e.capabilities.import)
    }

    pub fn exportable(&self) -> impl Iterator<Item = &Endpoint> {
        self.iter().filter(|e| e.capabilities.export)
    }

    /// First endpoint of the library kind that stores `kind` media.
    pub fn library_for(&self, kind: MediaKind) -> Option<&Endpoint> {
        let wanted = EndpointKind::library_for(kind);
        self.iter().find(|e| e.kind == wanted)
    }

    pub fn len(&self) -> usize {
        self.inner.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.endpoints.is_empty()
    }
}
