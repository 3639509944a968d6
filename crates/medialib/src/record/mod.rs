//! Finished media records and the file references they are made of.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod store;

pub use store::{DeletionStats, RecordStore, SqliteRecordStore};

/// What a file attached to a record is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    #[default]
    Primary,
    Proxy,
    Thumb,
    Attachment,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Purpose::Primary => "primary",
            Purpose::Proxy => "proxy",
            Purpose::Thumb => "thumb",
            Purpose::Attachment => "attachment",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordState {
    #[default]
    New,
    Online,
    Offline,
    Failed,
    Delete,
    Deleted,
}

impl RecordState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordState::New => "new",
            RecordState::Online => "online",
            RecordState::Offline => "offline",
            RecordState::Failed => "failed",
            RecordState::Delete => "delete",
            RecordState::Deleted => "deleted",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(RecordState::New),
            "online" => Some(RecordState::Online),
            "offline" => Some(RecordState::Offline),
            "failed" => Some(RecordState::Failed),
            "delete" => Some(RecordState::Delete),
            "deleted" => Some(RecordState::Deleted),
            _ => None,
        }
    }
}

/// Who may see a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Access {
    #[default]
    Private,
    Users,
    Common,
    Public,
}

impl Access {
    pub fn as_str(&self) -> &'static str {
        match self {
            Access::Private => "private",
            Access::Users => "users",
            Access::Common => "common",
            Access::Public => "public",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "private" => Some(Access::Private),
            "users" => Some(Access::Users),
            "common" => Some(Access::Common),
            "public" => Some(Access::Public),
            _ => None,
        }
    }
}

/// Broad media class, derived from a MIME type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    #[default]
    Image,
    Video,
    Audio,
    Other,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime.split('/').next() {
            Some("image") => MediaKind::Image,
            Some("video") => MediaKind::Video,
            Some("audio") => MediaKind::Audio,
            _ => MediaKind::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
            MediaKind::Audio => "audio",
            MediaKind::Other => "other",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "image" => Some(MediaKind::Image),
            "video" => Some(MediaKind::Video),
            "audio" => Some(MediaKind::Audio),
            "other" => Some(MediaKind::Other),
            _ => None,
        }
    }
}

/// A file belonging to a record. Only ever stored embedded in its record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    /// Path relative to the endpoint root.
    pub path: String,
    pub endpoint_id: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub purpose: Purpose,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime: Option<String>,
    /// Pixel dimensions, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// A record as drafted by a handler, before the store assigns an id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DraftRecord {
    pub original_filename: Option<String>,
    pub export_filename: Option<String>,
    pub kind: MediaKind,
    pub state: RecordState,
    pub hidden: bool,
    pub access: Access,
    pub tags: Vec<String>,
    pub files: Vec<FileReference>,
    pub notes: Option<String>,
    pub source: Option<String>,
    pub delete_ts: Option<DateTime<Utc>>,
}

/// A persisted media record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    pub id: i64,
    pub original_filename: Option<String>,
    pub export_filename: Option<String>,
    pub kind: MediaKind,
    pub state: RecordState,
    pub hidden: bool,
    pub access: Access,
    pub tags: Vec<String>,
    pub files: Vec<FileReference>,
    pub notes: Option<String>,
    pub source: Option<String>,
    /// Deletion deadline. Once the retention sweeper claims the record this
    /// also acts as its lease: the sweeper pushes it forward before looking
    /// at the files.
    pub delete_ts: Option<DateTime<Utc>>,
    pub create_ts: DateTime<Utc>,
    pub update_ts: DateTime<Utc>,
}

impl Record {
    /// First file with the given purpose.
    pub fn file(&self, purpose: Purpose) -> Option<&FileReference> {
        self.files.iter().find(|f| f.purpose == purpose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_kind_from_mime() {
        assert_eq!(MediaKind::from_mime("image/jpeg"), MediaKind::Image);
        assert_eq!(MediaKind::from_mime("video/mp4"), MediaKind::Video);
        assert_eq!(MediaKind::from_mime("audio/flac"), MediaKind::Audio);
        assert_eq!(MediaKind::from_mime("application/pdf"), MediaKind::Other);
    }

    #[test]
    fn test_file_reference_json_defaults() {
        let fr: FileReference =
            serde_json::from_str(r#"{"path": "2026/a.jpg", "endpoint_id": "images"}"#).unwrap();
        assert_eq!(fr.purpose, Purpose::Primary);
        assert_eq!(fr.size, 0);
        assert!(fr.mime.is_none());
    }

    #[test]
    fn test_state_names_round_trip() {
        for state in [
            RecordState::New,
            RecordState::Online,
            RecordState::Offline,
            RecordState::Failed,
            RecordState::Delete,
            RecordState::Deleted,
        ] {
            assert_eq!(RecordState::parse(state.as_str()), Some(state));
        }
        assert_eq!(Access::parse("common"), Some(Access::Common));
        assert!(Access::Public > Access::Private);
    }
}
