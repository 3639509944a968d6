use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::record::{Access, Purpose};

/// Lifecycle state of a queued job.
///
/// `new` jobs are claimable; `hold` and `keep` are only reached through
/// explicit policy and are never picked up by a claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    New,
    Active,
    Done,
    Failed,
    Hold,
    Keep,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::New => "new",
            JobState::Active => "active",
            JobState::Done => "done",
            JobState::Failed => "failed",
            JobState::Hold => "hold",
            JobState::Keep => "keep",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "new" => Some(JobState::New),
            "active" => Some(JobState::Active),
            "done" => Some(JobState::Done),
            "failed" => Some(JobState::Failed),
            "hold" => Some(JobState::Hold),
            "keep" => Some(JobState::Keep),
            _ => None,
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Free-form per-job metadata, stored as JSON.
///
/// Every field is optional: when a field is set it overrides the endpoint
/// default while building the record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access: Option<Access>,
    /// Deferred deletion deadline for the produced record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete_ts: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Export only: which file of the record to deliver.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wants: Option<Purpose>,
    /// Export only: where the file ended up, relative to the endpoint root.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_path: Option<String>,
    /// Last failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How a claimed job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Finished, and the row is kept out of janitor cleanup.
    Keep,
    Failed(String),
}

impl Outcome {
    pub fn state(&self) -> JobState {
        match self {
            Outcome::Done => JobState::Done,
            Outcome::Keep => JobState::Keep,
            Outcome::Failed(_) => JobState::Failed,
        }
    }
}

/// A queued unit of work for one endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Job<P> {
    pub id: i64,
    pub endpoint_id: String,
    pub payload: P,
    pub state: JobState,
    pub metadata: JobMetadata,
    /// Record produced by (or targeted by) this job.
    pub record_id: Option<i64>,
    pub create_ts: DateTime<Utc>,
    pub update_ts: DateTime<Utc>,
}

impl<P> Job<P> {
    pub fn error(&self) -> Option<&str> {
        self.metadata.error.as_deref()
    }
}

/// Distinguishes the job families that share the queue machinery.
pub trait JobKind: Send + Sync + 'static {
    /// Table holding this kind's rows.
    const TABLE: &'static str;
    /// Short name used in logs.
    const NAME: &'static str;

    type Payload: Serialize + DeserializeOwned + Clone + fmt::Debug + Send + Sync;

    /// Deduplication key; unique per endpoint.
    fn key(payload: &Self::Payload) -> String;
}

/// Import jobs: a file at a path relative to the endpoint root.
#[derive(Debug, Clone, Copy)]
pub struct Import;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportPayload {
    pub path: String,
}

impl JobKind for Import {
    const TABLE: &'static str = "import_jobs";
    const NAME: &'static str = "import";
    type Payload = ImportPayload;

    fn key(payload: &ImportPayload) -> String {
        payload.path.clone()
    }
}

/// Export jobs: deliver a record to the endpoint, optionally at an
/// explicit path.
#[derive(Debug, Clone, Copy)]
pub struct Export;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportPayload {
    pub record_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl JobKind for Export {
    const TABLE: &'static str = "export_jobs";
    const NAME: &'static str = "export";
    type Payload = ExportPayload;

    fn key(payload: &ExportPayload) -> String {
        format!("{}:{}", payload.record_id, payload.path.as_deref().unwrap_or(""))
    }
}

pub type ImportJob = Job<ImportPayload>;
pub type ExportJob = Job<ExportPayload>;
