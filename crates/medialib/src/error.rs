use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedialibError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("Handler error: {0}")]
    Handler(#[from] HandlerError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Invalid endpoint '{id}': {reason}")]
    InvalidEndpoint { id: String, reason: String },
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error(transparent)]
    Database(#[from] crate::db::DatabaseError),

    #[error("Job {0} not found")]
    NotFound(i64),

    #[error("Job {id} cannot move from '{from}' to '{to}'")]
    InvalidTransition {
        id: i64,
        from: crate::queue::JobState,
        to: crate::queue::JobState,
    },

    #[error("Failed to encode job data: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for QueueError {
    fn from(e: rusqlite::Error) -> Self {
        QueueError::Database(crate::db::DatabaseError::Sqlite(e))
    }
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error("Unknown endpoint '{0}'")]
    UnknownEndpoint(String),

    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to link '{from}' to '{to}': {source}")]
    Link {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy '{from}' to '{to}': {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove '{path}': {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No free file name left for '{0}'")]
    NoFreeName(PathBuf),

    #[error("Path '{0}' escapes its endpoint root")]
    OutsideRoot(PathBuf),
}

#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("{0}")]
    Failed(String),

    #[error("Record has no file with purpose '{0}'")]
    NoCandidate(crate::record::Purpose),

    #[error("Failed to read '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Transfer(#[from] TransferError),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("No {role} worker for endpoint '{endpoint}'")]
    UnknownEndpoint { role: &'static str, endpoint: String },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("Directory scan failed for '{path}': {source}")]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

pub type Result<T> = std::result::Result<T, MedialibError>;
