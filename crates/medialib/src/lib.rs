pub mod config;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod handler;
pub mod logging;
pub mod queue;
pub mod record;
pub mod storage;
pub mod worker;

pub use config::{load_config, load_config_from_str, Config};
pub use db::Database;
pub use endpoint::{Endpoint, EndpointKind, EndpointRegistry};
pub use error::{
    ConfigError, HandlerError, MedialibError, QueueError, Result, TransferError, WorkerError,
};
pub use handler::{default_export_handlers, default_import_handlers, ExportHandlers, ImportHandlers};
pub use queue::{ExportQueue, ImportQueue, Job, JobMetadata, JobState, Outcome};
pub use record::{Record, RecordStore, SqliteRecordStore};
pub use storage::{FileTransferEngine, TransferRequest};
pub use worker::{WorkerContext, WorkerPool};
