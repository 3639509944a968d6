pub mod ops;
pub mod transfer;

pub use ops::{FileOps, LocalFileOps};
pub use transfer::{FileTransferEngine, TransferOutcome, TransferRequest};
