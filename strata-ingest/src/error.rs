//! Error types for strata-ingest
//!
//! One taxonomy crosses the pipeline boundary per fragment:
//! malformed filename (skipped entirely), corrupt record (quarantined
//! after the single repair retry), merge failure (fatal only with no
//! prior ledger), and transient upload failure (retried by the batch
//! caller).

use thiserror::Error;

use crate::partition::FilenameError;
use crate::services::fragment_loader::LoadError;
use crate::services::ledger::LedgerError;
use crate::uploader::UploadError;

/// Result type for pipeline operations
pub type IngestResult<T> = std::result::Result<T, IngestError>;

/// Pipeline-level error for one ingestion attempt.
#[derive(Debug, Error)]
pub enum IngestError {
    /// Partition key could not be decoded - the file is skipped
    /// entirely and no ledger is touched
    #[error("malformed filename: {0}")]
    MalformedFilename(#[from] FilenameError),

    /// Fragment body could not be loaded (corrupt after the repair
    /// retry, or unreadable)
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Incoming records could not be combined with the ledger
    #[error(transparent)]
    Merge(#[from] LedgerError),

    /// Transient transfer failure, retried by the batch caller
    #[error(transparent)]
    Upload(#[from] UploadError),
}

impl IngestError {
    /// Fatal errors mean data had nowhere safe to go: a merge failure
    /// with no prior ledger for the key. Everything else is local to
    /// one fragment and recoverable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::Merge(LedgerError::StructureFatal { .. })
        )
    }
}
