//! strata-ingest - telemetry fragment ingestion pipeline
//!
//! Repairs append-only JSON fragments streamed from field controllers,
//! merges them into per-(client, day) CSV ledgers, and promotes
//! artifacts through the bronze/silver storage tiers via an injected
//! uploader capability.

pub mod error;
pub mod partition;
pub mod pipeline;
pub mod services;
pub mod uploader;

pub use crate::error::{IngestError, IngestResult};
pub use crate::partition::PartitionKey;
pub use crate::pipeline::{BatchReport, IngestPipeline};
pub use crate::uploader::{MirrorUploader, UploadError, Uploader};
