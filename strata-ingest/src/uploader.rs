//! Uploader capability
//!
//! Remote transfer is not owned by the pipeline: the engine hands
//! (local path, remote key) pairs to whatever [`Uploader`] it was
//! built with. Failures are transient by contract - the batch caller
//! retries with backoff, and when retries run out the artifact stays
//! on disk for the next cycle.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

/// Transient upload failure; always retryable by the caller.
#[derive(Debug, Error)]
#[error("upload of {} to {key} failed: {reason}", .path.display())]
pub struct UploadError {
    pub path: PathBuf,
    pub key: String,
    pub reason: String,
}

/// Capability for placing local artifacts at remote keys.
#[async_trait::async_trait]
pub trait Uploader: Send + Sync {
    /// Place the file at `local` under `remote_key`.
    ///
    /// Must be retry-safe: a partially placed object from a failed
    /// attempt may be overwritten by the next one.
    async fn place(&self, local: &Path, remote_key: &str) -> Result<(), UploadError>;
}

/// Uploader that mirrors artifacts into a local directory tree.
///
/// Stands in for the object-store transfer agent: the mirror root is
/// a mounted staging area an external sync process drains. Also the
/// uploader the test suite runs against.
pub struct MirrorUploader {
    root: PathBuf,
}

impl MirrorUploader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait::async_trait]
impl Uploader for MirrorUploader {
    async fn place(&self, local: &Path, remote_key: &str) -> Result<(), UploadError> {
        let dest = self.root.join(remote_key);
        let err = |e: std::io::Error| UploadError {
            path: local.to_path_buf(),
            key: remote_key.to_string(),
            reason: e.to_string(),
        };

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(err)?;
        }
        tokio::fs::copy(local, &dest).await.map_err(err)?;
        debug!("Mirrored {} to {}", local.display(), dest.display());
        Ok(())
    }
}
