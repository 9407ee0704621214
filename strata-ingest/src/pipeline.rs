//! Batch ingestion pipeline
//!
//! One batch pass discovers raw fragments for every active roster
//! client and runs each through parse -> load/repair -> merge ->
//! persist -> promote. Per-fragment error isolation: a bad fragment
//! never aborts the batch. Uploads run only after the ledger is
//! persisted and are retried with backoff here, in the batch caller,
//! never inside the merge engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use strata_common::config::{ClientEntry, IngestConfig};

use crate::error::{IngestError, IngestResult};
use crate::partition::{PartitionKey, FRAGMENT_SUFFIX};
use crate::services::fragment_loader::{self, LoadError};
use crate::services::ledger::{ClientDayLedger, LedgerError, MergeStats};
use crate::services::promoter;
use crate::uploader::{UploadError, Uploader};

/// Base delay for upload retry backoff; doubles per attempt.
const RETRY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Successful ingestion of one fragment.
#[derive(Debug)]
pub struct FragmentOutcome {
    pub stats: MergeStats,
    /// Ledger was promoted to the silver tier this attempt
    pub silver_promoted: bool,
    /// Artifacts still local after upload retries ran out; the next
    /// cycle picks them up again
    pub pending_uploads: Vec<PathBuf>,
}

/// What one batch pass did, with the identity of everything that was
/// skipped or flagged so an operator can follow up.
#[derive(Debug, Default)]
pub struct BatchReport {
    /// Fragments merged into a ledger and persisted
    pub merged: Vec<PathBuf>,
    /// Files whose names did not parse (skipped entirely)
    pub malformed: Vec<PathBuf>,
    /// Fragments quarantined as unrepairable
    pub corrupt: Vec<PathBuf>,
    /// Fragments that could not be combined with an existing ledger
    pub merge_failures: Vec<PathBuf>,
    /// Fragments whose data had no prior ledger to fall back to
    pub fatal_failures: Vec<PathBuf>,
    /// Fragments or ledgers skipped on filesystem errors, left in
    /// place for the next cycle
    pub io_failures: Vec<PathBuf>,
    /// Artifacts still local after upload retries ran out
    pub upload_failures: Vec<PathBuf>,
    /// New records added across all ledgers this pass
    pub records_added: usize,
    /// Ledgers promoted to the silver tier
    pub silver_promotions: usize,
}

impl BatchReport {
    /// Fragments that did not make it into a ledger this pass.
    pub fn bad_fragments(&self) -> usize {
        self.malformed.len()
            + self.corrupt.len()
            + self.merge_failures.len()
            + self.fatal_failures.len()
    }
}

/// Batch ingestion pipeline over one data directory.
pub struct IngestPipeline {
    config: IngestConfig,
    uploader: Arc<dyn Uploader>,
}

impl IngestPipeline {
    /// Create a pipeline with an injected uploader capability.
    pub fn new(config: IngestConfig, uploader: Arc<dyn Uploader>) -> Self {
        Self { config, uploader }
    }

    /// Run one batch pass over every active roster client.
    pub async fn run_batch(&self) -> BatchReport {
        let mut report = BatchReport::default();

        for client in self.config.active_clients() {
            let fragments = match self.discover(client) {
                Ok(found) => found,
                Err(e) => {
                    warn!("Discovery failed for {}: {}", client.name, e);
                    continue;
                }
            };
            debug!(
                "Discovered {} fragment(s) for {}",
                fragments.len(),
                client.name
            );
            for path in fragments {
                match self.ingest_fragment(&path).await {
                    Ok(outcome) => {
                        report.records_added += outcome.stats.merged - outcome.stats.existing;
                        if outcome.silver_promoted {
                            report.silver_promotions += 1;
                        }
                        report.upload_failures.extend(outcome.pending_uploads);
                        report.merged.push(path);
                    }
                    Err(e) => record_failure(path, e, &mut report),
                }
            }
        }

        info!(
            "Batch complete: {} merged, {} record(s) added, {} silver promotion(s), \
             {} bad fragment(s), {} upload failure(s)",
            report.merged.len(),
            report.records_added,
            report.silver_promotions,
            report.bad_fragments(),
            report.upload_failures.len()
        );
        report
    }

    /// Run one fragment through parse -> load/repair -> merge ->
    /// persist -> promote.
    ///
    /// Upload failures are not errors at this level: promotion is
    /// retry-safe across cycles, so they come back in the outcome as
    /// pending work instead.
    pub async fn ingest_fragment(&self, path: &Path) -> IngestResult<FragmentOutcome> {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        // The partition comes from the name alone; an undecodable name
        // means the file is skipped entirely and no ledger is touched.
        let key = PartitionKey::parse(&file_name)?;

        let mut loaded = fragment_loader::load_fragment(path)?;

        let mut ledger = ClientDayLedger::open_or_create(&self.config.data_dir, &key)?;
        let values = std::mem::take(&mut loaded.values);
        let stats = match ledger.merge(values) {
            Ok(stats) => stats,
            Err(e) => {
                if matches!(
                    e,
                    LedgerError::StructureFatal { .. } | LedgerError::StructureRecoverable { .. }
                ) {
                    self.quarantine(path, loaded.raw_copy.as_deref());
                }
                return Err(e.into());
            }
        };

        ledger.persist()?;
        info!(
            "Merged {} record(s) from {} into {} ({} total, {} duplicate(s) dropped)",
            stats.incoming,
            file_name,
            ledger.path().display(),
            stats.merged,
            stats.duplicates
        );

        let (silver_promoted, pending_uploads) = self
            .promote(path, &file_name, &key, loaded.raw_copy.as_deref(), ledger.path())
            .await;

        Ok(FragmentOutcome {
            stats,
            silver_promoted,
            pending_uploads,
        })
    }

    /// Raw fragments for one client: `<client>_*` files ending in
    /// `_log.json`, in name order for deterministic batches.
    fn discover(&self, client: &ClientEntry) -> std::io::Result<Vec<PathBuf>> {
        let prefix = format!("{}_", client.name);
        let entries = match std::fs::read_dir(&self.config.data_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let mut found = Vec::new();
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(&prefix) && name.ends_with(FRAGMENT_SUFFIX) {
                found.push(entry.path());
            }
        }
        found.sort();
        Ok(found)
    }

    /// Hand promoted artifacts to the uploader. Bronze always, from
    /// the pre-repair bytes when a repair ran, with move semantics;
    /// silver only at a window boundary, with copy semantics.
    ///
    /// Returns whether silver was promoted, plus any artifacts whose
    /// uploads ran out of retries.
    async fn promote(
        &self,
        path: &Path,
        file_name: &str,
        key: &PartitionKey,
        raw_copy: Option<&Path>,
        ledger_path: &Path,
    ) -> (bool, Vec<PathBuf>) {
        let mut pending = Vec::new();

        let bronze_local = raw_copy.unwrap_or(path);
        let bronze_key = promoter::bronze_key(&self.config.remote_prefix, key, file_name);
        match self.place_with_retry(bronze_local, &bronze_key).await {
            Ok(()) => {
                // The local raw file leaves only once the bronze copy
                // is durable.
                if let Err(e) = remove_fragment(path, raw_copy) {
                    warn!(
                        "Could not remove uploaded fragment {}: {}",
                        path.display(),
                        e
                    );
                }
            }
            Err(e) => {
                warn!("Bronze upload failed, will retry next cycle: {}", e);
                pending.push(path.to_path_buf());
            }
        }

        let mut silver_promoted = false;
        if promoter::end_of_window(key.second) {
            let silver_key = promoter::silver_key(&self.config.remote_prefix, key);
            match self.place_with_retry(ledger_path, &silver_key).await {
                Ok(()) => silver_promoted = true,
                Err(e) => {
                    warn!("Silver upload failed, will retry next cycle: {}", e);
                    pending.push(ledger_path.to_path_buf());
                }
            }
        } else {
            debug!("{} outside window bands, silver promotion deferred", key);
        }

        (silver_promoted, pending)
    }

    /// Upload with bounded backoff. `UploadError` is transient by
    /// contract; after the last attempt the artifact stays local and
    /// the next batch cycle picks it up again.
    async fn place_with_retry(&self, local: &Path, key: &str) -> Result<(), UploadError> {
        let attempts = self.config.upload_attempts.max(1);
        let mut delay = RETRY_BASE_DELAY;
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.uploader.place(local, key).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < attempts => {
                    debug!(
                        "Upload attempt {}/{} for {} failed: {}",
                        attempt, attempts, key, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Quarantine a fragment whose records could not be merged. A
    /// quarantine that itself fails leaves the file for the next
    /// cycle.
    fn quarantine(&self, path: &Path, raw_copy: Option<&Path>) {
        match fragment_loader::quarantine_fragment(path, raw_copy) {
            Ok(quarantined) => warn!("Fragment preserved at {}", quarantined.display()),
            Err(e) => warn!("Could not quarantine {}: {}", path.display(), e),
        }
    }
}

/// File the identity of a failed fragment under the matching report
/// bucket.
fn record_failure(path: PathBuf, err: IngestError, report: &mut BatchReport) {
    if err.is_fatal() {
        error!("Fatal failure for {}: {}", path.display(), err);
    } else {
        warn!("Skipping {}: {}", path.display(), err);
    }
    match err {
        IngestError::MalformedFilename(_) => report.malformed.push(path),
        IngestError::Load(LoadError::Corrupt { .. }) => report.corrupt.push(path),
        IngestError::Load(_) => report.io_failures.push(path),
        IngestError::Merge(LedgerError::StructureFatal { .. }) => {
            report.fatal_failures.push(path)
        }
        IngestError::Merge(LedgerError::StructureRecoverable { .. }) => {
            report.merge_failures.push(path)
        }
        IngestError::Merge(_) => report.io_failures.push(path),
        IngestError::Upload(e) => report.upload_failures.push(e.path),
    }
}

/// Remove an uploaded fragment and its pre-repair copy, if any.
fn remove_fragment(path: &Path, raw_copy: Option<&Path>) -> std::io::Result<()> {
    std::fs::remove_file(path)?;
    if let Some(copy) = raw_copy {
        std::fs::remove_file(copy)?;
    }
    Ok(())
}
