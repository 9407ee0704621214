//! End-to-end batch pipeline tests
//!
//! Drives the full discover -> parse -> repair -> merge -> persist ->
//! promote path over a temporary data directory with a mirror
//! uploader, including upload-failure recovery across batch cycles.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use strata_common::config::{ClientEntry, IngestConfig};
use strata_ingest::{IngestPipeline, MirrorUploader, UploadError, Uploader};

const TRUNCATED_STREAM: &str = concat!(
    r#"[{"record_type":33,"epoch_time":1715870700,"v_bus":412.5},"#,
    "\n",
    r#"{"record_type":36,"epoch_time":1715870701,"step":4},"#,
);

fn client(name: &str) -> ClientEntry {
    ClientEntry {
        name: name.to_string(),
        host: "10.0.0.5".to_string(),
        credential: "secret".to_string(),
    }
}

fn config(data_dir: &Path, clients: Vec<ClientEntry>) -> IngestConfig {
    IngestConfig {
        data_dir: data_dir.to_path_buf(),
        remote_prefix: "data/".to_string(),
        interval_secs: 60,
        upload_attempts: 2,
        clients,
    }
}

fn write_fragment(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

fn ledger_lines(data_dir: &Path, name: &str) -> usize {
    std::fs::read_to_string(data_dir.join(name))
        .unwrap()
        .lines()
        .count()
}

/// Uploader that fails a fixed number of calls before delegating to a
/// mirror, for exercising retry and next-cycle recovery.
struct FlakyUploader {
    inner: MirrorUploader,
    failures_left: AtomicUsize,
}

#[async_trait::async_trait]
impl Uploader for FlakyUploader {
    async fn place(&self, local: &Path, remote_key: &str) -> Result<(), UploadError> {
        let left = self.failures_left.load(Ordering::SeqCst);
        if left > 0 {
            self.failures_left.store(left - 1, Ordering::SeqCst);
            return Err(UploadError {
                path: local.to_path_buf(),
                key: remote_key.to_string(),
                reason: "synthetic outage".to_string(),
            });
        }
        self.inner.place(local, remote_key).await
    }
}

#[tokio::test]
async fn test_batch_repairs_merges_and_promotes() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    // second-field 45 sits inside the (43,47) window band
    let fragment = write_fragment(
        data.path(),
        "labrat_2024_05_16_14_45_log.json",
        TRUNCATED_STREAM,
    );

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert_eq!(report.merged.len(), 1);
    assert_eq!(report.records_added, 2);
    assert_eq!(report.silver_promotions, 1);
    assert_eq!(report.bad_fragments(), 0);
    assert!(report.upload_failures.is_empty());

    // silver ledger persisted locally: header plus two rows
    assert_eq!(
        ledger_lines(data.path(), "labrat_2024_05_16_silver_log.csv"),
        3
    );

    // bronze moved: local fragment and pre-repair copy are gone
    assert!(!fragment.exists());
    assert!(!data
        .path()
        .join("labrat_2024_05_16_14_45_log.json.orig")
        .exists());

    // bronze mirror holds the bytes exactly as received (pre-repair)
    let bronze = mirror
        .path()
        .join("data/labrat/2024/05/16/Hour14/labrat_2024_05_16_14_45_log.json");
    assert_eq!(std::fs::read_to_string(bronze).unwrap(), TRUNCATED_STREAM);

    // silver mirror holds the merged ledger
    let silver = mirror
        .path()
        .join("data/labrat/2024/05/16/labrat_2024_05_16_silver_log.csv");
    assert_eq!(std::fs::read_to_string(silver).unwrap().lines().count(), 3);
}

#[tokio::test]
async fn test_fragment_outside_window_defers_silver() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    write_fragment(
        data.path(),
        "labrat_2024_05_16_14_10_log.json",
        r#"[{"record_type":33,"epoch_time":1715870700}]"#,
    );

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert_eq!(report.merged.len(), 1);
    assert_eq!(report.silver_promotions, 0);
    // ledger still persisted locally, bronze still promoted
    assert!(data.path().join("labrat_2024_05_16_silver_log.csv").exists());
    assert!(mirror
        .path()
        .join("data/labrat/2024/05/16/Hour14/labrat_2024_05_16_14_10_log.json")
        .exists());
    assert!(!mirror
        .path()
        .join("data/labrat/2024/05/16/labrat_2024_05_16_silver_log.csv")
        .exists());
}

#[tokio::test]
async fn test_bad_fragment_does_not_abort_batch() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    write_fragment(
        data.path(),
        "labrat_2024_05_16_13_10_log.json",
        r#"[{"record_type":"#,
    );
    write_fragment(
        data.path(),
        "labrat_2024_05_16_14_10_log.json",
        r#"[{"record_type":33,"epoch_time":1715870700}]"#,
    );

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert_eq!(report.corrupt.len(), 1);
    assert_eq!(report.merged.len(), 1);

    // the corrupt fragment is preserved for inspection, out of the
    // discovery glob
    assert!(data
        .path()
        .join("labrat_2024_05_16_13_10_log.json.bad")
        .exists());
    assert!(!data.path().join("labrat_2024_05_16_13_10_log.json").exists());

    // the good fragment still produced a ledger
    assert!(data.path().join("labrat_2024_05_16_silver_log.csv").exists());
}

#[tokio::test]
async fn test_malformed_filename_is_skipped_entirely() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    // five tokens instead of six
    let path = write_fragment(
        data.path(),
        "labrat_2024_05_16_14_log.json",
        r#"[{"record_type":33,"epoch_time":1}]"#,
    );

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert_eq!(report.malformed.len(), 1);
    assert!(report.merged.is_empty());
    // file untouched, no ledger created
    assert!(path.exists());
    assert!(!data.path().join("labrat_2024_05_16_silver_log.csv").exists());
}

#[tokio::test]
async fn test_unstructurable_data_with_no_ledger_is_fatal() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    write_fragment(data.path(), "labrat_2024_05_16_14_10_log.json", "[1,2,3]");

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert_eq!(report.fatal_failures.len(), 1);
    assert!(report.merged.is_empty());
    // no ledger file was created, the fragment is preserved
    assert!(!data.path().join("labrat_2024_05_16_silver_log.csv").exists());
    assert!(data
        .path()
        .join("labrat_2024_05_16_14_10_log.json.bad")
        .exists());
}

#[tokio::test]
async fn test_reingesting_identical_content_is_noop() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    let contents = r#"[{"record_type":33,"epoch_time":1715870700,"v_bus":412.5}]"#;
    write_fragment(data.path(), "labrat_2024_05_16_14_10_log.json", contents);

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let first = pipeline.run_batch().await;
    assert_eq!(first.records_added, 1);

    // a later collection cycle re-delivers the same records under a
    // new timestamped name
    write_fragment(data.path(), "labrat_2024_05_16_15_10_log.json", contents);
    let second = pipeline.run_batch().await;

    assert_eq!(second.merged.len(), 1);
    assert_eq!(second.records_added, 0);
    assert_eq!(
        ledger_lines(data.path(), "labrat_2024_05_16_silver_log.csv"),
        2
    );
}

#[tokio::test]
async fn test_upload_failure_leaves_fragment_for_next_cycle() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    let fragment = write_fragment(
        data.path(),
        "labrat_2024_05_16_14_10_log.json",
        r#"[{"record_type":33,"epoch_time":1715870700}]"#,
    );

    // both attempts of the first batch fail
    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("labrat")]),
        Arc::new(FlakyUploader {
            inner: MirrorUploader::new(mirror.path()),
            failures_left: AtomicUsize::new(2),
        }),
    );

    let first = pipeline.run_batch().await;
    assert_eq!(first.upload_failures.len(), 1);
    assert_eq!(first.merged.len(), 1);
    // merge succeeded and persisted; the fragment stays for retry
    assert!(fragment.exists());
    assert!(data.path().join("labrat_2024_05_16_silver_log.csv").exists());

    // next cycle: the outage is over, re-merge is a no-op, bronze lands
    let second = pipeline.run_batch().await;
    assert!(second.upload_failures.is_empty());
    assert_eq!(second.records_added, 0);
    assert!(!fragment.exists());
    assert!(mirror
        .path()
        .join("data/labrat/2024/05/16/Hour14/labrat_2024_05_16_14_10_log.json")
        .exists());
}

#[tokio::test]
async fn test_sentinel_roster_entries_never_reach_the_pipeline() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    let path = write_fragment(
        data.path(),
        "parked_2024_05_16_14_10_log.json",
        r#"[{"record_type":33,"epoch_time":1}]"#,
    );

    let parked = ClientEntry {
        name: "parked".to_string(),
        host: "none".to_string(),
        credential: "none".to_string(),
    };
    let pipeline = IngestPipeline::new(
        config(data.path(), vec![parked]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert!(report.merged.is_empty());
    assert_eq!(report.bad_fragments(), 0);
    assert!(path.exists());
}

#[tokio::test]
async fn test_clients_are_isolated() {
    let data = tempfile::tempdir().unwrap();
    let mirror = tempfile::tempdir().unwrap();
    write_fragment(
        data.path(),
        "alpha_2024_05_16_14_10_log.json",
        r#"[{"record_type":33,"epoch_time":1}]"#,
    );
    write_fragment(
        data.path(),
        "beta_2024_05_16_14_10_log.json",
        r#"[{"record_type":36,"epoch_time":2}]"#,
    );

    let pipeline = IngestPipeline::new(
        config(data.path(), vec![client("alpha"), client("beta")]),
        Arc::new(MirrorUploader::new(mirror.path())),
    );
    let report = pipeline.run_batch().await;

    assert_eq!(report.merged.len(), 2);
    assert!(data.path().join("alpha_2024_05_16_silver_log.csv").exists());
    assert!(data.path().join("beta_2024_05_16_silver_log.csv").exists());
}
