//! Configuration loading and client roster resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Sentinel marking a roster entry as unset.
///
/// The collection roster is maintained by hand; entries whose host or
/// credential carry this value (or are left empty) are placeholders
/// and must never be fed into the pipeline.
pub const SKIP_SENTINEL: &str = "none";

/// One telemetry client in the collection roster.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientEntry {
    /// Client name as it appears in fragment filenames
    pub name: String,
    /// Host or IP the collection agent pulls from
    #[serde(default)]
    pub host: String,
    /// Credential used by the collection agent
    #[serde(default)]
    pub credential: String,
}

impl ClientEntry {
    /// Whether this entry may be fed into the pipeline.
    pub fn is_active(&self) -> bool {
        !self.name.is_empty()
            && !self.host.is_empty()
            && !self.credential.is_empty()
            && self.host != SKIP_SENTINEL
            && self.credential != SKIP_SENTINEL
    }
}

/// Ingest service configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Directory the collection agent drops raw fragments into
    pub data_dir: PathBuf,
    /// Key prefix prepended to every remote object key
    pub remote_prefix: String,
    /// Seconds between batch passes when running as a service
    pub interval_secs: u64,
    /// Upload attempts per artifact per batch pass
    pub upload_attempts: u32,
    /// Collection roster
    #[serde(rename = "client")]
    pub clients: Vec<ClientEntry>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            remote_prefix: "data/".to_string(),
            interval_secs: 300,
            upload_attempts: 3,
            clients: Vec::new(),
        }
    }
}

impl IngestConfig {
    /// Load configuration following the resolution priority order:
    /// 1. Explicit path argument (highest priority)
    /// 2. `STRATA_CONFIG` environment variable
    /// 3. `strata.toml` in the working directory
    ///
    /// A missing file is not fatal: defaults are returned with a
    /// warning so the service can start on a bare host.
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let candidate = cli_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("STRATA_CONFIG").ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from("strata.toml"));

        if !candidate.exists() {
            tracing::warn!(
                "Config file {} not found, using defaults",
                candidate.display()
            );
            return Ok(Self::default());
        }

        Self::from_file(&candidate)
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        toml::from_str(&raw).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Roster entries that may be fed into the pipeline.
    pub fn active_clients(&self) -> impl Iterator<Item = &ClientEntry> {
        self.clients.iter().filter(|c| c.is_active())
    }
}
