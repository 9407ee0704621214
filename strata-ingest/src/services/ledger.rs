//! Client-day ledger and merge engine
//!
//! One ledger exists per (client, date); its CSV on disk is the single
//! source of truth for that key. Merges are idempotent: records are
//! deduplicated by full-row equality over the column union, so
//! reprocessing a fragment the collector delivered twice is a no-op on
//! the ledger's logical content.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info};

use crate::partition::PartitionKey;
use crate::services::csv_codec::{self, Record};

/// Ledger and merge errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// I/O failure loading or persisting the ledger
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Incoming fragment cannot be structured into tabular records and
    /// no prior ledger exists - there is nowhere safe to put the data
    #[error("cannot structure records for new ledger {}", .path.display())]
    StructureFatal { path: PathBuf },

    /// Incoming fragment cannot be structured; the existing ledger is
    /// preserved unchanged
    #[error("cannot structure records, existing ledger {} left unchanged", .path.display())]
    StructureRecoverable { path: PathBuf },
}

/// Counts from one merge attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeStats {
    /// Records already in the ledger before the merge
    pub existing: usize,
    /// Records in the incoming fragment
    pub incoming: usize,
    /// Records in the ledger after deduplication
    pub merged: usize,
    /// Rows dropped as full-row duplicates
    pub duplicates: usize,
}

/// Per-(client, date) record aggregate.
///
/// Created empty the first time a key is seen, loaded from disk on
/// every later attempt, mutated only by [`merge`](Self::merge), and
/// persisted with a durable replace after every successful merge.
#[derive(Debug)]
pub struct ClientDayLedger {
    client: String,
    path: PathBuf,
    /// Column union in first-appearance order
    columns: Vec<String>,
    records: Vec<Record>,
    is_new: bool,
    current_file_exists: bool,
    bad_file: bool,
}

impl ClientDayLedger {
    /// Load the ledger for `key` from `data_dir`, or start an empty one
    /// if no persisted ledger exists for that (client, date) yet.
    pub fn open_or_create(data_dir: &Path, key: &PartitionKey) -> Result<Self, LedgerError> {
        let path = data_dir.join(key.ledger_file_name());
        if path.exists() {
            let text = fs::read_to_string(&path).map_err(|e| LedgerError::Io {
                path: path.clone(),
                source: e,
            })?;
            let (columns, records) = csv_codec::decode(&text);
            debug!(
                "Loaded ledger {} ({} record(s))",
                path.display(),
                records.len()
            );
            Ok(Self {
                client: key.client.clone(),
                path,
                columns,
                records,
                is_new: false,
                current_file_exists: true,
                bad_file: false,
            })
        } else {
            debug!("No ledger at {}, starting empty", path.display());
            Ok(Self {
                client: key.client.clone(),
                path,
                columns: Vec::new(),
                records: Vec::new(),
                is_new: true,
                current_file_exists: true,
                bad_file: false,
            })
        }
    }

    /// Client this ledger aggregates.
    pub fn client(&self) -> &str {
        &self.client
    }

    /// On-disk path of the persisted ledger.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Column union in first-appearance order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Records accumulated so far for this (client, date).
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// True when no persisted ledger existed for this key.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    /// True once a merge attempt against this ledger has failed.
    pub fn is_bad(&self) -> bool {
        self.bad_file
    }

    /// True once the ledger object is backed by (or destined for) an
    /// on-disk file.
    pub fn current_file_exists(&self) -> bool {
        self.current_file_exists
    }

    /// Merge loaded fragment values into the ledger.
    ///
    /// Every value must be a JSON object; anything else cannot be laid
    /// out as a ledger row. Failure on a brand-new key is fatal (there
    /// is no prior ledger to fall back to); against a loaded ledger
    /// both the in-memory and on-disk state are left untouched.
    ///
    /// Merging an empty fragment is a no-op.
    pub fn merge(&mut self, values: Vec<Value>) -> Result<MergeStats, LedgerError> {
        let incoming = match structure_records(values) {
            Some(records) => records,
            None => {
                self.bad_file = true;
                return Err(if self.is_new {
                    LedgerError::StructureFatal {
                        path: self.path.clone(),
                    }
                } else {
                    LedgerError::StructureRecoverable {
                        path: self.path.clone(),
                    }
                });
            }
        };

        let existing = self.records.len();
        let incoming_count = incoming.len();

        for record in &incoming {
            for field in record.keys() {
                if !self.columns.iter().any(|c| c == field) {
                    self.columns.push(field.clone());
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::with_capacity(existing + incoming_count);
        let mut merged: Vec<Record> = Vec::with_capacity(existing + incoming_count);
        for record in self.records.drain(..).chain(incoming) {
            if seen.insert(dedup_key(&self.columns, &record)) {
                merged.push(record);
            }
        }
        let duplicates = existing + incoming_count - merged.len();
        self.records = merged;

        Ok(MergeStats {
            existing,
            incoming: incoming_count,
            merged: self.records.len(),
            duplicates,
        })
    }

    /// Durably replace the on-disk ledger: write to a temporary sibling,
    /// then rename over the previous file so no reader ever observes a
    /// partially written ledger.
    pub fn persist(&self) -> Result<(), LedgerError> {
        let text = csv_codec::encode(&self.columns, &self.records);
        let tmp = self.path.with_extension("csv.tmp");
        fs::write(&tmp, text).map_err(|e| LedgerError::Io {
            path: tmp.clone(),
            source: e,
        })?;
        fs::rename(&tmp, &self.path).map_err(|e| LedgerError::Io {
            path: self.path.clone(),
            source: e,
        })?;
        info!(
            "Persisted ledger {} ({} record(s))",
            self.path.display(),
            self.records.len()
        );
        Ok(())
    }
}

/// Lay fragment values out as tabular records. `None` when any element
/// is not a JSON object.
fn structure_records(values: Vec<Value>) -> Option<Vec<Record>> {
    values
        .into_iter()
        .map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect()
}

/// Canonical row form for deduplication: every column in union order,
/// with missing fields, JSON nulls, and empty strings all rendered the
/// same way - they are indistinguishable after a CSV round trip, so
/// they must also be indistinguishable to the dedup.
fn dedup_key(columns: &[String], record: &Record) -> String {
    let mut key = String::new();
    for col in columns {
        match record.get(col.as_str()) {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) if s.is_empty() => {}
            // serde_json escapes control characters inside strings, so
            // the separator below cannot collide with cell content
            Some(v) => key.push_str(&v.to_string()),
        }
        key.push('\u{1f}');
    }
    key
}
