//! Per-record-type projections over a persisted ledger
//!
//! Projections are a convenience view for scoping individual physical
//! units without a database: filter one record type out of the day's
//! ledger, decode its epoch times, and drop the columns that carry
//! nothing for that unit. The ledger CSV stays the source of truth;
//! every projection is recomputed from it on demand.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;

use strata_common::time::format_epoch;

use crate::services::csv_codec::{self, Record};

/// Field carrying the record-type discriminant in every record.
pub const RECORD_TYPE_FIELD: &str = "record_type";
/// Field carrying seconds since the epoch in every record.
pub const EPOCH_TIME_FIELD: &str = "epoch_time";
/// Human-readable timestamp column appended to every projection.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// Record-type discriminant codes emitted by the field controllers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    BootStatus = 30,
    NodeSummary = 31,
    ControlStatus = 32,
    Busbar = 33,
    Extend = 34,
    Force = 35,
    Step = 36,
    Production = 37,
    Twin = 38,
    TwinStorage = 39,
    TestMessage = 40,
}

impl RecordKind {
    /// All known discriminants, in code order.
    pub const ALL: [RecordKind; 11] = [
        RecordKind::BootStatus,
        RecordKind::NodeSummary,
        RecordKind::ControlStatus,
        RecordKind::Busbar,
        RecordKind::Extend,
        RecordKind::Force,
        RecordKind::Step,
        RecordKind::Production,
        RecordKind::Twin,
        RecordKind::TwinStorage,
        RecordKind::TestMessage,
    ];

    /// Wire code for this record kind.
    pub fn code(self) -> i64 {
        self as i64
    }

    /// Decode a wire code.
    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.code() == code)
    }
}

/// Projection errors
#[derive(Debug, Error)]
pub enum ProjectionError {
    /// I/O failure reading the ledger
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read-only per-record-type view of a ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub kind: RecordKind,
    /// Columns carrying at least one value in this view, plus the
    /// derived `timestamp`
    pub columns: Vec<String>,
    pub records: Vec<Record>,
}

/// Computes and caches projections from a ledger's on-disk CSV.
pub struct Projector {
    ledger_path: PathBuf,
    columns: Vec<String>,
    records: Vec<Record>,
    cache: HashMap<RecordKind, Projection>,
}

impl Projector {
    /// Open a projector over a persisted ledger, reading its current
    /// content.
    pub fn open(ledger_path: &Path) -> Result<Self, ProjectionError> {
        let mut projector = Self {
            ledger_path: ledger_path.to_path_buf(),
            columns: Vec::new(),
            records: Vec::new(),
            cache: HashMap::new(),
        };
        projector.refresh()?;
        Ok(projector)
    }

    /// Discard every cached projection and re-read the ledger's
    /// current on-disk content.
    pub fn refresh(&mut self) -> Result<(), ProjectionError> {
        let text = fs::read_to_string(&self.ledger_path).map_err(|e| ProjectionError::Io {
            path: self.ledger_path.clone(),
            source: e,
        })?;
        let (columns, records) = csv_codec::decode(&text);
        self.columns = columns;
        self.records = records;
        self.cache.clear();
        Ok(())
    }

    /// Projection for one record kind, computed on first use.
    pub fn projection_for(&mut self, kind: RecordKind) -> &Projection {
        self.cache
            .entry(kind)
            .or_insert_with(|| project(kind, &self.columns, &self.records))
    }

    /// Records currently loaded from the ledger.
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

/// Filter, timestamp, and column-prune one record kind.
fn project(kind: RecordKind, columns: &[String], records: &[Record]) -> Projection {
    let mut rows: Vec<Record> = records
        .iter()
        .filter(|r| r.get(RECORD_TYPE_FIELD).and_then(value_as_code) == Some(kind.code()))
        .cloned()
        .collect();

    for row in &mut rows {
        if let Some(epoch) = row.get(EPOCH_TIME_FIELD).and_then(value_as_code) {
            row.insert(
                TIMESTAMP_FIELD.to_string(),
                Value::String(format_epoch(epoch)),
            );
        }
    }

    // Keep only columns that carry a value somewhere in this view.
    let mut kept: Vec<String> = columns
        .iter()
        .filter(|col| rows.iter().any(|r| is_populated(r.get(col.as_str()))))
        .cloned()
        .collect();
    if rows.iter().any(|r| r.contains_key(TIMESTAMP_FIELD)) {
        kept.push(TIMESTAMP_FIELD.to_string());
    }

    for row in &mut rows {
        row.retain(|field, _| kept.iter().any(|c| c == field));
    }

    Projection {
        kind,
        columns: kept,
        records: rows,
    }
}

fn value_as_code(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f as i64))
}

fn is_populated(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
