//! Partition key decoding from fragment filenames
//!
//! Raw fragments arrive named `<client>_<YYYY>_<MM>_<DD>_<HH>_<SS>_log.json`.
//! The name is the only place the partition is encoded, so it is parsed
//! into a typed key exactly once and reused everywhere downstream.

use std::fmt;

use thiserror::Error;

/// Suffix every raw fragment filename carries.
pub const FRAGMENT_SUFFIX: &str = "_log.json";

/// Filename grammar errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FilenameError {
    /// Name does not end in the fragment suffix
    #[error("missing `{FRAGMENT_SUFFIX}` suffix: {0}")]
    MissingSuffix(String),

    /// Wrong number of underscore-delimited tokens before the suffix
    #[error("expected 6 tokens before the suffix, found {found}: {name}")]
    TokenCount { name: String, found: usize },

    /// Client token is empty
    #[error("empty client token: {0}")]
    EmptyClient(String),

    /// A date or time token is not numeric
    #[error("token `{token}` is not numeric in {name}")]
    NonNumeric { name: String, token: String },

    /// A date or time token is outside its allowed range
    #[error("{field} {value} out of range in {name}")]
    OutOfRange {
        name: String,
        field: &'static str,
        value: u16,
    },
}

/// Partition key decoded from a fragment filename.
///
/// Immutable once parsed. The `second` field is the sixth filename
/// token, stamped from the stream writer's transfer clock; the tier
/// promoter reads it for the end-of-window decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionKey {
    pub client: String,
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub second: u8,
}

impl PartitionKey {
    /// Parse a fragment filename into a partition key.
    ///
    /// The grammar is `<client>_<YYYY>_<MM>_<DD>_<HH>_<SS>_log.json`:
    /// exactly six underscore-delimited tokens before the suffix.
    /// Pure function, no filesystem access.
    pub fn parse(file_name: &str) -> Result<Self, FilenameError> {
        let stem = file_name
            .strip_suffix(FRAGMENT_SUFFIX)
            .ok_or_else(|| FilenameError::MissingSuffix(file_name.to_string()))?;

        let tokens: Vec<&str> = stem.split('_').collect();
        if tokens.len() != 6 {
            return Err(FilenameError::TokenCount {
                name: file_name.to_string(),
                found: tokens.len(),
            });
        }

        let client = tokens[0];
        if client.is_empty() {
            return Err(FilenameError::EmptyClient(file_name.to_string()));
        }

        Ok(Self {
            client: client.to_string(),
            year: numeric_token(file_name, tokens[1])?,
            month: ranged_token(file_name, tokens[2], "month", 1, 12)?,
            day: ranged_token(file_name, tokens[3], "day", 1, 31)?,
            hour: ranged_token(file_name, tokens[4], "hour", 0, 23)?,
            second: ranged_token(file_name, tokens[5], "second", 0, 59)?,
        })
    }

    /// Name of the persisted silver ledger for this key's (client, date):
    /// `<client>_<YYYY>_<MM>_<DD>_silver_log.csv`.
    pub fn ledger_file_name(&self) -> String {
        format!(
            "{}_{:04}_{:02}_{:02}_silver_log.csv",
            self.client, self.year, self.month, self.day
        )
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:04}-{:02}-{:02} hour {:02} sec {:02}",
            self.client, self.year, self.month, self.day, self.hour, self.second
        )
    }
}

fn numeric_token(name: &str, token: &str) -> Result<u16, FilenameError> {
    token.parse::<u16>().map_err(|_| FilenameError::NonNumeric {
        name: name.to_string(),
        token: token.to_string(),
    })
}

fn ranged_token(
    name: &str,
    token: &str,
    field: &'static str,
    min: u16,
    max: u16,
) -> Result<u8, FilenameError> {
    let value = numeric_token(name, token)?;
    if value < min || value > max {
        return Err(FilenameError::OutOfRange {
            name: name.to_string(),
            field,
            value,
        });
    }
    Ok(value as u8)
}
