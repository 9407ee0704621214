//! JSON repair and fragment loading
//!
//! Stream writers append records without ever closing the enclosing
//! array, so a fragment interrupted mid-stream is a run of back-to-back
//! objects with a dangling separator. Loading tries the happy path
//! first, then repairs the framing in place and retries exactly once.
//! Before any mutation the received bytes are copied aside: the bronze
//! tier must survive even a repair that makes things worse.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

/// Suffix appended to the pre-repair copy of a mutated fragment.
pub const RAW_COPY_SUFFIX: &str = "orig";
/// Suffix appended to fragments that stay unparseable after repair.
pub const QUARANTINE_SUFFIX: &str = "bad";

/// Fragment loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    /// I/O failure reading or rewriting the fragment
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fragment stayed unparseable after the single repair attempt
    #[error("corrupt fragment quarantined at {}", .quarantined.display())]
    Corrupt { path: PathBuf, quarantined: PathBuf },
}

/// Outcome of a successful fragment load.
#[derive(Debug)]
pub struct LoadedFragment {
    /// Array elements, in file order
    pub values: Vec<Value>,
    /// Set when the file was rewritten by the repair pass
    pub repaired: bool,
    /// Pre-repair copy of the received bytes, when a repair ran.
    /// This, not the rewritten file, is the bronze-tier artifact.
    pub raw_copy: Option<PathBuf>,
}

/// Load a raw fragment, repairing the stream framing if needed.
///
/// On an unrecoverable fragment the received bytes are preserved at
/// the quarantine path (`<name>.bad`), which the discovery glob never
/// matches, so a genuinely bad file is retried at most once ever.
pub fn load_fragment(path: &Path) -> Result<LoadedFragment, LoadError> {
    let bytes = fs::read(path).map_err(|e| io_err(path, e))?;

    match parse_array(&bytes) {
        Ok(values) => {
            return Ok(LoadedFragment {
                values,
                repaired: false,
                raw_copy: None,
            })
        }
        Err(e) => debug!("Direct parse of {} failed: {}", path.display(), e),
    }

    let raw_copy = sibling(path, RAW_COPY_SUFFIX);
    fs::write(&raw_copy, &bytes).map_err(|e| io_err(&raw_copy, e))?;

    let repaired = repair_framing(&bytes);
    fs::write(path, &repaired).map_err(|e| io_err(path, e))?;

    match parse_array(&repaired) {
        Ok(values) => {
            debug!(
                "Repaired framing of {} ({} record(s))",
                path.display(),
                values.len()
            );
            Ok(LoadedFragment {
                values,
                repaired: true,
                raw_copy: Some(raw_copy),
            })
        }
        Err(e) => {
            warn!("Fragment {} unparseable after repair: {}", path.display(), e);
            let quarantined = quarantine_fragment(path, Some(&raw_copy))?;
            Err(LoadError::Corrupt {
                path: path.to_path_buf(),
                quarantined,
            })
        }
    }
}

/// Move a fragment to its quarantine path (`<name>.bad`), restoring the
/// pre-repair bytes first when a repair had already rewritten the file.
/// Returns the quarantine path.
pub fn quarantine_fragment(
    path: &Path,
    raw_copy: Option<&Path>,
) -> Result<PathBuf, LoadError> {
    let quarantined = sibling(path, QUARANTINE_SUFFIX);
    match raw_copy {
        Some(copy) => {
            fs::rename(copy, &quarantined).map_err(|e| io_err(copy, e))?;
            fs::remove_file(path).map_err(|e| io_err(path, e))?;
        }
        None => {
            fs::rename(path, &quarantined).map_err(|e| io_err(path, e))?;
        }
    }
    Ok(quarantined)
}

fn io_err(path: &Path, source: std::io::Error) -> LoadError {
    LoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn sibling(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

fn parse_array(bytes: &[u8]) -> Result<Vec<Value>, serde_json::Error> {
    serde_json::from_slice(bytes)
}

/// Rewrite stream framing: drop one dangling separator, close the
/// array, and open it unless the writer already emitted the leading
/// delimiter before being interrupted.
fn repair_framing(bytes: &[u8]) -> Vec<u8> {
    let mut end = bytes.len();
    while end > 0 && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    if end > 0 && bytes[end - 1] == b',' {
        end -= 1;
    }

    let body = &bytes[..end];
    let first = body.iter().find(|b| !b.is_ascii_whitespace());
    let needs_open = first != Some(&b'[');

    let mut out = Vec::with_capacity(body.len() + 3);
    if needs_open {
        out.push(b'[');
    }
    out.extend_from_slice(body);
    out.extend_from_slice(b"\n]");
    out
}
