//! Consumes the JSON-lines state log written by the sleep and shutdown hooks.

use std::ffi::OsString;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use powermon_protocol::{PowerStateEvent, StateLogEntry};
use thiserror::Error;
use tracing::{debug, warn};

use super::power_state::reconstruct;

#[derive(Debug, Error)]
pub enum StateLogError {
    #[error("state log I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed state log line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// Path the live log is moved to while it is being read.
pub fn processing_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(".processing");
    PathBuf::from(name)
}

/// Moves the log aside, parses it and deletes it.
///
/// Hooks firing meanwhile start a fresh file at `path`. A missing log yields
/// no entries. Malformed lines are skipped with a warning. A copy left aside
/// by an earlier failed read is consumed first so its entries are not lost.
pub fn consume_entries(path: &Path) -> Result<Vec<StateLogEntry>, StateLogError> {
    let processing = processing_path(path);

    let mut entries = Vec::new();
    if processing.exists() {
        warn!(
            target: "powermon::sleep",
            path = %processing.display(),
            "Recovering state log left by an interrupted read"
        );
        entries = read_and_remove(&processing)?;
    }

    match fs::rename(path, &processing) {
        Ok(()) => entries.extend(read_and_remove(&processing)?),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(source) => {
            return Err(StateLogError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }

    debug!(target: "powermon::sleep", entries = entries.len(), "Consumed state log");
    Ok(entries)
}

fn read_and_remove(path: &Path) -> Result<Vec<StateLogEntry>, StateLogError> {
    let io_err = |source| StateLogError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = fs::File::open(path).map_err(io_err)?;
    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim_ascii().is_empty() {
            continue;
        }
        match parse_line(idx + 1, &line) {
            Ok(entry) => entries.push(entry),
            Err(e) => warn!(target: "powermon::sleep", error = %e, "Skipping state log line"),
        }
    }

    fs::remove_file(path).map_err(io_err)?;
    Ok(entries)
}

/// Consumes the log at `path` and reconstructs its power state events,
/// closing open transitions at `now`.
pub fn consume(path: &Path, now: i64) -> Result<Vec<PowerStateEvent>, StateLogError> {
    let entries = consume_entries(path)?;
    Ok(reconstruct(&entries, now))
}

fn parse_line(line: usize, bytes: &[u8]) -> Result<StateLogEntry, StateLogError> {
    serde_json::from_slice(bytes).map_err(|source| StateLogError::Parse { line, source })
}
