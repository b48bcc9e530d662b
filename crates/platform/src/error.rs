use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while reading or writing sysfs telemetry.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("no {0} device found")]
    NotFound(&'static str),

    #[error("failed to read {}", path.display())]
    ReadFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unexpected value {value:?} in {}", path.display())]
    InvalidValue { path: PathBuf, value: String },

    #[error("failed to write {}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl TelemetryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, TelemetryError::NotFound(_))
    }
}
