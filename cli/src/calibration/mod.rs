//! Offline measurement of display power per backlight level.
//!
//! The battery controller averages internally and only updates its registers
//! every few seconds, so each phase here waits for the sensor rather than the
//! wall clock.

mod clock;
mod engine;
mod stats;

use std::time::Duration;

use powermon_platform::linux::Backlight;
use powermon_platform::TelemetryError;
use thiserror::Error;

pub use clock::{Clock, SystemClock};
pub use engine::{Calibrator, Latency, PowerMeasurement, UpdateIntervalStats};

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("only detected {found} value changes, need at least {needed}")]
    InsufficientSamples { found: usize, needed: usize },

    #[error("power reading did not settle within {cycles} cycles")]
    DidNotSettle { cycles: u32 },

    #[error("battery charge did not change within {waited:?}")]
    NoChargeChange { waited: Duration },

    #[error("{phase} timed out after {waited:?}")]
    Timeout { phase: &'static str, waited: Duration },

    #[error("no valid voltage samples in the measurement window")]
    NoVoltage,

    #[error("baseline power is zero")]
    ZeroBaseline,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

pub type Result<T> = std::result::Result<T, CalibrationError>;

/// A load the engine can step, e.g. display brightness.
pub trait Stimulus {
    fn set_level(&mut self, percent: u8) -> std::result::Result<(), TelemetryError>;
}

impl Stimulus for Backlight {
    fn set_level(&mut self, percent: u8) -> std::result::Result<(), TelemetryError> {
        self.set_percent(percent)
    }
}
