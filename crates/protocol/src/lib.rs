//! Record types shared by the powermon daemon, its history store and the
//! calibration tool.
//!
//! Everything here is plain data with serde derives; the logic that produces
//! these records lives in `powermon-platform` and the `powermon` binary.

mod calibration;
mod power_state;
mod types;
mod version;

pub use calibration::{BrightnessSample, CalibrationResult};
pub use power_state::{LogAction, PowerStateEvent, PowerStateKind, SleepAction, StateLogEntry};
pub use types::{BacklightSample, BatterySample, BatteryStatus};
pub use version::{
    is_supported_calibration_version, CALIBRATION_FORMAT_VERSION,
    MIN_SUPPORTED_CALIBRATION_VERSION,
};
