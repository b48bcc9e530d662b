//! Format versioning for files written by powermon and read back later.
//!
//! # Version History
//!
//! | Version | Changes |
//! |---------|---------|
//! | 1 | Initial calibration format (brightness + average power only) |
//! | 2 | Added error bounds, charge deltas and update interval min/max |
//!
//! # Breaking Changes (require a version bump)
//!
//! - Removing fields from `CalibrationResult` or `BrightnessSample`
//! - Changing field types or units
//! - Renaming fields without `#[serde(alias)]`
//!
//! Files older than `MIN_SUPPORTED_CALIBRATION_VERSION` are rejected rather
//! than silently misread.

/// Current calibration file format version.
pub const CALIBRATION_FORMAT_VERSION: u32 = 2;

/// Oldest calibration file format this build can read.
pub const MIN_SUPPORTED_CALIBRATION_VERSION: u32 = 2;

/// Returns true if a file with `version` can be read by this build.
pub fn is_supported_calibration_version(version: u32) -> bool {
    (MIN_SUPPORTED_CALIBRATION_VERSION..=CALIBRATION_FORMAT_VERSION).contains(&version)
}
