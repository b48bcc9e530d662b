use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

use powermon_protocol::*;

fn sample_battery() -> BatterySample {
    BatterySample {
        timestamp: 1_700_000_000,
        voltage_uv: 12_100_000,
        current_ua: 850_000,
        power_uw: 10_250_000,
        power_from_charge_delta: true,
        sysfs_power_uw: 10_285_000,
        charge_now_uah: 3_912_000,
        capacity_pct: 71,
        status: BatteryStatus::Discharging,
    }
}

#[test]
fn battery_sample_json_shape() {
    let value = serde_json::to_value(sample_battery()).unwrap();
    assert_eq!(
        value,
        json!({
            "timestamp": 1_700_000_000,
            "voltage_uv": 12_100_000,
            "current_ua": 850_000,
            "power_uw": 10_250_000,
            "power_from_charge_delta": true,
            "sysfs_power_uw": 10_285_000,
            "charge_now_uah": 3_912_000,
            "capacity_pct": 71,
            "status": "Discharging",
        })
    );
}

#[test]
fn state_log_line_with_sleep_action() {
    let line = r#"{"ts":1700000100,"action":"pre","what":"suspend-then-hibernate","sleep_action":"suspend"}"#;
    let entry: StateLogEntry = serde_json::from_str(line).unwrap();
    assert_eq!(
        entry,
        StateLogEntry::pre(1_700_000_100, SleepAction::SuspendThenHibernate)
            .with_sleep_action(SleepAction::Suspend)
    );
}

#[test]
fn state_log_line_with_empty_sleep_action() {
    let line = r#"{"ts":42,"action":"post","what":"suspend","sleep_action":""}"#;
    let entry: StateLogEntry = serde_json::from_str(line).unwrap();
    assert_eq!(entry, StateLogEntry::post(42, SleepAction::Suspend));
    assert_eq!(entry.sleep_action, None);
}

#[test]
fn state_log_line_without_sleep_action() {
    let line = r#"{"ts":7,"action":"pre","what":"shutdown"}"#;
    let entry: StateLogEntry = serde_json::from_str(line).unwrap();
    assert_eq!(entry, StateLogEntry::pre(7, SleepAction::Shutdown));
}

#[test]
fn state_log_rejects_malformed_lines() {
    assert!(serde_json::from_str::<StateLogEntry>(
        r#"{"ts":1,"action":"during","what":"suspend"}"#
    )
    .is_err());
    assert!(serde_json::from_str::<StateLogEntry>(r#"{"action":"pre","what":"suspend"}"#).is_err());
    assert!(serde_json::from_str::<StateLogEntry>("not json").is_err());
}

#[test]
fn state_log_keeps_unknown_sleep_verbs() {
    let line = r#"{"ts":5,"action":"pre","what":"suspend","sleep_action":"suspend-after-failed-hibernate"}"#;
    let entry: StateLogEntry = serde_json::from_str(line).unwrap();
    assert_eq!(
        entry.effective_action(),
        &SleepAction::Other("suspend-after-failed-hibernate".to_string())
    );

    let back = serde_json::to_value(&entry).unwrap();
    assert_eq!(back["sleep_action"], "suspend-after-failed-hibernate");
}

#[test]
fn power_state_event_is_flat_json() {
    let event = PowerStateEvent::new(
        100,
        170,
        PowerStateKind::SuspendThenHibernate {
            suspend_secs: 20,
            hibernate_secs: 45,
        },
    );
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "start_time": 100,
            "end_time": 170,
            "type": "suspend-then-hibernate",
            "suspend_secs": 20,
            "hibernate_secs": 45,
        })
    );

    let back: PowerStateEvent = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
}

#[test]
fn other_event_round_trips_with_its_verb() {
    let event = PowerStateEvent::new(
        10,
        40,
        PowerStateKind::Other {
            name: "suspend-after-failed-hibernate".to_string(),
            suspend_secs: 30,
        },
    );
    let value = serde_json::to_value(&event).unwrap();
    assert_eq!(
        value,
        json!({
            "start_time": 10,
            "end_time": 40,
            "type": "suspend-after-failed-hibernate",
            "suspend_secs": 30,
        })
    );

    let back: PowerStateEvent = serde_json::from_value(value).unwrap();
    assert_eq!(back, event);
}

#[test]
fn shutdown_event_has_no_phase_fields() {
    let event = PowerStateEvent::new(100, 500, PowerStateKind::Shutdown);
    let value = serde_json::to_value(event).unwrap();
    assert_eq!(
        value,
        json!({"start_time": 100, "end_time": 500, "type": "shutdown"})
    );
}

#[test]
fn calibration_result_reports_display_power() {
    let mut result = CalibrationResult::new(Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap());
    result.baseline_power_uw = 4_000_000;
    result.samples = vec![
        BrightnessSample {
            brightness_pct: 0,
            avg_power_uw: 4_000_000,
            avg_power_error_uw: 60_000,
            delta_charge_uah: 11_000,
            charge_quantization_uah: 1_000,
        },
        BrightnessSample {
            brightness_pct: 100,
            avg_power_uw: 6_500_000,
            avg_power_error_uw: 60_000,
            delta_charge_uah: 18_000,
            charge_quantization_uah: 1_000,
        },
    ];

    let full = result.sample_at(100).unwrap();
    assert_eq!(result.display_power_uw(full), 2_500_000);
    assert!(result.sample_at(50).is_none());
    assert_eq!(result.format_version, CALIBRATION_FORMAT_VERSION);

    let text = serde_json::to_string_pretty(&result).unwrap();
    let back: CalibrationResult = serde_json::from_str(&text).unwrap();
    assert_eq!(back, result);
    assert!(is_supported_calibration_version(back.format_version));
}

#[test]
fn legacy_calibration_file_is_flagged_unsupported() {
    let legacy = json!({
        "update_interval_ms": 3000,
        "update_interval_min_ms": 3000,
        "update_interval_max_ms": 3000,
        "latency_ms": 30000,
        "stale_cycles": 10,
        "baseline_power_uw": 4000000,
        "samples": [],
        "cpu_frequency_khz": 2100000,
        "calibrated_at": "2025-01-01T00:00:00Z",
    });
    let result: CalibrationResult = serde_json::from_value(legacy).unwrap();
    assert_eq!(result.format_version, 1);
    assert!(!is_supported_calibration_version(result.format_version));
}
