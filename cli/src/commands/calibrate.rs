use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use color_eyre::eyre::{bail, Result, WrapErr};
use powermon_platform::linux::{cpu_frequency_khz, Backlight, CpuPin, SysfsBatterySampler, SysfsRoot};
use powermon_protocol::{BrightnessSample, CalibrationResult};
use tracing::{info, warn};

use crate::calibration::{Calibrator, Clock, Stimulus, SystemClock};
use crate::config::{config_dir, CalibrationConfig};

/// Averaging window of the sampler the engine polls.
const SAMPLER_WINDOW_SECS: u64 = 30;
const OUTPUT_FILE: &str = "calibration.json";

pub fn run(config: &CalibrationConfig, yes: bool, output: Option<PathBuf>) -> Result<()> {
    // SAFETY: geteuid has no preconditions and cannot fail.
    if unsafe { libc::geteuid() } != 0 {
        bail!("calibrate must be run as root (needed for CPU frequency and backlight control)");
    }

    print_instructions();
    if !yes && !confirm()? {
        println!("Cancelled.");
        return Ok(());
    }

    let root = SysfsRoot::default();
    let mut backlight = Backlight::find(&root).wrap_err("no backlight to calibrate")?;
    let _restore = BrightnessRestore::capture(&backlight)?;

    println!("[1/5] Locking CPU frequency and disabling turbo boost...");
    let cpu_pin = CpuPin::engage(&root).wrap_err("failed to pin CPU frequency")?;
    let cpu_frequency = cpu_frequency_khz(&root)?;
    println!("       CPU locked to {} kHz", cpu_frequency);

    let mut calibrator = Calibrator::new(
        SysfsBatterySampler::new(root.clone(), SAMPLER_WINDOW_SECS),
        SystemClock::new(),
    );

    let initial_settle = Duration::from_secs(config.initial_settle_secs);
    println!("       Setting brightness to 0% and waiting for battery averaging to flush...");
    backlight.set_level(0)?;
    println!(
        "       This takes {}. Do not touch the laptop.",
        humantime::format_duration(initial_settle)
    );
    calibrator.clock().sleep(initial_settle);
    println!();

    println!("[2/5] Measuring battery firmware update interval...");
    let interval = calibrator
        .measure_update_interval()
        .wrap_err("could not measure update interval")?;
    println!(
        "       Update interval: median={}  min={}  max={}  ({} samples)",
        fmt_ms(interval.median),
        fmt_ms(interval.min),
        fmt_ms(interval.max),
        interval.intervals.len()
    );
    println!();

    println!("[3/5] Measuring battery controller latency...");
    println!("       Stabilizing at 0%, then stepping to 100%...");
    let latency = calibrator
        .measure_latency(&mut backlight, interval.median)
        .wrap_err("could not measure latency")?;
    println!(
        "       Latency: {} ({} update cycles until settled)",
        fmt_ms(latency.elapsed),
        latency.cycles
    );
    println!();

    let settle = latency
        .elapsed
        .max(Duration::from_secs(config.min_settle_secs));
    let window = Duration::from_secs(config.window_secs);
    let poll = Duration::from_millis(config.poll_ms);

    println!(
        "[4/5] Measuring power at {} brightness levels (settle {} + sample {} each)...",
        config.levels.len(),
        humantime::format_duration(settle),
        humantime::format_duration(window)
    );
    let mut samples = Vec::with_capacity(config.levels.len());
    for (i, &pct) in config.levels.iter().enumerate() {
        print!(
            "       Level {}/{}: brightness {}%",
            i + 1,
            config.levels.len(),
            pct
        );
        std::io::stdout().flush()?;
        backlight.set_level(pct)?;
        calibrator.clock().sleep(settle);

        let m = calibrator
            .measure_power_over_window(window, poll)
            .wrap_err_with(|| format!("failed to measure power at {}%", pct))?;
        println!(
            " -> {:.2} W ± {:.3} W",
            m.power_uw as f64 / 1e6,
            m.error_uw as f64 / 1e6
        );

        samples.push(BrightnessSample {
            brightness_pct: pct,
            avg_power_uw: m.power_uw,
            avg_power_error_uw: m.error_uw,
            delta_charge_uah: m.delta_charge_uah,
            charge_quantization_uah: m.quantization_uah,
        });
    }
    println!();
    cpu_pin.release();

    let mut result = CalibrationResult::new(Utc::now());
    result.update_interval_ms = interval.median.as_millis() as i64;
    result.update_interval_min_ms = interval.min.as_millis() as i64;
    result.update_interval_max_ms = interval.max.as_millis() as i64;
    result.latency_ms = latency.elapsed.as_millis() as i64;
    result.stale_cycles = latency.cycles;
    result.baseline_power_uw = baseline_power(&samples);
    result.samples = samples;
    result.cpu_frequency_khz = cpu_frequency;

    let path = output.unwrap_or_else(default_output_path);
    write_result(&result, &path)?;

    println!("[5/5] Calibration complete! Results written to:");
    println!("       {}", path.display());
    println!();
    print_summary(&result);

    Ok(())
}

/// Puts the backlight back where the user had it, however the run ends.
struct BrightnessRestore {
    backlight: Backlight,
    percent: u8,
}

impl BrightnessRestore {
    fn capture(backlight: &Backlight) -> Result<Self> {
        Ok(Self {
            backlight: backlight.clone(),
            percent: backlight.percent()?,
        })
    }
}

impl Drop for BrightnessRestore {
    fn drop(&mut self) {
        println!("Restoring brightness to {}%", self.percent);
        if let Err(e) = self.backlight.set_percent(self.percent) {
            warn!(target: "powermon::backlight", error = %e, "Failed to restore brightness");
        }
    }
}

/// Power at the lowest measured brightness.
fn baseline_power(samples: &[BrightnessSample]) -> i64 {
    samples
        .iter()
        .min_by_key(|s| s.brightness_pct)
        .map_or(0, |s| s.avg_power_uw)
}

/// The invoking user's config dir, even under sudo.
fn default_output_path() -> PathBuf {
    match std::env::var("SUDO_USER") {
        Ok(user) if !user.is_empty() => sudo_user_output_path(&user),
        _ => config_dir().join(OUTPUT_FILE),
    }
}

fn sudo_user_output_path(user: &str) -> PathBuf {
    Path::new("/home")
        .join(user)
        .join(".config")
        .join("powermon")
        .join(OUTPUT_FILE)
}

fn write_result(result: &CalibrationResult, path: &Path) -> Result<()> {
    let dir = path.parent().filter(|d| !d.as_os_str().is_empty());
    if let Some(dir) = dir {
        std::fs::create_dir_all(dir)
            .wrap_err_with(|| format!("failed to create {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(result)?;
    std::fs::write(path, json).wrap_err_with(|| format!("failed to write {}", path.display()))?;

    // Hand the file back to the user who ran sudo.
    if let Some((uid, gid)) = sudo_owner() {
        for target in dir.into_iter().chain([path]) {
            if let Err(e) = std::os::unix::fs::chown(target, Some(uid), Some(gid)) {
                warn!(path = %target.display(), error = %e, "Failed to chown calibration output");
            }
        }
    }
    info!(target: "powermon::calibration", path = %path.display(), "Wrote calibration result");
    Ok(())
}

fn sudo_owner() -> Option<(u32, u32)> {
    let uid = std::env::var("SUDO_UID").ok()?.parse().ok()?;
    let gid = std::env::var("SUDO_GID").ok()?.parse().ok()?;
    Some((uid, gid))
}

fn fmt_ms(d: Duration) -> String {
    humantime::format_duration(Duration::from_millis(d.as_millis() as u64)).to_string()
}

fn print_instructions() {
    println!("=== powermon display calibration ===");
    println!();
    println!("This measures your display's power consumption at several brightness levels.");
    println!("The battery controller averages internally, so any change to the system takes");
    println!("1-2 minutes to fully show up in its readings.");
    println!();
    println!("Before continuing, please:");
    println!("  1. Close all unnecessary programs");
    println!("  2. Turn off WiFi and Bluetooth");
    println!("  3. Unplug external devices (USB, monitors, ...)");
    println!("  4. Run on battery (unplug the AC adapter)");
    println!("  5. Wait about a minute after making these changes");
    println!();
    println!("Do not touch the laptop once calibration starts.");
    println!();
}

fn confirm() -> Result<bool> {
    print!("Proceed? [y/N] ");
    std::io::stdout().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn print_summary(result: &CalibrationResult) {
    println!("Summary:");
    println!(
        "  Update interval:  {} ms (min={} ms, max={} ms)",
        result.update_interval_ms, result.update_interval_min_ms, result.update_interval_max_ms
    );
    println!(
        "  Controller lag:   {} ms ({} cycles)",
        result.latency_ms, result.stale_cycles
    );
    println!(
        "  Baseline power:   {:.2} W",
        result.baseline_power_uw as f64 / 1e6
    );
    for s in &result.samples {
        println!(
            "  Brightness {:>3}%:  {:.2} W total ({:.2} W display) ± {:.3} W",
            s.brightness_pct,
            s.avg_power_uw as f64 / 1e6,
            result.display_power_uw(s) as f64 / 1e6,
            s.avg_power_error_uw as f64 / 1e6
        );
    }
}
