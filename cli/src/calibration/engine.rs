use std::time::Duration;

use powermon_platform::BatterySampler;
use tracing::{debug, info};

use super::clock::Clock;
use super::stats::{self, mean, std_dev};
use super::{CalibrationError, Result, Stimulus};

const FAST_POLL: Duration = Duration::from_millis(10);

const UPDATE_INTERVAL_LIMIT: Duration = Duration::from_secs(30);
const UPDATE_INTERVAL_STOP_AFTER: usize = 6;
const UPDATE_INTERVAL_MIN_TRANSITIONS: usize = 3;

const STABLE_WINDOW: usize = 20;
const STABLE_LIMIT: Duration = Duration::from_secs(120);
const STABLE_MAX_SLOPE_SIGMAS: f64 = 1.0;
const STABLE_MAX_CV: f64 = 0.02;

const LATENCY_MAX_CYCLES: u32 = 120;
const LATENCY_WINDOW: usize = 5;
const LATENCY_LOW_PCT: u8 = 0;
const LATENCY_HIGH_PCT: u8 = 100;

/// Boundary waits give up after this many windows.
const BOUNDARY_TIMEOUT_WINDOWS: u32 = 10;
/// Used when no charge step size could be observed.
const FALLBACK_QUANTIZATION_UAH: i64 = 1000;
/// µAh · µV / ns → µW.
const UAH_UV_PER_NS_TO_UW: i128 = 3_600_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateIntervalStats {
    pub median: Duration,
    pub min: Duration,
    pub max: Duration,
    pub intervals: Vec<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Latency {
    /// Time from the step to the first settled reading.
    pub elapsed: Duration,
    /// Update cycles until the reading settled.
    pub cycles: u32,
    /// First cycle whose reading cleared the baseline + 3σ threshold.
    pub detected_cycle: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PowerMeasurement {
    pub power_uw: i64,
    pub error_uw: i64,
    pub delta_charge_uah: i64,
    pub quantization_uah: i64,
    pub avg_voltage_uv: i64,
    /// Time between the two charge boundaries.
    pub elapsed: Duration,
}

/// Runs the measurement phases against one sampler.
///
/// Every phase is a blocking poll loop bounded by a timeout. Nothing is
/// retried: a failed read or timeout ends the phase with an error.
pub struct Calibrator<S, C> {
    sampler: S,
    clock: C,
}

impl<S: BatterySampler, C: Clock> Calibrator<S, C> {
    pub fn new(sampler: S, clock: C) -> Self {
        Self { sampler, clock }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// The firmware's instantaneous power register. The sampler's windowed
    /// average would add its own lag on top of the controller's.
    fn read_power(&mut self) -> Result<i64> {
        Ok(self.sampler.collect()?.sysfs_power_uw)
    }

    /// Sleeps until `deadline` (relative to the clock origin), if it is
    /// still ahead.
    fn sleep_until(&self, deadline: Duration) {
        let now = self.clock.now();
        if deadline > now {
            self.clock.sleep(deadline - now);
        }
    }

    /// Finds how often the firmware refreshes the power reading by timing
    /// value changes under a fast poll.
    pub fn measure_update_interval(&mut self) -> Result<UpdateIntervalStats> {
        let deadline = self.clock.now() + UPDATE_INTERVAL_LIMIT;
        let mut last = self.read_power()?;
        let mut transitions = Vec::new();

        while self.clock.now() < deadline {
            self.clock.sleep(FAST_POLL);
            let power = self.read_power()?;
            if power != last {
                transitions.push(self.clock.now());
                last = power;
                if transitions.len() >= UPDATE_INTERVAL_STOP_AFTER {
                    break;
                }
            }
        }

        if transitions.len() < UPDATE_INTERVAL_MIN_TRANSITIONS {
            return Err(CalibrationError::InsufficientSamples {
                found: transitions.len(),
                needed: UPDATE_INTERVAL_MIN_TRANSITIONS,
            });
        }

        let intervals: Vec<Duration> = transitions.windows(2).map(|w| w[1] - w[0]).collect();
        let (Some(median), Some(&min), Some(&max)) = (
            stats::median(&intervals),
            intervals.iter().min(),
            intervals.iter().max(),
        ) else {
            return Err(CalibrationError::InsufficientSamples {
                found: transitions.len(),
                needed: UPDATE_INTERVAL_MIN_TRANSITIONS,
            });
        };

        info!(
            target: "powermon::calibration",
            median_ms = median.as_millis() as u64,
            min_ms = min.as_millis() as u64,
            max_ms = max.as_millis() as u64,
            samples = intervals.len(),
            "Measured update interval"
        );
        Ok(UpdateIntervalStats {
            median,
            min,
            max,
            intervals,
        })
    }

    /// Samples once per `update_interval` until the step-response transient
    /// has died out, returning the last window of readings.
    ///
    /// Background drift from ongoing discharge is expected to continue; the
    /// window counts as settled when the slope across its older half matches
    /// the slope across its newer half to within one standard deviation and
    /// the noise is low.
    pub fn wait_for_stable(&mut self, update_interval: Duration) -> Result<Vec<i64>> {
        if update_interval.is_zero() {
            return Err(CalibrationError::InvalidArgument("update interval must be non-zero"));
        }

        let start = self.clock.now();
        let deadline = start + STABLE_LIMIT;
        let mut readings = Vec::new();

        while self.clock.now() < deadline {
            readings.push(self.read_power()?);

            if readings.len() >= STABLE_WINDOW {
                let window = &readings[readings.len() - STABLE_WINDOW..];
                if let Some(verdict) = stability(window) {
                    debug!(
                        target: "powermon::calibration",
                        n = readings.len(),
                        avg_uw = verdict.mean as i64,
                        sd_uw = verdict.std_dev as i64,
                        older_slope = verdict.older_slope as i64,
                        newer_slope = verdict.newer_slope as i64,
                        slope_diff_sigmas = verdict.slope_diff_sigmas,
                        "Stabilizing"
                    );
                    if verdict.is_stable() {
                        info!(
                            target: "powermon::calibration",
                            samples = readings.len(),
                            "Readings settled"
                        );
                        return Ok(window.to_vec());
                    }
                }
            }

            self.clock.sleep(update_interval);
        }

        Err(CalibrationError::Timeout {
            phase: "stabilize",
            waited: self.clock.now() - start,
        })
    }

    /// Measures how long a step in `stimulus` takes to fully show up in the
    /// power reading.
    ///
    /// Establishes a stable baseline at low level, synchronizes to an update
    /// boundary, steps to high level and then checks one reading per update
    /// cycle until a short rolling window is as quiet as the baseline.
    pub fn measure_latency<T: Stimulus>(
        &mut self,
        stimulus: &mut T,
        update_interval: Duration,
    ) -> Result<Latency> {
        if update_interval.is_zero() {
            return Err(CalibrationError::InvalidArgument("update interval must be non-zero"));
        }

        stimulus.set_level(LATENCY_LOW_PCT)?;
        let baseline = self.wait_for_stable(update_interval)?;
        let baseline_mean = mean(&baseline);
        if baseline_mean <= 0.0 {
            return Err(CalibrationError::ZeroBaseline);
        }
        let baseline_sd = std_dev(&baseline);
        let threshold = baseline_mean + 3.0 * baseline_sd;
        info!(
            target: "powermon::calibration",
            baseline_uw = baseline_mean as i64,
            sd_uw = baseline_sd as i64,
            threshold_uw = threshold as i64,
            "Latency baseline"
        );

        // Step right after a fresh update so the first cycle is a full one.
        let last = self.read_power()?;
        let sync_deadline = self.clock.now() + update_interval * 2;
        while self.clock.now() < sync_deadline {
            if self.read_power()? != last {
                break;
            }
            self.clock.sleep(FAST_POLL);
        }

        let change_time = self.clock.now();
        stimulus.set_level(LATENCY_HIGH_PCT)?;

        let poll_offset = update_interval / 5;
        let mut readings = Vec::new();
        let mut detected_cycle = None;

        for cycle in 1..=LATENCY_MAX_CYCLES {
            self.sleep_until(change_time + update_interval * cycle + poll_offset);

            let power = self.read_power()?;
            let elapsed = self.clock.now() - change_time;
            readings.push(power);
            if detected_cycle.is_none() && power as f64 > threshold {
                detected_cycle = Some(cycle);
            }

            if readings.len() < LATENCY_WINDOW {
                debug!(
                    target: "powermon::calibration",
                    cycle,
                    power_uw = power,
                    "Collecting latency window"
                );
                continue;
            }

            let window = &readings[readings.len() - LATENCY_WINDOW..];
            let window_sd = std_dev(window);
            let settled = window_sd <= 2.0 * baseline_sd;
            debug!(
                target: "powermon::calibration",
                cycle,
                elapsed_ms = elapsed.as_millis() as u64,
                power_uw = power,
                window_avg_uw = mean(window) as i64,
                window_sd_uw = window_sd as i64,
                settled,
                "Latency cycle"
            );

            if settled {
                info!(
                    target: "powermon::calibration",
                    cycle,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Latency settled"
                );
                return Ok(Latency {
                    elapsed,
                    cycles: cycle,
                    detected_cycle,
                });
            }
        }

        Err(CalibrationError::DidNotSettle {
            cycles: LATENCY_MAX_CYCLES,
        })
    }

    /// Average power over roughly `window`, aligned to the charge register's
    /// own quantization steps.
    ///
    /// The measurement starts at the first visible charge step and ends at the
    /// first step after `window` has elapsed, so both boundaries sit on a
    /// register update. The error bound is one quantization step spread over
    /// the elapsed time.
    pub fn measure_power_over_window(
        &mut self,
        window: Duration,
        poll: Duration,
    ) -> Result<PowerMeasurement> {
        if window.is_zero() {
            return Err(CalibrationError::InvalidArgument("window must be non-zero"));
        }
        if poll.is_zero() {
            return Err(CalibrationError::InvalidArgument("poll interval must be non-zero"));
        }
        let boundary_timeout = window * BOUNDARY_TIMEOUT_WINDOWS;
        let mut voltage = VoltageAverage::default();

        // Start boundary.
        let initial = self.sampler.collect()?.charge_now_uah;
        let wait_start = self.clock.now();
        let (start_time, start_charge) = loop {
            if self.clock.now() - wait_start >= boundary_timeout {
                return Err(CalibrationError::NoChargeChange {
                    waited: boundary_timeout,
                });
            }
            self.clock.sleep(poll);
            let sample = self.sampler.collect()?;
            if sample.charge_now_uah != initial {
                voltage.add(sample.voltage_uv);
                break (self.clock.now(), sample.charge_now_uah);
            }
        };
        let mut quantization = Some((start_charge - initial).abs());
        debug!(
            target: "powermon::calibration",
            charge_uah = start_charge,
            step_uah = (start_charge - initial).abs(),
            "Start boundary"
        );

        // Measurement window.
        let mut last_charge = start_charge;
        let mut note_step = |charge: i64, last: &mut i64| {
            let step = (charge - *last).abs();
            if step > 0 {
                quantization = Some(quantization.map_or(step, |q| q.min(step)));
                *last = charge;
            }
        };
        while self.clock.now() - start_time < window {
            self.clock.sleep(poll);
            let sample = self.sampler.collect()?;
            voltage.add(sample.voltage_uv);
            note_step(sample.charge_now_uah, &mut last_charge);
        }

        // End boundary.
        let window_charge = last_charge;
        let wait_end = self.clock.now();
        let (end_time, end_charge) = loop {
            if self.clock.now() - wait_end >= boundary_timeout {
                return Err(CalibrationError::Timeout {
                    phase: "end boundary",
                    waited: boundary_timeout,
                });
            }
            self.clock.sleep(poll);
            let sample = self.sampler.collect()?;
            if sample.charge_now_uah != window_charge {
                note_step(sample.charge_now_uah, &mut last_charge);
                break (self.clock.now(), sample.charge_now_uah);
            }
        };

        let delta_charge = (start_charge - end_charge).abs();
        if delta_charge == 0 {
            return Err(CalibrationError::NoChargeChange {
                waited: end_time - start_time,
            });
        }
        let avg_voltage = voltage.mean().ok_or(CalibrationError::NoVoltage)?;
        let elapsed = end_time - start_time;
        let elapsed_ns = elapsed.as_nanos() as i128;
        let quantization = quantization
            .filter(|&q| q > 0)
            .unwrap_or(FALLBACK_QUANTIZATION_UAH);

        let to_power = |charge: i64| -> i64 {
            let uw = i128::from(charge) * i128::from(avg_voltage) * UAH_UV_PER_NS_TO_UW / elapsed_ns;
            i64::try_from(uw).unwrap_or(i64::MAX)
        };
        let measurement = PowerMeasurement {
            power_uw: to_power(delta_charge),
            error_uw: to_power(quantization),
            delta_charge_uah: delta_charge,
            quantization_uah: quantization,
            avg_voltage_uv: avg_voltage,
            elapsed,
        };

        info!(
            target: "powermon::calibration",
            power_uw = measurement.power_uw,
            error_uw = measurement.error_uw,
            delta_charge_uah = delta_charge,
            quantization_uah = quantization,
            elapsed_ms = elapsed.as_millis() as u64,
            "Measured power"
        );
        Ok(measurement)
    }
}

#[derive(Debug, Default)]
struct VoltageAverage {
    sum: i128,
    count: i128,
}

impl VoltageAverage {
    fn add(&mut self, voltage_uv: i64) {
        if voltage_uv > 0 {
            self.sum += i128::from(voltage_uv);
            self.count += 1;
        }
    }

    fn mean(&self) -> Option<i64> {
        if self.count == 0 {
            return None;
        }
        i64::try_from(self.sum / self.count).ok()
    }
}

#[derive(Debug, Clone, Copy)]
struct Stability {
    mean: f64,
    std_dev: f64,
    older_slope: f64,
    newer_slope: f64,
    slope_diff_sigmas: f64,
}

impl Stability {
    fn is_stable(&self) -> bool {
        self.mean > 0.0
            && self.slope_diff_sigmas < STABLE_MAX_SLOPE_SIGMAS
            && self.std_dev / self.mean < STABLE_MAX_CV
    }
}

/// Quarter-slope comparison over one window. `None` if the window is too
/// short to split into quarters.
fn stability(window: &[i64]) -> Option<Stability> {
    let q = window.len() / 4;
    if q == 0 {
        return None;
    }
    let q1 = mean(&window[..q]);
    let q2 = mean(&window[q..2 * q]);
    let q3 = mean(&window[2 * q..3 * q]);
    let q4 = mean(&window[3 * q..]);

    let sd = std_dev(window);
    let older_slope = q2 - q1;
    let newer_slope = q4 - q3;
    let slope_diff = (older_slope - newer_slope).abs();
    let slope_diff_sigmas = if sd > 0.0 { slope_diff / sd } else { 0.0 };

    Some(Stability {
        mean: mean(window),
        std_dev: sd,
        older_slope,
        newer_slope,
        slope_diff_sigmas,
    })
}
