use std::time::Duration;

use chrono::Utc;
use powermon_platform::linux::{SysfsBatterySampler, SysfsRoot};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::config::UserConfig;
use crate::data::history_store::remove_database;
use crate::data::{HistoryStore, Recorder};

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] crate::data::HistoryStoreError),
}

pub type Result<T> = std::result::Result<T, DaemonError>;

/// Runs the collection loop in the foreground until Ctrl-C or SIGTERM.
///
/// With `reset_db` the database files are deleted and the function returns
/// without collecting.
pub fn run_daemon(config: &UserConfig, reset_db: bool) -> Result<()> {
    let db_path = &config.storage.db_path;

    if reset_db {
        let removed = remove_database(db_path)?;
        info!(path = %db_path.display(), files = removed.len(), "Database deleted");
        return Ok(());
    }

    info!(version = env!("CARGO_PKG_VERSION"), "Daemon starting");

    let store = HistoryStore::open(db_path)?;
    let sampler = SysfsBatterySampler::new(
        SysfsRoot::default(),
        config.collection.power_average_seconds,
    );
    let recorder = Recorder::new(store, sampler, SysfsRoot::default(), config);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(run_daemon_async(recorder, config))
}

async fn run_daemon_async(
    mut recorder: Recorder<SysfsBatterySampler>,
    config: &UserConfig,
) -> Result<()> {
    let now = Utc::now().timestamp();
    recorder.cleanup(now)?;
    recorder.import_state_log(now)?;

    let collect_interval = Duration::from_secs(config.collection.interval_seconds);
    let cleanup_interval = Duration::from_secs(config.cleanup.interval_hours * 3600);
    let jump_threshold = config.collection.wall_clock_jump_threshold_seconds as i64;

    let mut collect_tick = tokio::time::interval(collect_interval);
    let mut cleanup_tick = tokio::time::interval(cleanup_interval);
    collect_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    cleanup_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Startup already ran cleanup.
    cleanup_tick.tick().await;

    let mut sigterm = signal(SignalKind::terminate())?;

    info!(
        interval_secs = config.collection.interval_seconds,
        window_secs = config.collection.power_average_seconds,
        "Collecting"
    );

    // Wall clock, not Instant: the monotonic clock stops during suspend.
    let mut last_tick = Utc::now().timestamp();

    loop {
        tokio::select! {
            _ = collect_tick.tick() => {
                let now = Utc::now().timestamp();
                if wall_clock_jumped(last_tick, now, jump_threshold) {
                    info!(
                        target: "powermon::sleep",
                        gap_secs = now - last_tick,
                        "Wall-clock jump detected, re-reading state log"
                    );
                    if let Err(e) = recorder.import_state_log(now) {
                        error!(error = %e, "Error importing state log");
                    }
                }
                last_tick = now;

                match recorder.record_tick() {
                    Ok(outcome) => {
                        if let Some(sample) = &outcome.battery {
                            info!(
                                target: "powermon::battery",
                                capacity_pct = sample.capacity_pct,
                                status = sample.status.as_str(),
                                power_uw = sample.power_uw,
                                "Sample"
                            );
                        }
                        if let Some(sample) = &outcome.backlight {
                            debug!(
                                target: "powermon::backlight",
                                brightness = sample.brightness,
                                max_brightness = sample.max_brightness,
                                "Sample"
                            );
                        }
                    }
                    Err(e) => error!(error = %e, "Error storing samples"),
                }
            }
            _ = cleanup_tick.tick() => {
                if let Err(e) = recorder.cleanup(Utc::now().timestamp()) {
                    error!(error = %e, "Error pruning old records");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
                break;
            }
        }
    }

    info!("Daemon shutting down");
    Ok(())
}

fn wall_clock_jumped(last_tick: i64, now: i64, threshold_secs: i64) -> bool {
    now - last_tick > threshold_secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wall_clock_jump() {
        assert!(!wall_clock_jumped(100, 105, 15));
        assert!(!wall_clock_jumped(100, 115, 15));
        assert!(wall_clock_jumped(100, 116, 15));
        // Clock set backwards is not a sleep.
        assert!(!wall_clock_jumped(100, 50, 15));
    }

    #[test]
    fn test_reset_db_removes_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = UserConfig::default();
        config.storage.db_path = dir.path().join("data.db");
        HistoryStore::open(&config.storage.db_path).unwrap();
        assert!(config.storage.db_path.exists());

        run_daemon(&config, true).unwrap();
        assert!(!config.storage.db_path.exists());
    }
}
