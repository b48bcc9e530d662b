//! Persistent storage for battery, backlight and power state history.
//!
//! Uses SQLite with WAL mode so `powermon history` can read while the
//! daemon writes.

use std::path::{Path, PathBuf};

use powermon_protocol::{
    BacklightSample, BatterySample, BatteryStatus, PowerStateEvent, PowerStateKind,
};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Errors that can occur during history storage operations
#[derive(Debug, thiserror::Error)]
pub enum HistoryStoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, HistoryStoreError>;

/// Rows removed by a retention cleanup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupCounts {
    pub battery_samples: usize,
    pub backlight_samples: usize,
    pub power_state_events: usize,
}

impl CleanupCounts {
    pub fn total(&self) -> usize {
        self.battery_samples + self.backlight_samples + self.power_state_events
    }
}

/// History storage backed by SQLite
pub struct HistoryStore {
    conn: Connection,
    path: PathBuf,
}

impl HistoryStore {
    /// Open or create the database at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             PRAGMA busy_timeout=5000;",
        )?;

        Self::with_connection(conn, path.to_path_buf())
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, PathBuf::from(":memory:"))
    }

    fn with_connection(conn: Connection, path: PathBuf) -> Result<Self> {
        let mut store = Self { conn, path };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the database file size in bytes
    pub fn size_bytes(&self) -> Result<u64> {
        if self.path.to_string_lossy() == ":memory:" {
            return Ok(0);
        }
        Ok(std::fs::metadata(&self.path)?.len())
    }

    fn initialize_schema(&mut self) -> Result<()> {
        if self.get_schema_version()? == 0 {
            self.create_initial_schema()?;
        }
        Ok(())
    }

    /// Get the current schema version (0 if not initialized)
    fn get_schema_version(&self) -> Result<i32> {
        let exists: bool = self.conn.query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )?;

        if !exists {
            return Ok(0);
        }

        let version: i32 = self
            .conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .optional()?
            .unwrap_or(0);

        Ok(version)
    }

    fn create_initial_schema(&mut self) -> Result<()> {
        let tx = self.conn.transaction()?;

        tx.execute_batch(
            r#"
            CREATE TABLE schema_version (
                version INTEGER NOT NULL
            );

            CREATE TABLE battery_samples (
                id INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                voltage_uv INTEGER NOT NULL,
                current_ua INTEGER NOT NULL,
                power_uw INTEGER NOT NULL,
                sysfs_power_uw INTEGER NOT NULL DEFAULT 0,
                power_from_charge_delta INTEGER NOT NULL DEFAULT 0,
                charge_now_uah INTEGER NOT NULL DEFAULT 0,
                capacity_pct INTEGER NOT NULL,
                status TEXT NOT NULL
            );

            CREATE TABLE backlight_samples (
                id INTEGER PRIMARY KEY,
                timestamp INTEGER NOT NULL,
                brightness INTEGER NOT NULL,
                max_brightness INTEGER NOT NULL
            );

            -- one row per transition; the hooks' start time identifies it
            CREATE TABLE power_state_events (
                id INTEGER PRIMARY KEY,
                start_time INTEGER NOT NULL UNIQUE,
                end_time INTEGER NOT NULL,
                type TEXT NOT NULL,
                suspend_secs INTEGER NOT NULL DEFAULT 0,
                hibernate_secs INTEGER NOT NULL DEFAULT 0
            );

            CREATE INDEX idx_battery_ts ON battery_samples(timestamp);
            CREATE INDEX idx_backlight_ts ON backlight_samples(timestamp);
            CREATE INDEX idx_power_state_end ON power_state_events(end_time);
            "#,
        )?;

        tx.execute(
            "INSERT INTO schema_version (version) VALUES (?)",
            [CURRENT_SCHEMA_VERSION],
        )?;

        tx.commit()?;
        Ok(())
    }

    pub fn insert_battery_sample(&self, sample: &BatterySample) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO battery_samples (timestamp, voltage_uv, current_ua, power_uw, sysfs_power_uw,
                                          power_from_charge_delta, charge_now_uah, capacity_pct, status)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                sample.timestamp,
                sample.voltage_uv,
                sample.current_ua,
                sample.power_uw,
                sample.sysfs_power_uw,
                sample.power_from_charge_delta,
                sample.charge_now_uah,
                sample.capacity_pct,
                sample.status.as_str(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn insert_backlight_sample(&self, sample: &BacklightSample) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO backlight_samples (timestamp, brightness, max_brightness) VALUES (?, ?, ?)",
            params![sample.timestamp, sample.brightness, sample.max_brightness],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Stores `event` unless one with the same start time already exists.
    /// Returns whether a row was added.
    pub fn insert_power_state_event(&self, event: &PowerStateEvent) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO power_state_events (start_time, end_time, type, suspend_secs, hibernate_secs)
             VALUES (?, ?, ?, ?, ?)",
            params![
                event.start_time,
                event.end_time,
                event.kind.type_name(),
                event.suspend_secs(),
                event.hibernate_secs(),
            ],
        )?;
        Ok(inserted > 0)
    }

    /// Battery samples with `from <= timestamp <= to`, oldest first.
    pub fn battery_samples(&self, from: i64, to: i64) -> Result<Vec<BatterySample>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, voltage_uv, current_ua, power_uw, sysfs_power_uw,
                    power_from_charge_delta, charge_now_uah, capacity_pct, status
             FROM battery_samples
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC",
        )?;

        let samples = stmt
            .query_map(params![from, to], battery_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    pub fn latest_battery_sample(&self) -> Result<Option<BatterySample>> {
        let sample = self
            .conn
            .query_row(
                "SELECT timestamp, voltage_uv, current_ua, power_uw, sysfs_power_uw,
                        power_from_charge_delta, charge_now_uah, capacity_pct, status
                 FROM battery_samples ORDER BY timestamp DESC LIMIT 1",
                [],
                battery_from_row,
            )
            .optional()?;
        Ok(sample)
    }

    pub fn backlight_samples(&self, from: i64, to: i64) -> Result<Vec<BacklightSample>> {
        let mut stmt = self.conn.prepare(
            "SELECT timestamp, brightness, max_brightness
             FROM backlight_samples
             WHERE timestamp >= ? AND timestamp <= ?
             ORDER BY timestamp ASC",
        )?;

        let samples = stmt
            .query_map(params![from, to], |row| {
                Ok(BacklightSample {
                    timestamp: row.get(0)?,
                    brightness: row.get(1)?,
                    max_brightness: row.get(2)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(samples)
    }

    /// Events overlapping `[from, to]`, oldest first.
    pub fn power_state_events(&self, from: i64, to: i64) -> Result<Vec<PowerStateEvent>> {
        let mut stmt = self.conn.prepare(
            "SELECT start_time, end_time, type, suspend_secs, hibernate_secs
             FROM power_state_events
             WHERE end_time >= ? AND start_time <= ?
             ORDER BY start_time ASC",
        )?;

        let events = stmt
            .query_map(params![from, to], |row| {
                let type_name: String = row.get(2)?;
                let kind = PowerStateKind::from_parts(&type_name, row.get(3)?, row.get(4)?);
                Ok(PowerStateEvent::new(row.get(0)?, row.get(1)?, kind))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(events)
    }

    /// Deletes everything recorded before `before` (unix seconds) in a single
    /// transaction.
    pub fn delete_older_than(&mut self, before: i64) -> Result<CleanupCounts> {
        let tx = self.conn.transaction()?;
        let counts = CleanupCounts {
            battery_samples: tx
                .execute("DELETE FROM battery_samples WHERE timestamp < ?", [before])?,
            backlight_samples: tx
                .execute("DELETE FROM backlight_samples WHERE timestamp < ?", [before])?,
            power_state_events: tx
                .execute("DELETE FROM power_state_events WHERE start_time < ?", [before])?,
        };
        tx.commit()?;
        Ok(counts)
    }

    /// Get database statistics
    pub fn get_stats(&self) -> Result<DatabaseStats> {
        let count = |table: &str| -> Result<i64> {
            Ok(self
                .conn
                .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
                    row.get(0)
                })?)
        };

        let (oldest_sample, newest_sample): (Option<i64>, Option<i64>) = self.conn.query_row(
            "SELECT MIN(timestamp), MAX(timestamp) FROM battery_samples",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(DatabaseStats {
            battery_samples: count("battery_samples")?,
            backlight_samples: count("backlight_samples")?,
            power_state_events: count("power_state_events")?,
            oldest_sample,
            newest_sample,
            size_bytes: self.size_bytes()?,
        })
    }
}

fn battery_from_row(row: &Row<'_>) -> rusqlite::Result<BatterySample> {
    let status: String = row.get(8)?;
    Ok(BatterySample {
        timestamp: row.get(0)?,
        voltage_uv: row.get(1)?,
        current_ua: row.get(2)?,
        power_uw: row.get(3)?,
        sysfs_power_uw: row.get(4)?,
        power_from_charge_delta: row.get(5)?,
        charge_now_uah: row.get(6)?,
        capacity_pct: row.get(7)?,
        status: status.parse().unwrap_or(BatteryStatus::Unknown),
    })
}

/// Deletes the database and its WAL/SHM companions. Missing files are not an
/// error. Returns the paths that were removed.
pub fn remove_database(path: &Path) -> Result<Vec<PathBuf>> {
    let mut removed = Vec::new();
    for suffix in ["", "-wal", "-shm"] {
        let mut name = path.as_os_str().to_owned();
        name.push(suffix);
        let file = PathBuf::from(name);
        match std::fs::remove_file(&file) {
            Ok(()) => removed.push(file),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(removed)
}

/// Database statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseStats {
    pub battery_samples: i64,
    pub backlight_samples: i64,
    pub power_state_events: i64,
    pub oldest_sample: Option<i64>,
    pub newest_sample: Option<i64>,
    pub size_bytes: u64,
}

impl DatabaseStats {
    /// Format size as human-readable string
    pub fn size_formatted(&self) -> String {
        let bytes = self.size_bytes as f64;
        if bytes < 1024.0 {
            format!("{} B", self.size_bytes)
        } else if bytes < 1024.0 * 1024.0 {
            format!("{:.1} KB", bytes / 1024.0)
        } else if bytes < 1024.0 * 1024.0 * 1024.0 {
            format!("{:.1} MB", bytes / (1024.0 * 1024.0))
        } else {
            format!("{:.2} GB", bytes / (1024.0 * 1024.0 * 1024.0))
        }
    }
}
