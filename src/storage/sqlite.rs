//! SQLite Reading Store
//!
//! One row per reading in `sensor_data`, timestamps stored as Unix
//! milliseconds. Capture time is indexed for range queries.
//!
//! rusqlite connections are blocking, so every call runs under
//! `spawn_blocking` with the connection behind a mutex.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::reading::{Reading, StoredReading};
use crate::storage::error::{StoreError, StoreResult};
use crate::storage::store::ReadingStore;
use crate::storage::types::{ReadingSummary, TimeRange};

const SELECT_COLUMNS: &str = "id, created_at, updated_at, timestamp, temperature, humidity, \
     pressure, altitude, co2, distance, wind_speed, wind_direction, rainfall, voltage, \
     bus_voltage, current";

/// SQLite-backed reading store
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Create or open a store at `path`
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directory if needed
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            ",
        )?;

        Self::init_schema(&conn)?;
        tracing::info!(path = ?path, "Reading store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Create a store that lives only in memory
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    fn init_schema(conn: &Connection) -> StoreResult<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sensor_data (
                id             INTEGER PRIMARY KEY AUTOINCREMENT,
                created_at     INTEGER NOT NULL,
                updated_at     INTEGER NOT NULL,
                timestamp      INTEGER NOT NULL,
                temperature    REAL NOT NULL,
                humidity       REAL NOT NULL,
                pressure       REAL NOT NULL,
                altitude       REAL NOT NULL,
                co2            REAL NOT NULL,
                distance       REAL NOT NULL,
                wind_speed     REAL NOT NULL,
                wind_direction REAL NOT NULL,
                rainfall       REAL NOT NULL,
                voltage        REAL NOT NULL,
                bus_voltage    REAL NOT NULL,
                current        REAL NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sensor_data_timestamp ON sensor_data(timestamp);
            ",
        )?;
        Ok(())
    }

    /// Database file path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run a closure against the connection on the blocking pool
    async fn with_conn<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&mut Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn
                .lock()
                .map_err(|e| StoreError::Lock(e.to_string()))?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(format!("store task failed: {}", e)))?
    }

    /// Readings captured within `range`, newest first
    pub async fn list(&self, range: TimeRange, limit: usize) -> StoreResult<Vec<StoredReading>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {} FROM sensor_data
                 WHERE timestamp >= ?1 AND timestamp < ?2
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3",
                SELECT_COLUMNS
            ))?;

            let rows = stmt
                .query_map(params![range.start, range.end, limit], row_to_stored)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }

    /// Most recently captured reading
    pub async fn latest(&self) -> StoreResult<Option<StoredReading>> {
        self.with_conn(|conn| {
            let reading = conn
                .query_row(
                    &format!(
                        "SELECT {} FROM sensor_data ORDER BY timestamp DESC, id DESC LIMIT 1",
                        SELECT_COLUMNS
                    ),
                    [],
                    row_to_stored,
                )
                .optional()?;
            Ok(reading)
        })
        .await
    }

    /// Aggregate temperature and humidity statistics over `range`
    pub async fn summary(&self, range: TimeRange) -> StoreResult<ReadingSummary> {
        self.with_conn(move |conn| {
            let mut summary = conn.query_row(
                "SELECT COUNT(*),
                        MIN(temperature), MAX(temperature), AVG(temperature),
                        MIN(humidity), MAX(humidity), AVG(humidity)
                 FROM sensor_data
                 WHERE timestamp >= ?1 AND timestamp < ?2",
                params![range.start, range.end],
                |row| {
                    Ok(ReadingSummary {
                        count: row.get::<_, i64>(0)?.max(0) as u64,
                        min_temp: row.get(1)?,
                        max_temp: row.get(2)?,
                        avg_temp: row.get(3)?,
                        min_hum: row.get(4)?,
                        max_hum: row.get(5)?,
                        avg_hum: row.get(6)?,
                        ..Default::default()
                    })
                },
            )?;

            if summary.count == 0 {
                return Ok(summary);
            }

            let peak: Option<(i64, f64)> = conn
                .query_row(
                    "SELECT CAST(strftime('%H', timestamp / 1000, 'unixepoch') AS INTEGER) AS hour,
                            AVG(temperature) AS avg_temp
                     FROM sensor_data
                     WHERE timestamp >= ?1 AND timestamp < ?2
                     GROUP BY hour
                     ORDER BY avg_temp DESC, hour ASC
                     LIMIT 1",
                    params![range.start, range.end],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            if let Some((hour, avg)) = peak {
                summary.peak_hour = u32::try_from(hour).ok();
                summary.peak_hour_avg = Some(avg);
            }

            let prev = range.preceding();
            let prev_avg: Option<f64> = conn.query_row(
                "SELECT AVG(temperature) FROM sensor_data WHERE timestamp >= ?1 AND timestamp < ?2",
                params![prev.start, prev.end],
                |row| row.get(0),
            )?;

            summary.prev_period_diff = match (summary.avg_temp, prev_avg) {
                (Some(current), Some(previous)) => Some(current - previous),
                _ => None,
            };

            Ok(summary)
        })
        .await
    }

    /// Total number of stored readings
    pub async fn count(&self) -> StoreResult<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM sensor_data", [], |row| row.get(0))?;
            Ok(count.max(0) as u64)
        })
        .await
    }

    /// Cheap round trip used by the readiness probe
    pub async fn ping(&self) -> StoreResult<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl ReadingStore for SqliteStore {
    async fn write(&self, reading: &Reading) -> StoreResult<StoredReading> {
        let reading = reading.clone();
        self.with_conn(move |conn| {
            let now_ms = Utc::now().timestamp_millis();
            let now = millis_to_datetime(now_ms, 1)?;

            let mut stmt = conn.prepare_cached(
                "INSERT INTO sensor_data (
                    created_at, updated_at, timestamp, temperature, humidity, pressure,
                    altitude, co2, distance, wind_speed, wind_direction, rainfall,
                    voltage, bus_voltage, current
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            stmt.execute(params![
                now_ms,
                now_ms,
                reading.timestamp_millis(),
                reading.temperature,
                reading.humidity,
                reading.pressure,
                reading.altitude,
                reading.co2,
                reading.distance,
                reading.wind_speed,
                reading.wind_direction,
                reading.rainfall,
                reading.voltage,
                reading.bus_voltage,
                reading.current,
            ])?;

            Ok(StoredReading {
                id: conn.last_insert_rowid(),
                created_at: now,
                updated_at: now,
                reading,
            })
        })
        .await
    }
}

fn millis_to_datetime(ms: i64, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or(rusqlite::Error::IntegralValueOutOfRange(column, ms))
}

fn row_to_stored(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    Ok(StoredReading {
        id: row.get(0)?,
        created_at: millis_to_datetime(row.get(1)?, 1)?,
        updated_at: millis_to_datetime(row.get(2)?, 2)?,
        reading: Reading {
            timestamp: millis_to_datetime(row.get(3)?, 3)?,
            temperature: row.get(4)?,
            humidity: row.get(5)?,
            pressure: row.get(6)?,
            altitude: row.get(7)?,
            co2: row.get(8)?,
            distance: row.get(9)?,
            wind_speed: row.get(10)?,
            wind_direction: row.get(11)?,
            rainfall: row.get(12)?,
            voltage: row.get(13)?,
            bus_voltage: row.get(14)?,
            current: row.get(15)?,
        },
    })
}
