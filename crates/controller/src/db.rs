use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;

use crate::error::PersistenceError;
use crate::status::RelayState;

/// Storage format of `sensor_readings.timestamp`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Clone)]
pub struct Db {
    pool: Pool<Sqlite>,
}

/// One acquisition cycle. A `None` field is a failed read, stored as NULL.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    /// Local civil time in the configured zone, second resolution.
    pub timestamp: NaiveDateTime,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub soil_moisture: Option<f64>,
    pub device_temperature: Option<f64>,
    pub lux: Option<f64>,
}

impl SensorSample {
    /// A sample with every measurement absent.
    pub fn empty(timestamp: NaiveDateTime) -> Self {
        Self {
            timestamp,
            temperature: None,
            humidity: None,
            soil_moisture: None,
            device_temperature: None,
            lux: None,
        }
    }

    /// Number of measurements present.
    pub fn populated(&self) -> usize {
        [
            self.temperature,
            self.humidity,
            self.soil_moisture,
            self.device_temperature,
            self.lux,
        ]
        .iter()
        .filter(|v| v.is_some())
        .count()
    }
}

#[derive(sqlx::FromRow)]
struct ReadingRow {
    timestamp: String,
    temperature: Option<f64>,
    humidity: Option<f64>,
    soil_moisture: Option<f64>,
    device_temperature: Option<f64>,
    lux: Option<f64>,
}

impl TryFrom<ReadingRow> for SensorSample {
    type Error = sqlx::Error;

    fn try_from(r: ReadingRow) -> Result<Self, Self::Error> {
        let timestamp = NaiveDateTime::parse_from_str(&r.timestamp, TIMESTAMP_FORMAT)
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
        Ok(Self {
            timestamp,
            temperature: r.temperature,
            humidity: r.humidity,
            soil_moisture: r.soil_moisture,
            device_temperature: r.device_temperature,
            lux: r.lux,
        })
    }
}

impl Db {
    /// db_url examples:
    /// - "sqlite:/home/pi/growbox/growbox.db?mode=rwc"
    /// - "sqlite::memory:" (tests)
    pub async fn connect(db_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(db_url)
            .with_context(|| format!("invalid sqlite connection string: {db_url}"))?
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to connect to sqlite db: {db_url}"))?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Runs SQLx migrations from ./migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("failed to run migrations")?;
        Ok(())
    }

    // ----------------------------
    // Readings
    // ----------------------------

    /// Insert one row. Returns its id.
    pub async fn append(&self, s: &SensorSample) -> Result<i64, PersistenceError> {
        let ts = s.timestamp.format(TIMESTAMP_FORMAT).to_string();
        let res = sqlx::query(
            r#"
            INSERT INTO sensor_readings
              (timestamp, temperature, humidity, soil_moisture, device_temperature, lux)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(ts)
        .bind(s.temperature)
        .bind(s.humidity)
        .bind(s.soil_moisture)
        .bind(s.device_temperature)
        .bind(s.lux)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::wrap("append reading"))?;
        Ok(res.last_insert_rowid())
    }

    /// The `n` most recent samples, newest first by local civil timestamp.
    /// `id DESC` only breaks exact ties. Across a DST fall-back the repeated
    /// hour sorts by wall-clock text, so a later-inserted 02:10 comes after
    /// an earlier-inserted 02:30.
    pub async fn recent(&self, n: u32) -> Result<Vec<SensorSample>, PersistenceError> {
        let rows: Vec<ReadingRow> = sqlx::query_as(
            r#"
            SELECT timestamp, temperature, humidity, soil_moisture, device_temperature, lux
            FROM sensor_readings
            ORDER BY timestamp DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(i64::from(n))
        .fetch_all(&self.pool)
        .await
        .map_err(PersistenceError::wrap("load recent readings"))?;

        rows.into_iter()
            .map(SensorSample::try_from)
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(PersistenceError::wrap("decode reading"))
    }

    // ----------------------------
    // Actuator status mirror
    // ----------------------------

    pub async fn upsert_status(
        &self,
        name: &str,
        state: RelayState,
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO actuator_status (name, state, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
              state=excluded.state,
              updated_at=excluded.updated_at
            "#,
        )
        .bind(name)
        .bind(state.as_str())
        .bind(updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::wrap("upsert actuator status"))?;
        Ok(())
    }

    /// Last mirrored state of `name`; `OFF` when nothing was ever published.
    pub async fn read_status(&self, name: &str) -> Result<RelayState, PersistenceError> {
        let state: Option<String> =
            sqlx::query_scalar("SELECT state FROM actuator_status WHERE name = ?")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(PersistenceError::wrap("read actuator status"))?;

        Ok(state
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(RelayState::Off))
    }
}

// ===========================================================================
// Tests
// ===========================================================================
