//! Settings and sensor registry backed by SQLite.
//!
//! Migration is applied inline via `include_str!` on first open. The
//! diagnostic engine only sees this store through the [`SettingsStore`] and
//! [`SensorRegistry`] traits and never writes to it.

use std::fmt;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

/// Read/write access to the key-value settings table.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Read a setting. Absent keys read as an empty string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    async fn get_setting(&self, key: &str) -> anyhow::Result<String>;

    /// Insert or overwrite a setting.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()>;
}

/// Read access to the monitored sensor list.
#[async_trait]
pub trait SensorRegistry: Send + Sync {
    /// All registered sensors in id order.
    ///
    /// # Errors
    ///
    /// Returns an error if the database read fails.
    async fn list_sensors(&self) -> anyhow::Result<Vec<Sensor>>;
}

/// A monitored sensor and its optional thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Auto-increment row ID.
    pub id: i64,
    /// Home Assistant entity id, e.g. `sensor.kitchen_temperature`.
    pub name: String,
    /// Lower bound; values strictly below it alert.
    pub min_value: Option<f64>,
    /// Upper bound; values strictly above it alert.
    pub max_value: Option<f64>,
}

impl Sensor {
    /// Whether at least one bound is configured.
    pub fn has_thresholds(&self) -> bool {
        self.min_value.is_some() || self.max_value.is_some()
    }
}

impl fmt::Display for Sensor {
    /// Registry listing line, e.g. `3: sensor.temp | min_value: 10.00 | max_value: not set`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} | min_value: {} | max_value: {}",
            self.id,
            self.name,
            format_bound(self.min_value),
            format_bound(self.max_value),
        )
    }
}

fn format_bound(bound: Option<f64>) -> String {
    match bound {
        Some(v) => format!("{v:.2}"),
        None => "not set".to_owned(),
    }
}

/// Registry mutations that can be refused.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A sensor with this name is already registered.
    #[error("sensor already registered: {0}")]
    AlreadyRegistered(String),
    /// No sensor has this id.
    #[error("sensor with id {0} not found")]
    NotFound(i64),
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// The sensorwatch SQLite database.
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (or create) the database at the given path and apply migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migration fails.
    pub async fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await
            .with_context(|| format!("failed to open database at {}", path.display()))?;

        let migration_sql = include_str!("../migrations/001_sensorwatch_schema.sql");
        sqlx::raw_sql(migration_sql)
            .execute(&pool)
            .await
            .context("failed to apply sensorwatch schema migration")?;

        Ok(Self { pool })
    }

    /// Register a sensor with optional thresholds. Returns the new row id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::AlreadyRegistered`] if the name exists, or a
    /// database error.
    pub async fn add_sensor(
        &self,
        name: &str,
        min_value: Option<f64>,
        max_value: Option<f64>,
    ) -> Result<i64, StoreError> {
        let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM sensors WHERE sensor_name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        if exists.is_some() {
            return Err(StoreError::AlreadyRegistered(name.to_owned()));
        }

        let result = sqlx::query(
            "INSERT INTO sensors (sensor_name, min_value, max_value) VALUES (?1, ?2, ?3)",
        )
        .bind(name)
        .bind(min_value)
        .bind(max_value)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Register a discovered sensor unless the name already exists.
    ///
    /// Returns `true` if a new row was inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn register_discovered(&self, name: &str) -> anyhow::Result<bool> {
        let result = sqlx::query("INSERT OR IGNORE INTO sensors (sensor_name) VALUES (?1)")
            .bind(name)
            .execute(&self.pool)
            .await
            .context("failed to register discovered sensor")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete a sensor by id. Returns `true` if a row was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the database write fails.
    pub async fn remove_sensor(&self, id: i64) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sensors WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("failed to delete sensor")?;

        Ok(result.rows_affected() > 0)
    }

    /// Replace both thresholds of a sensor. `None` clears a bound.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] if no sensor has this id, or a
    /// database error.
    pub async fn update_thresholds(
        &self,
        id: i64,
        min_value: Option<f64>,
        max_value: Option<f64>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sensors SET min_value = ?2, max_value = ?3 WHERE id = ?1")
            .bind(id)
            .bind(min_value)
            .bind(max_value)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[async_trait]
impl SettingsStore for Store {
    async fn get_setting(&self, key: &str) -> anyhow::Result<String> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read setting {key}"))?;

        Ok(row.map(|(value,)| value).unwrap_or_default())
    }

    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write setting {key}"))?;

        Ok(())
    }
}

#[async_trait]
impl SensorRegistry for Store {
    async fn list_sensors(&self) -> anyhow::Result<Vec<Sensor>> {
        let rows: Vec<SensorRow> = sqlx::query_as(
            "SELECT id, sensor_name, min_value, max_value FROM sensors ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .context("failed to list sensors")?;

        Ok(rows.into_iter().map(sensor_row_into_sensor).collect())
    }
}

/// Raw row tuple from the `sensors` table.
type SensorRow = (i64, String, Option<f64>, Option<f64>);

fn sensor_row_into_sensor(row: SensorRow) -> Sensor {
    let (id, name, min_value, max_value) = row;
    Sensor {
        id,
        name,
        min_value,
        max_value,
    }
}
