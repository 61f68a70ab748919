//! Configuration loading and validation.
//!
//! Loads `sensorwatch.toml` (or `$SENSORWATCH_CONFIG`) with per-section
//! defaults. Every section uses `#[serde(default)]`, so a missing or empty
//! file is valid. Environment variables override file values.
//!
//! Precedence: env vars > config file > defaults.
//!
//! Runtime settings that operators change often (Home Assistant URL, tokens,
//! chat id, poll interval) live in the SQLite settings table instead, see
//! [`crate::settings`].

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;

/// Environment variable naming an explicit config file path.
pub const CONFIG_PATH_ENV: &str = "SENSORWATCH_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite storage location.
    pub storage: StorageConfig,
    /// Log output settings.
    pub logging: LoggingConfig,
    /// Outbound HTTP client settings.
    pub http: HttpConfig,
    /// Alert decision constants.
    pub checks: ChecksConfig,
}

/// SQLite storage location.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database file. Defaults to `~/.sensorwatch/sensorwatch.db`.
    pub db_path: Option<PathBuf>,
}

/// Log output settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for rotated JSON logs. Defaults to `~/.sensorwatch/logs`.
    pub dir: Option<PathBuf>,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: default_log_level(),
        }
    }
}

/// Outbound HTTP client settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout applied to every Home Assistant call.
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Constants used by the alert decision policy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChecksConfig {
    /// Hours without a state change after which a sensor is reported stale.
    pub stale_after_hours: f64,
    /// Battery percentage at or below which a low-battery alert fires.
    pub battery_low_percent: f64,
    /// Literal substring marking an error entry in the Home Assistant log.
    pub error_marker: String,
}

impl Default for ChecksConfig {
    fn default() -> Self {
        Self {
            stale_after_hours: default_stale_after_hours(),
            battery_low_percent: default_battery_low_percent(),
            error_marker: default_error_marker(),
        }
    }
}

impl Config {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or
    /// if the resulting values fail validation.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path_with(|key| std::env::var(key).ok())?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file only. A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse config at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(anyhow::anyhow!(
                "failed to read config at {}: {e}",
                path.display()
            )),
        }
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests can avoid mutating the process
    /// environment.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        if let Some(v) = env("SENSORWATCH_DB_PATH") {
            self.storage.db_path = Some(PathBuf::from(v));
        }
        if let Some(v) = env("SENSORWATCH_LOG_LEVEL") {
            self.logging.level = v;
        }
        if let Some(v) = env("SENSORWATCH_HTTP_TIMEOUT_SECS") {
            match v.parse() {
                Ok(n) => self.http.timeout_secs = n,
                Err(_) => tracing::warn!(
                    var = "SENSORWATCH_HTTP_TIMEOUT_SECS",
                    value = %v,
                    "ignoring invalid env override"
                ),
            }
        }
    }

    /// Validate that configuration values are within sane bounds.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first offending value.
    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            (1..=600).contains(&self.http.timeout_secs),
            "http.timeout_secs must be in [1, 600]"
        );
        anyhow::ensure!(
            self.checks.stale_after_hours > 0.0,
            "checks.stale_after_hours must be positive"
        );
        anyhow::ensure!(
            (0.0..=100.0).contains(&self.checks.battery_low_percent),
            "checks.battery_low_percent must be in [0, 100]"
        );
        anyhow::ensure!(
            !self.checks.error_marker.is_empty(),
            "checks.error_marker must not be empty"
        );
        Ok(())
    }

    /// Resolve the database path, falling back to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn db_path(&self) -> anyhow::Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join("sensorwatch.db")),
        }
    }

    /// Resolve the log directory, falling back to the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn logs_dir(&self) -> anyhow::Result<PathBuf> {
        match &self.logging.dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(config_dir()?.join("logs")),
        }
    }
}

/// Resolve the config file path using a custom env resolver.
///
/// Checks `$SENSORWATCH_CONFIG` first, then `~/.sensorwatch/sensorwatch.toml`.
///
/// # Errors
///
/// Returns an error if no explicit path is set and the home directory cannot
/// be determined.
pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> anyhow::Result<PathBuf> {
    if let Some(p) = env(CONFIG_PATH_ENV) {
        return Ok(PathBuf::from(p));
    }
    Ok(config_dir()?.join("sensorwatch.toml"))
}

/// Root directory for sensorwatch state (`~/.sensorwatch`).
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn config_dir() -> anyhow::Result<PathBuf> {
    let home = directories::BaseDirs::new()
        .ok_or_else(|| anyhow::anyhow!("cannot determine home directory"))?;
    Ok(home.home_dir().join(".sensorwatch"))
}

// Default value functions for serde.

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_stale_after_hours() -> f64 {
    6.0
}

fn default_battery_low_percent() -> f64 {
    5.0
}

fn default_error_marker() -> String {
    " ERROR ".to_owned()
}
