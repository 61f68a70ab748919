//! Alert decision policy.
//!
//! [`evaluate`] is a pure function from a sensor's configuration and its
//! current state to the alerts that state warrants. It performs no I/O and
//! reads the clock only through its `now` argument, which keeps every
//! boundary testable.
//!
//! Evaluation order for a measurement sensor:
//!
//! ```text
//! battery? ──parsed──▶ ≤ cutoff: BatteryLow, stop │ > cutoff: stop
//!     │
//!     └──unparseable or not battery──▶ staleness ──▶ thresholds
//! ```

use std::fmt;

use chrono::{DateTime, Utc};

use crate::config::ChecksConfig;
use crate::db::Sensor;
use crate::homeassistant::SensorState;
use crate::notifier::{tail_within, telegram_len};

/// Attribute value that makes a sensor eligible for evaluation.
pub const MEASUREMENT_CLASS: &str = "measurement";

/// Device class that enables the battery check.
pub const BATTERY_CLASS: &str = "battery";

/// Tunable constants of the policy.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckPolicy {
    /// Elapsed hours at or above which a sensor is stale.
    pub stale_after_hours: f64,
    /// Battery level at or below which a low-battery alert fires.
    pub battery_low_percent: f64,
}

impl Default for CheckPolicy {
    fn default() -> Self {
        Self {
            stale_after_hours: 6.0,
            battery_low_percent: 5.0,
        }
    }
}

impl From<&ChecksConfig> for CheckPolicy {
    fn from(checks: &ChecksConfig) -> Self {
        Self {
            stale_after_hours: checks.stale_after_hours,
            battery_low_percent: checks.battery_low_percent,
        }
    }
}

/// A single user-facing alert.
///
/// `Display` renders the message text sent to the chat.
#[derive(Debug, Clone, PartialEq)]
pub enum Alert {
    /// `/api/` could not be reached or answered with a non-200 status.
    ApiUnreachable,
    /// `/api/` answered 200 but the body was undecodable or not "API running.".
    ApiUnhealthy,
    /// The error log contains new error entries.
    ErrorLog {
        /// Full log body, lossily decoded as UTF-8.
        body: String,
    },
    /// The sensor state could not be fetched.
    SensorUnreachable {
        /// Entity id.
        sensor: String,
    },
    /// Battery level is at or below the cutoff.
    BatteryLow {
        /// Entity id.
        sensor: String,
        /// Reported battery percentage.
        percent: f64,
    },
    /// The value has not changed for too long.
    Stale {
        /// Entity id.
        sensor: String,
        /// Hours since the last change.
        hours: f64,
    },
    /// The value is outside the configured bounds.
    OutOfThreshold {
        /// Entity id.
        sensor: String,
        /// Observed value.
        value: f64,
    },
}

impl Alert {
    /// Short machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Alert::ApiUnreachable => "api_unreachable",
            Alert::ApiUnhealthy => "api_unhealthy",
            Alert::ErrorLog { .. } => "error_log",
            Alert::SensorUnreachable { .. } => "sensor_unreachable",
            Alert::BatteryLow { .. } => "battery_low",
            Alert::Stale { .. } => "stale",
            Alert::OutOfThreshold { .. } => "out_of_threshold",
        }
    }

    /// Whether this alert reports global Home Assistant availability.
    pub fn is_system_unavailable(&self) -> bool {
        matches!(self, Alert::ApiUnreachable | Alert::ApiUnhealthy)
    }
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::ApiUnreachable => write!(f, "Home Assistant API unavailable (connection error)"),
            Alert::ApiUnhealthy => write!(
                f,
                "Home Assistant API unavailable or responding incorrectly"
            ),
            Alert::ErrorLog { body } => {
                write!(f, "{ERROR_LOG_HEADER}{}", log_tail(body, ERROR_LOG_BODY_UNITS))
            }
            Alert::SensorUnreachable { sensor } => write!(f, "Sensor {sensor} is not responding"),
            Alert::BatteryLow { sensor, percent } => {
                write!(f, "Sensor {sensor} battery is running low ({percent:.0}%)")
            }
            Alert::Stale { sensor, hours } => {
                write!(f, "Sensor {sensor}: value unchanged for {hours:.1} hours")
            }
            Alert::OutOfThreshold { sensor, value } => {
                write!(f, "Sensor {sensor}: value {value:.2} is outside thresholds")
            }
        }
    }
}

const ERROR_LOG_HEADER: &str = "Errors in the Home Assistant log:\n\n";

// Leaves room for the header and marker within one Telegram message.
const ERROR_LOG_BODY_UNITS: usize = 4000;

/// Decide which alerts a fetched sensor state warrants.
///
/// Sensors whose `state_class` is not `"measurement"` yield nothing. A
/// battery sensor whose value parses is judged on its level alone. A battery
/// sensor whose value does not parse falls through to the staleness and
/// threshold checks like any other sensor.
pub fn evaluate(
    sensor: &Sensor,
    state: &SensorState,
    now: DateTime<Utc>,
    policy: &CheckPolicy,
) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if state.attribute_str("state_class") != Some(MEASUREMENT_CLASS) {
        return alerts;
    }

    if state.attribute_str("device_class") == Some(BATTERY_CLASS) {
        if let Some(percent) = parse_value(&state.value) {
            if percent <= policy.battery_low_percent {
                alerts.push(Alert::BatteryLow {
                    sensor: sensor.name.clone(),
                    percent,
                });
            }
            return alerts;
        }
    }

    let hours = elapsed_hours(state.last_changed, now);
    if hours >= policy.stale_after_hours {
        alerts.push(Alert::Stale {
            sensor: sensor.name.clone(),
            hours,
        });
    }

    if sensor.has_thresholds() {
        if let Some(value) = parse_value(&state.value) {
            if out_of_bounds(value, sensor.min_value, sensor.max_value) {
                alerts.push(Alert::OutOfThreshold {
                    sensor: sensor.name.clone(),
                    value,
                });
            }
        }
    }

    alerts
}

/// Whether `value` is strictly below `min` or strictly above `max`.
pub fn out_of_bounds(value: f64, min: Option<f64>, max: Option<f64>) -> bool {
    min.is_some_and(|m| value < m) || max.is_some_and(|m| value > m)
}

/// Parse a state value as a number.
///
/// The raw value is not trimmed. `"inf"` and `"nan"` parse: an infinite
/// reading breaches any bound on its side, NaN compares false against every
/// bound and cutoff.
pub fn parse_value(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok()
}

/// Hours between `since` and `now` as a float. Negative under clock skew.
pub fn elapsed_hours(since: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let elapsed = now.signed_duration_since(since);
    #[allow(clippy::cast_precision_loss)]
    let millis = elapsed.num_milliseconds() as f64;
    millis / 3_600_000.0
}

/// End of `text` within `max_units` Telegram length units, with a marker
/// when anything was cut.
pub fn log_tail(text: &str, max_units: usize) -> String {
    if telegram_len(text) <= max_units {
        return text.to_owned();
    }
    format!("...{}", tail_within(text, max_units))
}
