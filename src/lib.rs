//! sensorwatch: a watchdog for Home Assistant sensors.
//!
//! Polls a Home Assistant instance on a schedule, decides which sensors are
//! silent, stale, low on battery or out of range, watches the error log for
//! new entries, and reports everything to a Telegram chat.
//!
//! See `DESIGN.md` for the architecture notes.

pub mod config;
pub mod db;
pub mod logging;
pub mod settings;

pub mod homeassistant;
pub mod notifier;

pub mod engine;
pub mod fingerprint;
pub mod policy;

pub mod discovery;
pub mod scheduler;
pub mod telegram;
