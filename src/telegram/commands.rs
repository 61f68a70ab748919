//! Telegram slash command handlers.
//!
//! Each function handles a specific command and returns an HTML-formatted
//! response string. Replies are sent before any long-running work finishes.

use crate::db::{Sensor, SensorRegistry};
use crate::scheduler::{Scheduler, TriggerAck};

/// List all available commands.
pub fn handle_help() -> String {
    [
        "<b>Available commands:</b>",
        "",
        "/help - show this message",
        "/check - run diagnostics now",
        "/sensors - list monitored sensors and thresholds",
        "/discover - register all sensor.* entities from Home Assistant",
    ]
    .join("\n")
}

/// Start a diagnostic pass without waiting for it.
pub fn handle_check(scheduler: &Scheduler) -> String {
    match scheduler.trigger() {
        TriggerAck::Started => "Diagnostics started".to_owned(),
        TriggerAck::AlreadyRunning => "A diagnostic pass is already running".to_owned(),
    }
}

/// List registered sensors.
pub async fn handle_sensors(registry: &dyn SensorRegistry) -> String {
    match registry.list_sensors().await {
        Ok(sensors) => format_sensor_list(&sensors),
        Err(e) => format!("Failed to read sensors: {}", escape_html(&e.to_string())),
    }
}

/// Format the registry as a `<pre>` block, one sensor per line.
pub fn format_sensor_list(sensors: &[Sensor]) -> String {
    if sensors.is_empty() {
        return "No sensors registered.".to_owned();
    }
    let lines: Vec<String> = sensors.iter().map(ToString::to_string).collect();
    format!(
        "<b>Sensors ({}):</b>\n<pre>{}</pre>",
        sensors.len(),
        escape_html(&lines.join("\n"))
    )
}

/// Escape special HTML characters in user-provided text.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
