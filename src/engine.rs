//! Diagnostic engine: one full pass over Home Assistant.
//!
//! A pass runs three phases in order:
//! 1. API health (`/api/`)
//! 2. Error log scan with fingerprint dedup (`/api/error_log`)
//! 3. Per-sensor evaluation via [`policy::evaluate`]
//!
//! Every remote failure becomes either an alert or a log line; nothing is
//! returned as an error. Alerts are delivered as soon as they are decided,
//! in the order they are produced.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::ChecksConfig;
use crate::db::{SensorRegistry, SettingsStore};
use crate::fingerprint::{contains_marker, ErrorLogFingerprint};
use crate::homeassistant::{FetchError, StateFetcher, API_RUNNING_MESSAGE};
use crate::notifier::Notifier;
use crate::policy::{self, Alert, CheckPolicy};
use crate::settings::Settings;

/// Collaborators the engine reads from and writes to.
pub struct EngineDeps {
    /// Runtime settings (URLs, tokens, chat id).
    pub settings: Arc<dyn SettingsStore>,
    /// Monitored sensors.
    pub registry: Arc<dyn SensorRegistry>,
    /// Home Assistant client.
    pub fetcher: Arc<dyn StateFetcher>,
    /// Alert delivery.
    pub notifier: Arc<dyn Notifier>,
}

/// What a pass did. Informational only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PassReport {
    /// Alerts handed to the notifier, in order.
    pub alerts: Vec<Alert>,
    /// Sensors whose state was fetched (successfully or not).
    pub sensors_checked: usize,
    /// Whether the registry could not be read and sensor checks were skipped.
    pub registry_failed: bool,
}

/// Runs diagnostic passes and owns the error-log fingerprint.
pub struct DiagnosticEngine {
    deps: EngineDeps,
    policy: CheckPolicy,
    error_marker: Vec<u8>,
    fingerprint: ErrorLogFingerprint,
}

impl DiagnosticEngine {
    /// Create an engine with policy constants taken from `checks`.
    pub fn new(deps: EngineDeps, checks: &ChecksConfig) -> Self {
        Self {
            deps,
            policy: CheckPolicy::from(checks),
            error_marker: checks.error_marker.as_bytes().to_vec(),
            fingerprint: ErrorLogFingerprint::new(),
        }
    }

    /// The error-log fingerprint shared by all passes of this engine.
    pub fn fingerprint(&self) -> &ErrorLogFingerprint {
        &self.fingerprint
    }

    /// Run one complete pass. Never fails; see [`PassReport`] for what happened.
    pub async fn run_pass(&self) -> PassReport {
        let settings = Settings::load(&*self.deps.settings).await;
        let mut report = PassReport::default();

        info!("diagnostic pass started");

        if let Some(alert) = self.check_health(&settings).await {
            self.emit(&settings, alert, &mut report).await;
        }

        if let Some(alert) = self.check_error_log(&settings).await {
            self.emit(&settings, alert, &mut report).await;
        }

        self.check_sensors(&settings, &mut report).await;

        info!(
            alerts = report.alerts.len(),
            sensors = report.sensors_checked,
            "diagnostic pass complete"
        );
        report
    }

    async fn check_health(&self, settings: &Settings) -> Option<Alert> {
        match self
            .deps
            .fetcher
            .fetch_health(&settings.ha_url, &settings.ha_token)
            .await
        {
            Ok(status) if status.message == API_RUNNING_MESSAGE => {
                debug!("home assistant API healthy");
                None
            }
            Ok(status) => {
                warn!(message = %status.message, "unexpected API status message");
                Some(Alert::ApiUnhealthy)
            }
            Err(FetchError::Decode(e)) => {
                warn!(error = %e, "failed to decode API status");
                Some(Alert::ApiUnhealthy)
            }
            Err(e) => {
                warn!(error = %e, "home assistant API unreachable");
                Some(Alert::ApiUnreachable)
            }
        }
    }

    async fn check_error_log(&self, settings: &Settings) -> Option<Alert> {
        let body = match self
            .deps
            .fetcher
            .fetch_error_log(&settings.ha_url, &settings.ha_token)
            .await
        {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "failed to fetch error log");
                return None;
            }
        };

        if !contains_marker(&body, &self.error_marker) {
            return None;
        }
        if !self.fingerprint.observe(&body) {
            debug!("error log unchanged since last alert");
            return None;
        }

        Some(Alert::ErrorLog {
            body: String::from_utf8_lossy(&body).into_owned(),
        })
    }

    async fn check_sensors(&self, settings: &Settings, report: &mut PassReport) {
        let sensors = match self.deps.registry.list_sensors().await {
            Ok(sensors) => sensors,
            Err(e) => {
                warn!(error = %e, "failed to read sensor registry, skipping sensor checks");
                report.registry_failed = true;
                return;
            }
        };

        for sensor in &sensors {
            report.sensors_checked = report.sensors_checked.saturating_add(1);

            let state = match self
                .deps
                .fetcher
                .fetch_state(&sensor.name, &settings.ha_url, &settings.ha_token)
                .await
            {
                Ok(state) => state,
                Err(e) => {
                    warn!(sensor = %sensor.name, error = %e, "failed to fetch sensor state");
                    let alert = Alert::SensorUnreachable {
                        sensor: sensor.name.clone(),
                    };
                    self.emit(settings, alert, report).await;
                    continue;
                }
            };

            for alert in policy::evaluate(sensor, &state, Utc::now(), &self.policy) {
                self.emit(settings, alert, report).await;
            }
        }
    }

    async fn emit(&self, settings: &Settings, alert: Alert, report: &mut PassReport) {
        info!(kind = alert.kind(), "alert raised");
        self.deps
            .notifier
            .send(&settings.tg_token, &settings.chat_id, &alert.to_string())
            .await;
        report.alerts.push(alert);
    }
}
