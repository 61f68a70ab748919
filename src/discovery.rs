//! Bulk sensor discovery from `/api/states`.

use anyhow::Context;
use tracing::{debug, info, warn};

use crate::db::Store;
use crate::homeassistant::StateFetcher;
use crate::settings::Settings;

/// Entity id prefix of the sensor domain.
pub const SENSOR_PREFIX: &str = "sensor.";

/// Outcome of one discovery run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    /// Sensor entities reported by Home Assistant.
    pub found: usize,
    /// Of those, how many were not registered yet.
    pub added: usize,
}

/// Register every `sensor.*` entity Home Assistant knows about.
///
/// Existing rows (and their thresholds) are left untouched. A failed insert
/// is logged and the remaining entities are still processed.
///
/// # Errors
///
/// Returns an error if the entity list cannot be fetched.
pub async fn discover_sensors(
    fetcher: &dyn StateFetcher,
    store: &Store,
    settings: &Settings,
) -> anyhow::Result<DiscoveryReport> {
    let entity_ids = fetcher
        .fetch_entity_ids(&settings.ha_url, &settings.ha_token)
        .await
        .context("failed to fetch entity list")?;

    let mut report = DiscoveryReport::default();
    for entity_id in entity_ids.iter().filter(|id| id.starts_with(SENSOR_PREFIX)) {
        report.found = report.found.saturating_add(1);
        match store.register_discovered(entity_id).await {
            Ok(true) => {
                debug!(sensor = %entity_id, "sensor registered");
                report.added = report.added.saturating_add(1);
            }
            Ok(false) => {}
            Err(e) => warn!(sensor = %entity_id, error = %e, "failed to register sensor"),
        }
    }

    info!(found = report.found, added = report.added, "sensor discovery complete");
    Ok(report)
}
