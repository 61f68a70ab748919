//! Hand-written fakes for the engine's collaborators.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::sync::Semaphore;

use sensorwatch::config::ChecksConfig;
use sensorwatch::db::{Sensor, SensorRegistry, SettingsStore};
use sensorwatch::engine::{DiagnosticEngine, EngineDeps};
use sensorwatch::homeassistant::{ApiStatus, FetchError, SensorState, StateFetcher};
use sensorwatch::notifier::Notifier;

/// What `/api/` answers.
#[derive(Debug, Clone)]
pub enum HealthReply {
    Running,
    Message(String),
    Status(u16),
    Garbage,
}

/// Scriptable Home Assistant.
pub struct FakeFetcher {
    pub health: Mutex<HealthReply>,
    pub error_log: Mutex<Option<Vec<u8>>>,
    pub states: Mutex<HashMap<String, SensorState>>,
    pub entity_ids: Mutex<Option<Vec<String>>>,
    pub health_calls: AtomicU32,
    pub state_calls: AtomicU32,
    /// When set, `fetch_health` waits for a permit before answering.
    pub gate: Option<Arc<Semaphore>>,
    pub seen_auth: Mutex<Vec<(String, String)>>,
}

impl Default for FakeFetcher {
    fn default() -> Self {
        Self {
            health: Mutex::new(HealthReply::Running),
            error_log: Mutex::new(Some(Vec::new())),
            states: Mutex::new(HashMap::new()),
            entity_ids: Mutex::new(Some(Vec::new())),
            health_calls: AtomicU32::new(0),
            state_calls: AtomicU32::new(0),
            gate: None,
            seen_auth: Mutex::new(Vec::new()),
        }
    }
}

impl FakeFetcher {
    pub fn set_health(&self, reply: HealthReply) {
        *self.health.lock().expect("lock") = reply;
    }

    pub fn set_error_log(&self, body: Option<&[u8]>) {
        *self.error_log.lock().expect("lock") = body.map(<[u8]>::to_vec);
    }

    pub fn set_state(&self, entity_id: &str, state: SensorState) {
        self.states
            .lock()
            .expect("lock")
            .insert(entity_id.to_owned(), state);
    }

    pub fn set_entity_ids(&self, ids: Option<&[&str]>) {
        *self.entity_ids.lock().expect("lock") =
            ids.map(|ids| ids.iter().map(|s| (*s).to_owned()).collect());
    }

    pub fn health_calls(&self) -> u32 {
        self.health_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StateFetcher for FakeFetcher {
    async fn fetch_state(
        &self,
        entity_id: &str,
        base_url: &str,
        token: &str,
    ) -> Result<SensorState, FetchError> {
        self.state_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_auth
            .lock()
            .expect("lock")
            .push((base_url.to_owned(), token.to_owned()));
        self.states
            .lock()
            .expect("lock")
            .get(entity_id)
            .cloned()
            .ok_or(FetchError::HttpStatus(404))
    }

    async fn fetch_health(&self, _base_url: &str, _token: &str) -> Result<ApiStatus, FetchError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            let permit = gate.acquire().await.expect("gate open");
            permit.forget();
        }
        let reply = self.health.lock().expect("lock").clone();
        match reply {
            HealthReply::Running => Ok(ApiStatus {
                message: "API running.".to_owned(),
            }),
            HealthReply::Message(message) => Ok(ApiStatus { message }),
            HealthReply::Status(code) => Err(FetchError::HttpStatus(code)),
            HealthReply::Garbage => Err(FetchError::Decode("expected value".to_owned())),
        }
    }

    async fn fetch_error_log(&self, _base_url: &str, _token: &str) -> Result<Vec<u8>, FetchError> {
        self.error_log
            .lock()
            .expect("lock")
            .clone()
            .ok_or(FetchError::HttpStatus(500))
    }

    async fn fetch_entity_ids(
        &self,
        _base_url: &str,
        _token: &str,
    ) -> Result<Vec<String>, FetchError> {
        self.entity_ids
            .lock()
            .expect("lock")
            .clone()
            .ok_or(FetchError::HttpStatus(401))
    }
}

/// One delivered message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub bot_token: String,
    pub chat_id: String,
    pub text: String,
}

/// Notifier that records everything it is asked to send.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<Sent>>,
}

impl RecordingNotifier {
    pub fn texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("lock")
            .iter()
            .map(|s| s.text.clone())
            .collect()
    }

    pub fn count(&self) -> usize {
        self.sent.lock().expect("lock").len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, bot_token: &str, chat_id: &str, text: &str) {
        self.sent.lock().expect("lock").push(Sent {
            bot_token: bot_token.to_owned(),
            chat_id: chat_id.to_owned(),
            text: text.to_owned(),
        });
    }
}

/// In-memory settings table.
#[derive(Default)]
pub struct MemorySettings {
    pub values: Mutex<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn with(pairs: &[(&str, &str)]) -> Self {
        let values = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Self {
            values: Mutex::new(values),
        }
    }
}

#[async_trait]
impl SettingsStore for MemorySettings {
    async fn get_setting(&self, key: &str) -> anyhow::Result<String> {
        Ok(self
            .values
            .lock()
            .expect("lock")
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_setting(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .expect("lock")
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// In-memory registry; `None` makes every read fail.
pub struct MemoryRegistry {
    pub sensors: Mutex<Option<Vec<Sensor>>>,
}

impl MemoryRegistry {
    pub fn with(sensors: Vec<Sensor>) -> Self {
        Self {
            sensors: Mutex::new(Some(sensors)),
        }
    }

    pub fn failing() -> Self {
        Self {
            sensors: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SensorRegistry for MemoryRegistry {
    async fn list_sensors(&self) -> anyhow::Result<Vec<Sensor>> {
        self.sensors
            .lock()
            .expect("lock")
            .clone()
            .ok_or_else(|| anyhow::anyhow!("database is locked"))
    }
}

/// Settings every test pass runs with.
pub fn default_settings() -> MemorySettings {
    MemorySettings::with(&[
        ("ha_url", "http://ha.local:8123"),
        ("ha_token", "ha-secret"),
        ("tg_token", "123:tg-secret"),
        ("chat_id", "-1001"),
        ("cron_interval", "10"),
    ])
}

pub fn sensor(id: i64, name: &str, min: Option<f64>, max: Option<f64>) -> Sensor {
    Sensor {
        id,
        name: name.to_owned(),
        min_value: min,
        max_value: max,
    }
}

/// A measurement state with the given value and optional device class.
pub fn measurement(value: &str, last_changed: DateTime<Utc>, device_class: Option<&str>) -> SensorState {
    let mut attributes = Map::new();
    attributes.insert("state_class".to_owned(), json!("measurement"));
    if let Some(class) = device_class {
        attributes.insert("device_class".to_owned(), Value::from(class));
    }
    SensorState {
        value: value.to_owned(),
        last_changed,
        attributes,
    }
}

/// Everything a test needs to drive and inspect one engine.
pub struct Harness {
    pub fetcher: Arc<FakeFetcher>,
    pub notifier: Arc<RecordingNotifier>,
    pub engine: Arc<DiagnosticEngine>,
}

pub fn harness(sensors: Vec<Sensor>, fetcher: FakeFetcher) -> Harness {
    harness_with_registry(Arc::new(MemoryRegistry::with(sensors)), fetcher)
}

pub fn harness_with_registry(registry: Arc<dyn SensorRegistry>, fetcher: FakeFetcher) -> Harness {
    let fetcher = Arc::new(fetcher);
    let notifier = Arc::new(RecordingNotifier::default());
    let deps = EngineDeps {
        settings: Arc::new(default_settings()),
        registry,
        fetcher: Arc::clone(&fetcher) as Arc<dyn StateFetcher>,
        notifier: Arc::clone(&notifier) as Arc<dyn Notifier>,
    };
    let engine = Arc::new(DiagnosticEngine::new(deps, &ChecksConfig::default()));
    Harness {
        fetcher,
        notifier,
        engine,
    }
}
