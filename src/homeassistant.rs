//! Home Assistant REST client.
//!
//! Only the four read-only endpoints the watchdog needs are wrapped:
//! `/api/` (health), `/api/error_log`, `/api/states/{entity_id}` and
//! `/api/states` (discovery). Every request carries the bearer token and the
//! client-wide timeout.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Message the `/api/` endpoint returns when Home Assistant is up.
pub const API_RUNNING_MESSAGE: &str = "API running.";

/// Failure of a single Home Assistant request.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Transport failure: DNS, connect, timeout, invalid URL.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The server answered with something other than 200 OK.
    #[error("unexpected HTTP status {0}")]
    HttpStatus(u16),
    /// The body did not match the expected shape.
    #[error("failed to decode response: {0}")]
    Decode(String),
}

/// Current state of one entity as reported by `/api/states/{entity_id}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SensorState {
    /// Raw state value, e.g. `"21.5"` or `"unavailable"`.
    #[serde(rename = "state")]
    pub value: String,
    /// When the value last changed.
    pub last_changed: DateTime<Utc>,
    /// Entity attributes (`state_class`, `device_class`, `unit_of_measurement`, ...).
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

impl SensorState {
    /// String value of an attribute, if present and a JSON string.
    pub fn attribute_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Body of the `/api/` endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiStatus {
    /// Status message; [`API_RUNNING_MESSAGE`] when healthy.
    pub message: String,
}

#[derive(Deserialize)]
struct EntityRef {
    entity_id: String,
}

/// Read access to a Home Assistant instance.
///
/// Base URL and token are passed per call because they are re-read from the
/// settings table on every pass.
#[async_trait]
pub trait StateFetcher: Send + Sync {
    /// Fetch the current state of one entity.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure, non-200 status, or an
    /// undecodable body.
    async fn fetch_state(
        &self,
        entity_id: &str,
        base_url: &str,
        token: &str,
    ) -> Result<SensorState, FetchError>;

    /// Fetch the API status message.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure, non-200 status, or an
    /// undecodable body.
    async fn fetch_health(&self, base_url: &str, token: &str) -> Result<ApiStatus, FetchError>;

    /// Fetch the raw error log body.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure or non-200 status.
    async fn fetch_error_log(&self, base_url: &str, token: &str) -> Result<Vec<u8>, FetchError>;

    /// Fetch the ids of every entity known to Home Assistant.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] on transport failure, non-200 status, or an
    /// undecodable body.
    async fn fetch_entity_ids(&self, base_url: &str, token: &str)
        -> Result<Vec<String>, FetchError>;
}

/// `reqwest`-backed [`StateFetcher`].
#[derive(Debug, Clone)]
pub struct HaClient {
    client: reqwest::Client,
}

impl HaClient {
    /// Build a client whose requests time out after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build HTTP client: {e}"))?;
        Ok(Self { client })
    }

    /// Wrap a preconfigured `reqwest` client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn get_ok(
        &self,
        base_url: &str,
        path: &str,
        token: &str,
    ) -> Result<reqwest::Response, FetchError> {
        let url = api_url(base_url, path);
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        base_url: &str,
        path: &str,
        token: &str,
    ) -> Result<T, FetchError> {
        let body = self.get_ok(base_url, path, token).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl StateFetcher for HaClient {
    async fn fetch_state(
        &self,
        entity_id: &str,
        base_url: &str,
        token: &str,
    ) -> Result<SensorState, FetchError> {
        self.get_json(base_url, &format!("/api/states/{entity_id}"), token)
            .await
    }

    async fn fetch_health(&self, base_url: &str, token: &str) -> Result<ApiStatus, FetchError> {
        self.get_json(base_url, "/api/", token).await
    }

    async fn fetch_error_log(&self, base_url: &str, token: &str) -> Result<Vec<u8>, FetchError> {
        let bytes = self
            .get_ok(base_url, "/api/error_log", token)
            .await?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }

    async fn fetch_entity_ids(
        &self,
        base_url: &str,
        token: &str,
    ) -> Result<Vec<String>, FetchError> {
        let entities: Vec<EntityRef> = self.get_json(base_url, "/api/states", token).await?;
        Ok(entities.into_iter().map(|e| e.entity_id).collect())
    }
}

/// Join a base URL and an API path, tolerating a trailing slash on the base.
pub fn api_url(base_url: &str, path: &str) -> String {
    format!("{}{path}", base_url.trim_end_matches('/'))
}
