//! Runtime settings persisted in the `config` table.
//!
//! The engine reads a fresh [`Settings`] snapshot at the start of every pass,
//! so changes made through the CLI take effect on the next pass without a
//! restart. Missing keys read as empty strings; empty values are never
//! validated here and simply make the dependent remote calls fail.

use tracing::warn;

use crate::db::SettingsStore;

/// Keys of the settings table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    /// Home Assistant base URL, e.g. `http://homeassistant.local:8123`.
    HaUrl,
    /// Home Assistant long-lived access token.
    HaToken,
    /// Telegram bot token.
    TgToken,
    /// Telegram chat receiving alerts.
    ChatId,
    /// Poll interval in whole minutes.
    CronInterval,
}

impl SettingKey {
    /// All keys, in display order.
    pub const ALL: [SettingKey; 5] = [
        SettingKey::HaUrl,
        SettingKey::HaToken,
        SettingKey::TgToken,
        SettingKey::ChatId,
        SettingKey::CronInterval,
    ];

    /// Column value stored in the `key` column.
    pub fn as_str(self) -> &'static str {
        match self {
            SettingKey::HaUrl => "ha_url",
            SettingKey::HaToken => "ha_token",
            SettingKey::TgToken => "tg_token",
            SettingKey::ChatId => "chat_id",
            SettingKey::CronInterval => "cron_interval",
        }
    }

    /// Whether the value is a credential that must be masked on display.
    pub fn is_secret(self) -> bool {
        matches!(self, SettingKey::HaToken | SettingKey::TgToken)
    }
}

/// Snapshot of all runtime settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    /// Home Assistant base URL.
    pub ha_url: String,
    /// Home Assistant access token.
    pub ha_token: String,
    /// Telegram bot token.
    pub tg_token: String,
    /// Telegram chat id.
    pub chat_id: String,
    /// Raw poll interval string (minutes).
    pub cron_interval: String,
}

impl Settings {
    /// Read every key from the store.
    ///
    /// A failed read is logged and treated as an empty value.
    pub async fn load(store: &dyn SettingsStore) -> Self {
        let mut settings = Self::default();
        for key in SettingKey::ALL {
            let value = match store.get_setting(key.as_str()).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "failed to read setting");
                    String::new()
                }
            };
            *settings.slot_mut(key) = value;
        }
        settings
    }

    /// Value for a key.
    pub fn get(&self, key: SettingKey) -> &str {
        match key {
            SettingKey::HaUrl => &self.ha_url,
            SettingKey::HaToken => &self.ha_token,
            SettingKey::TgToken => &self.tg_token,
            SettingKey::ChatId => &self.chat_id,
            SettingKey::CronInterval => &self.cron_interval,
        }
    }

    fn slot_mut(&mut self, key: SettingKey) -> &mut String {
        match key {
            SettingKey::HaUrl => &mut self.ha_url,
            SettingKey::HaToken => &mut self.ha_token,
            SettingKey::TgToken => &mut self.tg_token,
            SettingKey::ChatId => &mut self.chat_id,
            SettingKey::CronInterval => &mut self.cron_interval,
        }
    }
}

/// Mask a credential for display, keeping only the last four characters.
pub fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    let count = value.chars().count();
    if count <= 4 {
        return "****".to_owned();
    }
    let tail: String = value.chars().skip(count.saturating_sub(4)).collect();
    format!("****{tail}")
}
