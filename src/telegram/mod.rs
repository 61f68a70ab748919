//! Telegram command listener.
//!
//! A teloxide dispatcher answering slash commands in the configured alert
//! chat. Messages from any other chat are dropped. Outbound alerts do not go
//! through here; see [`crate::notifier`].

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ParseMode, Recipient};
use tracing::{debug, info, warn};

use crate::db::{SettingsStore, Store};
use crate::discovery;
use crate::homeassistant::StateFetcher;
use crate::notifier::parse_recipient;
use crate::scheduler::Scheduler;
use crate::settings::{SettingKey, Settings};

pub mod commands;

/// Shared dependencies injected into teloxide handlers via `dptree::deps!`.
#[derive(Clone)]
pub struct BotState {
    /// Pass scheduler for `/check`.
    pub scheduler: Scheduler,
    /// Settings and registry.
    pub store: Arc<Store>,
    /// Home Assistant client for `/discover`.
    pub fetcher: Arc<dyn StateFetcher>,
}

/// Run the command listener until Ctrl+C.
///
/// # Errors
///
/// Currently infallible once started; the signature leaves room for
/// start-up validation.
pub async fn run_telegram(bot_token: &str, state: BotState) -> anyhow::Result<()> {
    let bot = Bot::new(bot_token);

    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    info!("telegram command listener starting");

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    Ok(())
}

async fn handle_message(bot: Bot, msg: Message, state: BotState) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    if !text.starts_with('/') {
        return Ok(());
    }

    let chat_id = match state.store.get_setting(SettingKey::ChatId.as_str()).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to read chat id, ignoring command");
            return Ok(());
        }
    };
    if !is_alert_chat(&msg, &chat_id) {
        warn!(chat = msg.chat.id.0, "command from unknown chat dropped");
        return Ok(());
    }

    debug!(chat = msg.chat.id.0, command = text, "telegram command received");

    let reply = dispatch_command(text, &state).await;
    bot.send_message(msg.chat.id, reply)
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn dispatch_command(text: &str, state: &BotState) -> String {
    let without_slash = &text[1..];
    let full_command = without_slash
        .split_whitespace()
        .next()
        .unwrap_or(without_slash);
    // Strip @bot_name suffix if present
    let command = full_command.split('@').next().unwrap_or(full_command);

    match command {
        "help" | "start" => commands::handle_help(),
        "check" => commands::handle_check(&state.scheduler),
        "sensors" => commands::handle_sensors(&*state.store).await,
        "discover" => {
            spawn_discovery(state);
            "Sensor discovery started, run /sensors shortly".to_owned()
        }
        _ => format!("Unknown command: /{}", commands::escape_html(command)),
    }
}

fn spawn_discovery(state: &BotState) {
    let store = Arc::clone(&state.store);
    let fetcher = Arc::clone(&state.fetcher);
    tokio::spawn(async move {
        let settings = Settings::load(&*store).await;
        if let Err(e) = discovery::discover_sensors(&*fetcher, &store, &settings).await {
            warn!(error = %e, "sensor discovery failed");
        }
    });
}

/// Whether `msg` was sent in the chat configured as `chat_id`.
fn is_alert_chat(msg: &Message, chat_id: &str) -> bool {
    match parse_recipient(chat_id) {
        Some(Recipient::Id(id)) => msg.chat.id == id,
        Some(Recipient::ChannelUsername(name)) => {
            msg.chat.username() == Some(name.trim_start_matches('@'))
        }
        None => false,
    }
}
