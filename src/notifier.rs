//! Outbound alert delivery.
//!
//! Uses a teloxide `Bot` directly (send-only, no dispatcher). Delivery is
//! best-effort: failures are logged and never reach the caller, so a broken
//! bot token cannot abort a diagnostic pass.

use std::sync::Mutex;

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::Recipient;
use tracing::{debug, warn};

/// Telegram's maximum message length, in UTF-16 code units.
pub const MAX_MESSAGE_LEN: usize = 4096;

/// Fire-and-forget message delivery.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Attempt to deliver `text` to `chat_id` using `bot_token`.
    ///
    /// Never fails from the caller's point of view; problems are logged.
    async fn send(&self, bot_token: &str, chat_id: &str, text: &str);
}

/// Telegram Bot API notifier.
///
/// The bot token lives in the settings table and may change between passes,
/// so the `Bot` is rebuilt whenever a different token is seen. teloxide's
/// default HTTP client bounds every request with its own timeout.
#[derive(Default)]
pub struct TelegramNotifier {
    cached: Mutex<Option<(String, Bot)>>,
}

impl TelegramNotifier {
    /// Create a notifier with no bot cached yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bot for `bot_token`, reusing the cached one when the token is unchanged.
    pub fn bot(&self, bot_token: &str) -> Bot {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some((token, bot)) = cached.as_ref() {
            if token == bot_token {
                return bot.clone();
            }
        }
        let bot = Bot::new(bot_token);
        *cached = Some((bot_token.to_owned(), bot.clone()));
        bot
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, bot_token: &str, chat_id: &str, text: &str) {
        if chat_id.is_empty() {
            warn!("chat id not set, dropping alert");
            return;
        }
        let Some(recipient) = parse_recipient(chat_id) else {
            warn!(chat_id, "invalid chat id, dropping alert");
            return;
        };

        let text = clamp_message(text);
        match self.bot(bot_token).send_message(recipient, text).await {
            Ok(_) => debug!(chat_id, "alert delivered"),
            Err(e) => warn!(chat_id, error = %e, "failed to send Telegram message"),
        }
    }
}

/// Parse a stored chat id: numeric ids and `@channel` usernames are accepted.
pub fn parse_recipient(chat_id: &str) -> Option<Recipient> {
    let chat_id = chat_id.trim();
    if let Ok(id) = chat_id.parse::<i64>() {
        return Some(Recipient::Id(ChatId(id)));
    }
    if chat_id.len() > 1 && chat_id.starts_with('@') {
        return Some(Recipient::ChannelUsername(chat_id.to_owned()));
    }
    None
}

/// Length of `text` as Telegram measures it (UTF-16 code units).
pub fn telegram_len(text: &str) -> usize {
    text.encode_utf16().count()
}

/// Longest suffix of `text` that is at most `max_units` UTF-16 code units.
pub fn tail_within(text: &str, max_units: usize) -> &str {
    let mut units = 0_usize;
    let mut start = text.len();
    for (idx, ch) in text.char_indices().rev() {
        units = units.saturating_add(ch.len_utf16());
        if units > max_units {
            break;
        }
        start = idx;
    }
    &text[start..]
}

/// Cut `text` to [`MAX_MESSAGE_LEN`], keeping the end.
///
/// Long alerts are error-log excerpts whose newest lines are at the bottom.
pub fn clamp_message(text: &str) -> String {
    tail_within(text, MAX_MESSAGE_LEN).to_owned()
}
