//! Delivery channels for notification fan-out.

use async_trait::async_trait;
use teloxide::prelude::*;

use crate::error::{NotifyError, NotifyResult};

/// "Send this text to that chat", the only delivery capability the
/// broadcaster depends on. Implementations report per-recipient failures
/// through the error; they must not retry internally.
#[async_trait]
pub trait DeliveryChannel: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> NotifyResult<()>;
}

/// Telegram Bot API delivery.
pub struct TelegramChannel {
    bot: Bot,
}

impl TelegramChannel {
    pub fn new(token: &str) -> TelegramChannel {
        TelegramChannel {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl DeliveryChannel for TelegramChannel {
    async fn send(&self, chat_id: i64, text: &str) -> NotifyResult<()> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map_err(|e| NotifyError::Delivery {
                chat_id,
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
