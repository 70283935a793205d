use std::collections::HashMap;

use async_trait::async_trait;
use neuro_core::error::NotificationError;
use neuro_core::notify::{MessageAction, Notifier, Recipient};
use teloxide::prelude::*;

use crate::training::helpers::action_keyboard;

/// Delivers orchestrator notifications through whichever bot the user talked to.
#[derive(Clone)]
pub struct TelegramNotifier {
    bots: HashMap<String, Bot>,
}

impl TelegramNotifier {
    pub fn new(bots: HashMap<String, Bot>) -> Self {
        Self { bots }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send_user_message(
        &self,
        recipient: &Recipient,
        text: &str,
        action: Option<MessageAction>,
    ) -> Result<(), NotificationError> {
        let bot = self
            .bots
            .get(&recipient.bot_name)
            .ok_or_else(|| NotificationError::UnknownBot(recipient.bot_name.clone()))?;

        let request = bot.send_message(ChatId(recipient.telegram_id), text);
        let sent = match action {
            Some(action) => request.reply_markup(action_keyboard(action)).await,
            None => request.await,
        };

        sent.map(|_| ()).map_err(|e| {
            log::warn!(
                "Failed to notify {} via {}: {}",
                recipient.telegram_id,
                recipient.bot_name,
                e
            );
            NotificationError::Delivery(e.to_string())
        })
    }
}
