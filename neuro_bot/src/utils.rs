//! Utility functions for neuro_bot.

use neuro_core::messages::Language;
use teloxide::{prelude::*, sugar::request::RequestReplyExt, types::Message};

pub async fn send_message(msg: Message, bot: Bot, text: String) -> Result<(), anyhow::Error> {
    if msg.chat.is_group() || msg.chat.is_supergroup() {
        bot.send_message(msg.chat.id, text).reply_to(msg.id).await?;
    } else {
        bot.send_message(msg.chat.id, text).await?;
    }

    Ok(())
}

/// Language of the message author, English when Telegram did not say.
pub fn user_language(msg: &Message) -> Language {
    Language::from_code(msg.from.as_ref().and_then(|user| user.language_code.as_deref()))
}
