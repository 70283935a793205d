use anyhow::Result;
use neuro_core::messages::{self, Language};
use neuro_core::training::{CancelOutcome, LanguageFlag, StepsInput, TrainingEvent};
use teloxide::{
    prelude::*,
    types::{CallbackQuery, MaybeInaccessibleMessage, Message},
};

use crate::dependencies::BotDependencies;
use crate::training::helpers::{
    cancel_record_id, parse_train_args, queue_unavailable, train_usage, training_queued,
};
use crate::utils::{send_message, user_language};

pub async fn handle_train(
    bot: Bot,
    msg: Message,
    args: String,
    bot_deps: BotDependencies,
) -> Result<()> {
    let user = match msg.from.clone() {
        Some(u) => u,
        None => return Ok(()),
    };
    let lang = user_language(&msg);

    let args = match parse_train_args(&args) {
        Some(args) => args,
        None => {
            send_message(msg, bot, train_usage(lang)).await?;
            return Ok(());
        }
    };

    let event = TrainingEvent {
        bot_name: bot_deps.bot_name.clone(),
        telegram_id: user.id.0.to_string(),
        model_name: args.model_name.clone(),
        steps: StepsInput::Text(args.steps),
        trigger_word: args.trigger_word,
        zip_url: args.zip_url,
        is_ru: LanguageFlag::from(lang),
    };

    match bot_deps.queue.enqueue(event).await {
        Ok(()) => send_message(msg, bot, training_queued(lang, &args.model_name)).await?,
        Err(e) => {
            log::error!("Failed to queue training for {}: {}", user.id, e);
            send_message(msg, bot, queue_unavailable(lang)).await?;
        }
    }
    Ok(())
}

pub async fn handle_cancel(bot: Bot, msg: Message, bot_deps: BotDependencies) -> Result<()> {
    let user = match msg.from.clone() {
        Some(u) => u,
        None => return Ok(()),
    };
    let lang = user_language(&msg);

    let text = match bot_deps.orchestrator.cancel_training(user.id.0 as i64).await {
        CancelOutcome::NothingToCancel => messages::nothing_to_cancel(lang),
        CancelOutcome::CancelRequested { .. } => messages::cancel_requested(lang),
    };
    send_message(msg, bot, text).await?;
    Ok(())
}

/// Inline "cancel" button attached to duplicate-request notices.
pub async fn handle_cancel_callback(
    bot: Bot,
    query: CallbackQuery,
    bot_deps: BotDependencies,
) -> Result<()> {
    let data = query.data.as_deref().unwrap_or("");
    let lang = Language::from_code(query.from.language_code.as_deref());

    let record_id = match cancel_record_id(data) {
        Some(id) => id.to_string(),
        None => {
            bot.answer_callback_query(query.id)
                .text("❌ Invalid action")
                .await?;
            return Ok(());
        }
    };

    let outcome = bot_deps
        .orchestrator
        .cancel_record(query.from.id.0 as i64, &record_id)
        .await;

    let text = match outcome {
        CancelOutcome::NothingToCancel => messages::nothing_to_cancel(lang),
        CancelOutcome::CancelRequested { .. } => {
            if let Some(MaybeInaccessibleMessage::Regular(m)) = &query.message {
                if let Err(e) = bot.edit_message_reply_markup(m.chat.id, m.id).await {
                    log::warn!("Failed to remove cancel button: {}", e);
                }
            }
            messages::cancel_requested(lang)
        }
    };

    bot.answer_callback_query(query.id).text(text).await?;
    Ok(())
}
