use anyhow::Result;
use neuro_core::balance::{BalanceLedger, BalanceReason, Stars};
use neuro_core::messages::{self, Language};
use teloxide::prelude::*;
use teloxide::types::{Message, PreCheckoutQuery, SuccessfulPayment};

use crate::balance::STARS_CURRENCY;
use crate::dependencies::BotDependencies;
use crate::utils::{send_message, user_language};

pub async fn handle_balance(bot: Bot, msg: Message, bot_deps: BotDependencies) -> Result<()> {
    let user = match msg.from.clone() {
        Some(u) => u,
        None => return Ok(()),
    };
    let lang = user_language(&msg);

    match bot_deps.ledger.balance(user.id.0 as i64).await {
        Ok(balance) => send_message(msg, bot, messages::current_balance(lang, balance)).await?,
        Err(e) => {
            log::error!("Failed to read balance for {}: {}", user.id, e);
            send_message(msg, bot, messages::balance_unavailable(lang)).await?;
        }
    }
    Ok(())
}

pub async fn handle_pre_checkout(bot: Bot, query: PreCheckoutQuery) -> Result<()> {
    let lang = Language::from_code(query.from.language_code.as_deref());
    match checkout_rejection(&query.currency, lang) {
        None => {
            bot.answer_pre_checkout_query(query.id, true).await?;
        }
        Some(reason) => {
            log::warn!(
                "Rejecting pre-checkout from {} in unsupported currency {}",
                query.from.id,
                query.currency
            );
            bot.answer_pre_checkout_query(query.id, false)
                .error_message(reason)
                .await?;
        }
    }
    Ok(())
}

/// Text shown when a checkout must be declined; `None` accepts it.
pub fn checkout_rejection(currency: &str, lang: Language) -> Option<String> {
    (currency != STARS_CURRENCY).then(|| messages::stars_only(lang))
}

pub async fn handle_successful_payment(
    bot: Bot,
    msg: Message,
    payment: SuccessfulPayment,
    bot_deps: BotDependencies,
) -> Result<()> {
    let user = match msg.from.clone() {
        Some(u) => u,
        None => return Ok(()),
    };
    let lang = user_language(&msg);
    let amount = Stars(payment.total_amount as i64);
    let operation_id = payment_operation_id(msg.chat.id.0, msg.id.0);

    match bot_deps
        .ledger
        .apply_delta(
            user.id.0 as i64,
            amount.0,
            BalanceReason::TopUp,
            &operation_id,
        )
        .await
    {
        Ok(applied) => {
            send_message(
                msg,
                bot,
                messages::top_up_credited(lang, amount, applied.balance),
            )
            .await?;
        }
        Err(e) => {
            log::error!(
                "CRITICAL: payment {} of {} from {} was not credited: {}",
                operation_id,
                amount,
                user.id,
                e
            );
            send_message(msg, bot, messages::payment_credit_failed(lang)).await?;
        }
    }
    Ok(())
}

/// A payment service message is unique per chat, so redelivered updates
/// credit the same operation.
pub fn payment_operation_id(chat_id: i64, message_id: i32) -> String {
    format!("tg-payment-{}-{}", chat_id, message_id)
}
