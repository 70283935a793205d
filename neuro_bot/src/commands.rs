use anyhow::Result;
use neuro_core::messages::CANCEL_TRAINING_CALLBACK_PREFIX;
use teloxide::{
    dispatching::UpdateHandler,
    prelude::*,
    types::{CallbackQuery, Message},
    utils::command::BotCommands,
};

use crate::balance::handler::{handle_balance, handle_pre_checkout, handle_successful_payment};
use crate::training::handler::{handle_cancel, handle_cancel_callback, handle_train};
use crate::utils::send_message;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub enum Command {
    #[command(description = "show this help")]
    Help,
    #[command(description = "train a LoRA model: /train <model> <trigger> <steps> <zip url>")]
    Train(String),
    #[command(description = "cancel your running training")]
    Cancel,
    #[command(description = "show your star balance")]
    Balance,
}

async fn handle_help(bot: Bot, msg: Message) -> Result<()> {
    send_message(msg, bot, Command::descriptions().to_string()).await
}

pub fn handler_schema() -> UpdateHandler<anyhow::Error> {
    let command_handler = dptree::entry()
        .filter_command::<Command>()
        .branch(dptree::case![Command::Help].endpoint(handle_help))
        .branch(dptree::case![Command::Train(args)].endpoint(handle_train))
        .branch(dptree::case![Command::Cancel].endpoint(handle_cancel))
        .branch(dptree::case![Command::Balance].endpoint(handle_balance));

    let payment_handler = dptree::entry()
        .filter_map(|msg: Message| msg.successful_payment().cloned())
        .endpoint(handle_successful_payment);

    let message_handler = Update::filter_message()
        .branch(payment_handler)
        .branch(command_handler);

    let callback_handler = Update::filter_callback_query()
        .filter(|query: CallbackQuery| {
            query
                .data
                .as_deref()
                .is_some_and(|data| data.starts_with(CANCEL_TRAINING_CALLBACK_PREFIX))
        })
        .endpoint(handle_cancel_callback);

    dptree::entry()
        .branch(message_handler)
        .branch(Update::filter_pre_checkout_query().endpoint(handle_pre_checkout))
        .branch(callback_handler)
}
