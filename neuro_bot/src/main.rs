mod balance;
mod commands;
mod config;
mod dependencies;
mod job;
mod notifications;
mod replicate;
mod training;
mod utils;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use neuro_core::clock::SystemClock;
use neuro_core::training::{
    CompletionHandler, InMemoryTrainingCache, OrchestratorDeps, TrainingOrchestrator,
};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio_cron_scheduler::JobScheduler;

use crate::balance::SledBalanceLedger;
use crate::commands::{Command, handler_schema};
use crate::config::BotConfig;
use crate::dependencies::BotDependencies;
use crate::job::job_scheduler::schedule_jobs;
use crate::notifications::TelegramNotifier;
use crate::replicate::ReplicateClient;
use crate::training::queue::DEFAULT_QUEUE_CAPACITY;
use crate::training::{SledTrainingStore, TrainingQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    log::info!("Starting neuro bot...");

    let config = BotConfig::from_env()?;
    let db = sled::open(&config.sled_path)?;

    let ledger = Arc::new(SledBalanceLedger::new(&db)?);
    let store = Arc::new(SledTrainingStore::new(&db)?);

    let bots: HashMap<String, Bot> = config
        .bots
        .iter()
        .map(|b| (b.name.clone(), Bot::new(b.token.clone())))
        .collect();

    let orchestrator = Arc::new(TrainingOrchestrator::new(
        config.orchestrator_config(),
        OrchestratorDeps {
            cache: Arc::new(InMemoryTrainingCache::new()),
            ledger: ledger.clone(),
            store,
            provider: Arc::new(ReplicateClient::new(config.replicate.clone())),
            notifier: Arc::new(TelegramNotifier::new(bots.clone())),
            clock: Arc::new(SystemClock),
        },
    ));

    let queue = TrainingQueue::spawn(
        orchestrator.clone(),
        config.training_concurrency,
        DEFAULT_QUEUE_CAPACITY,
    );

    let scheduler = JobScheduler::new().await?;
    schedule_jobs(&scheduler, orchestrator.clone()).await?;

    let addr: SocketAddr = config.webhook_bind_addr.parse()?;
    let completion_handler: Arc<dyn CompletionHandler> = orchestrator.clone();
    tokio::spawn(async move {
        if let Err(e) = neuro_server::serve(addr, completion_handler).await {
            log::error!("Webhook server stopped: {}", e);
        }
    });

    let mut dispatchers = Vec::new();
    for (bot_name, bot) in bots {
        if let Err(e) = bot.set_my_commands(Command::bot_commands()).await {
            log::warn!("Failed to set commands for {}: {}", bot_name, e);
        }

        let bot_deps = BotDependencies {
            bot_name: bot_name.clone(),
            ledger: ledger.clone(),
            orchestrator: orchestrator.clone(),
            queue: queue.clone(),
        };

        log::info!("Dispatching updates for {}", bot_name);
        dispatchers.push(async move {
            Dispatcher::builder(bot, handler_schema())
                .dependencies(dptree::deps![bot_deps])
                .enable_ctrlc_handler()
                .build()
                .dispatch()
                .await
        });
    }

    futures::future::join_all(dispatchers).await;
    db.flush_async().await?;
    Ok(())
}
