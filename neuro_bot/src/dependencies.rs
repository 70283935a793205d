use std::sync::Arc;

use neuro_core::training::TrainingOrchestrator;

use crate::balance::SledBalanceLedger;
use crate::training::TrainingQueue;

#[derive(Clone)]
pub struct BotDependencies {
    /// Name this bot is registered under; notifications are routed back by it.
    pub bot_name: String,
    pub ledger: Arc<SledBalanceLedger>,
    pub orchestrator: Arc<TrainingOrchestrator>,
    pub queue: TrainingQueue,
}
