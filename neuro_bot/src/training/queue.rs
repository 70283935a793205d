use std::sync::Arc;

use anyhow::{Result, anyhow};
use neuro_core::training::{TrainingEvent, TrainingOrchestrator, TrainingOutcome};
use tokio::sync::{Semaphore, mpsc};

pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// In-process stand-in for the `model-training/start` event bus. Events are
/// handed to the orchestrator with at most `concurrency` submissions in flight.
#[derive(Clone)]
pub struct TrainingQueue {
    sender: mpsc::Sender<TrainingEvent>,
}

impl TrainingQueue {
    pub fn spawn(orchestrator: Arc<TrainingOrchestrator>, concurrency: usize, capacity: usize) -> Self {
        let (sender, mut receiver) = mpsc::channel::<TrainingEvent>(capacity.max(1));
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));

        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                let permit = match permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        log::error!("Training queue semaphore closed: {}", e);
                        break;
                    }
                };
                let orchestrator = orchestrator.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    let key = event.idempotency_key();
                    match orchestrator.submit(event).await {
                        TrainingOutcome::Started {
                            external_job_id, ..
                        } => log::info!("{} started as {}", key, external_job_id),
                        TrainingOutcome::DuplicateActive { source, .. } => {
                            log::info!("{} skipped, already active ({:?})", key, source)
                        }
                        TrainingOutcome::Failed { stage, error, .. } => {
                            log::warn!("{} failed at {:?}: {}", key, stage, error)
                        }
                    }
                });
            }
            log::info!("Training queue stopped");
        });

        Self { sender }
    }

    pub async fn enqueue(&self, event: TrainingEvent) -> Result<()> {
        log::info!("Queueing training event {}", event.idempotency_key());
        self.sender
            .send(event)
            .await
            .map_err(|e| anyhow!("Training queue is closed: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuro_core::mocks::{MockClock, MockLedger, MockNotifier, MockProvider, MockTrainingStore};
    use neuro_core::training::{
        InMemoryTrainingCache, LanguageFlag, OrchestratorConfig, OrchestratorDeps, StepsInput,
    };
    use tokio::time::{Duration, sleep, timeout};

    fn event(telegram_id: i64, model: &str) -> TrainingEvent {
        TrainingEvent {
            bot_name: "neuro_blogger_bot".to_string(),
            telegram_id: telegram_id.to_string(),
            model_name: model.to_string(),
            steps: StepsInput::Int(1000),
            trigger_word: "person1".to_string(),
            zip_url: "https://example.com/training-images.zip".to_string(),
            is_ru: LanguageFlag::Bool(false),
        }
    }

    #[tokio::test]
    async fn queued_events_reach_the_provider() {
        let provider = MockProvider::new();
        let ledger = MockLedger::new().with_balance(1, 1000).with_balance(2, 1000);
        let orchestrator = Arc::new(TrainingOrchestrator::new(
            OrchestratorConfig::default(),
            OrchestratorDeps {
                cache: Arc::new(InMemoryTrainingCache::new()),
                ledger: Arc::new(ledger.clone()),
                store: Arc::new(MockTrainingStore::new()),
                provider: Arc::new(provider.clone()),
                notifier: Arc::new(MockNotifier::new()),
                clock: Arc::new(MockClock::new(1_700_000_000_000)),
            },
        ));
        let queue = TrainingQueue::spawn(orchestrator, 1, 8);

        queue.enqueue(event(1, "first")).await.unwrap();
        queue.enqueue(event(2, "second")).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while provider.submit_count() < 2 {
                sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(ledger.balance_of(1), 500);
        assert_eq!(ledger.balance_of(2), 500);
    }
}
