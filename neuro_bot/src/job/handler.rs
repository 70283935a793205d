use std::sync::Arc;

use anyhow::Result;
use neuro_core::training::TrainingOrchestrator;
use tokio_cron_scheduler::Job;

/// Every five minutes: give up on pending trainings that never got a job id
/// and refund them.
pub fn job_stale_training_sweep(orchestrator: Arc<TrainingOrchestrator>) -> Result<Job> {
    let job = Job::new_async("0 */5 * * * *", move |_uuid, _l| {
        let orchestrator = orchestrator.clone();
        Box::pin(async move {
            log::info!("Running stale training sweep...");
            let swept = orchestrator.sweep_stale_pending().await;
            if swept > 0 {
                log::warn!("Stale training sweep refunded {} pending trainings", swept);
            }
        })
    })?;
    Ok(job)
}
