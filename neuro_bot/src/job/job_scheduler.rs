use std::sync::Arc;

use anyhow::Result;
use neuro_core::training::TrainingOrchestrator;
use tokio_cron_scheduler::JobScheduler;

use crate::job::handler::job_stale_training_sweep;

pub async fn schedule_jobs(
    scheduler: &JobScheduler,
    orchestrator: Arc<TrainingOrchestrator>,
) -> Result<()> {
    log::info!("Initializing job scheduler...");

    let job_stale_training_sweep = job_stale_training_sweep(orchestrator).map_err(|e| {
        log::error!("Failed to build stale training sweep job: {}", e);
        anyhow::anyhow!("Failed to build stale training sweep job: {}", e)
    })?;

    if let Err(e) = scheduler.add(job_stale_training_sweep).await {
        log::error!("Failed to add stale training sweep job to scheduler: {}", e);
        return Err(anyhow::anyhow!("Failed to add stale training sweep job: {}", e));
    }

    if let Err(e) = scheduler.start().await {
        log::error!("Failed to start job scheduler: {}", e);
        return Err(anyhow::anyhow!("Failed to start scheduler: {}", e));
    }

    log::info!("Job scheduler started");
    Ok(())
}
