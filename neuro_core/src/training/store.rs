use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreError;
use crate::training::dto::{TrainingPatch, TrainingRecord, TrainingStatus};

/// Durable registry of training attempts; the cross-process source of truth.
#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// Most recent pending or active record for the pair, if any.
    async fn find_active(
        &self,
        telegram_id: i64,
        model_name: &str,
    ) -> Result<Option<TrainingRecord>, StoreError>;

    async fn create_record(&self, record: TrainingRecord) -> Result<TrainingRecord, StoreError>;

    async fn update_record(&self, id: &str, patch: TrainingPatch) -> Result<(), StoreError>;

    /// Stamps a pending record with the moment its provider submission began.
    /// Must be durable before the provider is called.
    async fn mark_submission_started(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    async fn get_record(&self, id: &str) -> Result<Option<TrainingRecord>, StoreError>;

    async fn find_by_external_job(&self, job_id: &str) -> Result<Option<TrainingRecord>, StoreError>;

    /// Atomically moves a record whose status is in `from` to `to`.
    ///
    /// Returns the updated record only to the caller that performed the
    /// transition; `None` when the record was already elsewhere.
    async fn transition(
        &self,
        id: &str,
        from: &[TrainingStatus],
        to: TrainingStatus,
    ) -> Result<Option<TrainingRecord>, StoreError>;

    /// Pending records that never received an external job id and were created
    /// before `created_before`, whether or not their submission had started.
    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<TrainingRecord>, StoreError>;
}
