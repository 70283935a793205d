use async_trait::async_trait;
use chrono::{DateTime, Utc};
use neuro_core::error::StoreError;
use neuro_core::training::{TrainingPatch, TrainingRecord, TrainingStatus, TrainingStore};
use sled::{Db, Tree};

const TRAINING_RECORDS_TREE: &str = "training_records";
const TRAINING_JOBS_TREE: &str = "training_jobs";

/// Sled-backed training registry. Records are keyed by id; `jobs` maps an
/// external job id back to its record.
#[derive(Clone)]
pub struct SledTrainingStore {
    pub records: Tree,
    pub jobs: Tree,
}

fn storage_error(e: sled::Error) -> StoreError {
    StoreError::Storage(e.to_string())
}

fn decode(id: &str, raw: &[u8]) -> Result<TrainingRecord, StoreError> {
    serde_json::from_slice(raw).map_err(|e| StoreError::Decode {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

fn encode(record: &TrainingRecord) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(record).map_err(|e| StoreError::Storage(e.to_string()))
}

impl SledTrainingStore {
    pub fn new(db: &Db) -> sled::Result<Self> {
        let records = db.open_tree(TRAINING_RECORDS_TREE)?;
        let jobs = db.open_tree(TRAINING_JOBS_TREE)?;
        Ok(Self { records, jobs })
    }

    /// Every decodable record. Corrupted entries are logged and skipped.
    fn scan(&self) -> Result<Vec<TrainingRecord>, StoreError> {
        let mut out = Vec::new();
        for kv in self.records.iter() {
            let (key, ivec) = kv.map_err(storage_error)?;
            let id = String::from_utf8_lossy(&key).to_string();
            match decode(&id, &ivec) {
                Ok(record) => out.push(record),
                Err(e) => log::error!("{}", e),
            }
        }
        Ok(out)
    }

    fn index_job(&self, record: &TrainingRecord) -> Result<(), StoreError> {
        if let Some(job_id) = &record.external_job_id {
            self.jobs
                .insert(job_id.as_bytes(), record.id.as_bytes())
                .map_err(storage_error)?;
        }
        Ok(())
    }

    /// Compare-and-swap loop over one record. `change` returns `None` to leave
    /// the record untouched; the result is the record as written.
    fn modify<F>(&self, id: &str, change: F) -> Result<Option<TrainingRecord>, StoreError>
    where
        F: Fn(&TrainingRecord) -> Option<TrainingRecord>,
    {
        loop {
            let current = self
                .records
                .get(id.as_bytes())
                .map_err(storage_error)?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            let record = decode(id, &current)?;

            let mut next = match change(&record) {
                Some(next) => next,
                None => return Ok(None),
            };
            next.updated_at = Utc::now();

            let swapped = self
                .records
                .compare_and_swap(id.as_bytes(), Some(&current), Some(encode(&next)?))
                .map_err(storage_error)?;
            match swapped {
                Ok(()) => return Ok(Some(next)),
                Err(_) => {
                    log::debug!("Training record {} changed concurrently, retrying", id);
                    continue;
                }
            }
        }
    }
}

#[async_trait]
impl TrainingStore for SledTrainingStore {
    async fn find_active(
        &self,
        telegram_id: i64,
        model_name: &str,
    ) -> Result<Option<TrainingRecord>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| r.telegram_id == telegram_id && r.model_name == model_name)
            .filter(|r| r.status.is_open())
            .max_by_key(|r| r.created_at))
    }

    async fn create_record(&self, record: TrainingRecord) -> Result<TrainingRecord, StoreError> {
        let created = self
            .records
            .compare_and_swap(record.id.as_bytes(), None::<&[u8]>, Some(encode(&record)?))
            .map_err(storage_error)?;
        if created.is_err() {
            return Err(StoreError::Storage(format!(
                "training record {} already exists",
                record.id
            )));
        }
        self.index_job(&record)?;
        log::info!(
            "Created training record {} for {}:{}",
            record.id,
            record.telegram_id,
            record.model_name
        );
        Ok(record)
    }

    async fn update_record(&self, id: &str, patch: TrainingPatch) -> Result<(), StoreError> {
        let updated = self.modify(id, |record| {
            let mut next = record.clone();
            if let Some(status) = patch.status {
                next.status = status;
            }
            if let Some(job_id) = &patch.external_job_id {
                next.external_job_id = Some(job_id.clone());
            }
            if let Some(cancel_url) = &patch.cancel_url {
                next.cancel_url = Some(cancel_url.clone());
            }
            Some(next)
        })?;
        if let Some(record) = updated {
            self.index_job(&record)?;
        }
        Ok(())
    }

    async fn mark_submission_started(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.modify(id, |record| {
            if record.status != TrainingStatus::Pending {
                return None;
            }
            let mut next = record.clone();
            next.submission_started_at = Some(at);
            Some(next)
        })?;
        // Durable before the provider call.
        self.records.flush().map_err(storage_error)?;
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<TrainingRecord>, StoreError> {
        match self.records.get(id.as_bytes()).map_err(storage_error)? {
            Some(ivec) => decode(id, &ivec).map(Some),
            None => Ok(None),
        }
    }

    async fn find_by_external_job(&self, job_id: &str) -> Result<Option<TrainingRecord>, StoreError> {
        let record_id = match self.jobs.get(job_id.as_bytes()).map_err(storage_error)? {
            Some(ivec) => String::from_utf8_lossy(&ivec).to_string(),
            None => return Ok(None),
        };
        self.get_record(&record_id).await
    }

    async fn transition(
        &self,
        id: &str,
        from: &[TrainingStatus],
        to: TrainingStatus,
    ) -> Result<Option<TrainingRecord>, StoreError> {
        let moved = self.modify(id, |record| {
            if !from.contains(&record.status) {
                return None;
            }
            let mut next = record.clone();
            next.status = to;
            Some(next)
        })?;
        if let Some(record) = &moved {
            log::info!("Training record {} moved to {:?}", record.id, to);
        }
        Ok(moved)
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<TrainingRecord>, StoreError> {
        Ok(self
            .scan()?
            .into_iter()
            .filter(|r| r.status == TrainingStatus::Pending)
            .filter(|r| r.external_job_id.is_none())
            .filter(|r| r.created_at < created_before)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use neuro_core::balance::Stars;
    use neuro_core::messages::Language;

    fn store() -> SledTrainingStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        SledTrainingStore::new(&db).unwrap()
    }

    fn record(id: &str, model: &str, status: TrainingStatus, created_at: DateTime<Utc>) -> TrainingRecord {
        TrainingRecord {
            id: id.to_string(),
            telegram_id: 144022504,
            bot_name: "neuro_blogger_bot".to_string(),
            model_name: model.to_string(),
            trigger_word: "person1".to_string(),
            source_archive_url: "https://example.com/training-images.zip".to_string(),
            steps: 1500,
            external_job_id: None,
            cancel_url: None,
            status,
            charged_stars: Stars(750),
            charge_operation_id: format!("train-{}", id),
            language: Language::En,
            submission_started_at: None,
            created_at,
            updated_at: created_at,
        }
    }

    #[tokio::test]
    async fn find_active_returns_latest_open_record_for_pair() {
        let store = store();
        let now = Utc::now();
        store
            .create_record(record("old", "m", TrainingStatus::Active, now - chrono::Duration::hours(2)))
            .await
            .unwrap();
        store
            .create_record(record("new", "m", TrainingStatus::Pending, now))
            .await
            .unwrap();
        store
            .create_record(record("done", "m", TrainingStatus::Completed, now))
            .await
            .unwrap();
        store
            .create_record(record("other", "other_model", TrainingStatus::Active, now))
            .await
            .unwrap();

        let found = store.find_active(144022504, "m").await.unwrap().unwrap();
        assert_eq!(found.id, "new");
        assert!(store.find_active(1, "m").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_record_id_is_rejected() {
        let store = store();
        let r = record("r1", "m", TrainingStatus::Pending, Utc::now());
        store.create_record(r.clone()).await.unwrap();
        assert!(store.create_record(r).await.is_err());
    }

    #[tokio::test]
    async fn patch_indexes_external_job() {
        let store = store();
        store
            .create_record(record("r1", "m", TrainingStatus::Pending, Utc::now()))
            .await
            .unwrap();
        store
            .update_record(
                "r1",
                TrainingPatch {
                    status: Some(TrainingStatus::Active),
                    external_job_id: Some("abc123".to_string()),
                    cancel_url: Some("https://api.replicate.com/v1/trainings/abc123/cancel".to_string()),
                },
            )
            .await
            .unwrap();

        let found = store.find_by_external_job("abc123").await.unwrap().unwrap();
        assert_eq!(found.id, "r1");
        assert_eq!(found.status, TrainingStatus::Active);
        assert!(store.find_by_external_job("nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_of_missing_record_fails() {
        let err = store()
            .update_record("ghost", TrainingPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound("ghost".to_string()));
    }

    #[tokio::test]
    async fn transition_happens_once() {
        let store = store();
        store
            .create_record(record("r1", "m", TrainingStatus::Active, Utc::now()))
            .await
            .unwrap();

        let first = store
            .transition("r1", &TrainingStatus::OPEN, TrainingStatus::Completed)
            .await
            .unwrap();
        let second = store
            .transition("r1", &TrainingStatus::OPEN, TrainingStatus::Failed)
            .await
            .unwrap();

        assert_eq!(first.unwrap().status, TrainingStatus::Completed);
        assert!(second.is_none());
        assert_eq!(
            store.get_record("r1").await.unwrap().unwrap().status,
            TrainingStatus::Completed
        );
    }

    #[tokio::test]
    async fn stale_pending_excludes_fresh_and_submitted_records() {
        let store = store();
        let now = Utc::now();
        let hour_ago = now - chrono::Duration::hours(1);
        store
            .create_record(record("stale", "a", TrainingStatus::Pending, hour_ago))
            .await
            .unwrap();
        store
            .create_record(record("fresh", "b", TrainingStatus::Pending, now))
            .await
            .unwrap();
        let mut submitted = record("submitted", "c", TrainingStatus::Pending, hour_ago);
        submitted.external_job_id = Some("job".to_string());
        store.create_record(submitted).await.unwrap();

        let stale = store
            .list_stale_pending(now - chrono::Duration::minutes(30))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, "stale");
    }

    #[tokio::test]
    async fn submission_mark_survives_reload_and_only_touches_pending() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledTrainingStore::new(&db).unwrap();
        let hour_ago = Utc::now() - chrono::Duration::hours(1);
        store
            .create_record(record("pending", "a", TrainingStatus::Pending, hour_ago))
            .await
            .unwrap();
        store
            .create_record(record("done", "b", TrainingStatus::Completed, hour_ago))
            .await
            .unwrap();

        let at = Utc::now();
        store.mark_submission_started("pending", at).await.unwrap();
        store.mark_submission_started("done", at).await.unwrap();

        let reopened = SledTrainingStore::new(&db).unwrap();
        let marked = reopened.get_record("pending").await.unwrap().unwrap();
        assert_eq!(marked.submission_started_at, Some(at));
        assert_eq!(marked.status, TrainingStatus::Pending);
        assert!(reopened.get_record("done").await.unwrap().unwrap().submission_started_at.is_none());

        let stale = reopened.list_stale_pending(Utc::now()).await.unwrap();
        assert_eq!(stale.len(), 1);
        assert!(stale[0].submission_started_at.is_some());
        assert_eq!(
            reopened.mark_submission_started("ghost", at).await.unwrap_err(),
            StoreError::NotFound("ghost".to_string())
        );
    }

    #[test]
    fn records_written_before_the_submission_mark_still_decode() {
        let mut legacy = serde_json::to_value(record("old", "m", TrainingStatus::Pending, Utc::now())).unwrap();
        legacy.as_object_mut().unwrap().remove("submission_started_at");
        let raw = serde_json::to_vec(&legacy).unwrap();

        let decoded = decode("old", &raw).unwrap();
        assert!(decoded.submission_started_at.is_none());
    }

    #[tokio::test]
    async fn corrupted_record_is_skipped_by_scans() {
        let store = store();
        store.records.insert("broken", "not json").unwrap();
        store
            .create_record(record("ok", "m", TrainingStatus::Active, Utc::now()))
            .await
            .unwrap();

        assert_eq!(store.find_active(144022504, "m").await.unwrap().unwrap().id, "ok");
        assert!(matches!(
            store.get_record("broken").await,
            Err(StoreError::Decode { .. })
        ));
    }
}
