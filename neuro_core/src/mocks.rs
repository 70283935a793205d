//! In-memory doubles of every collaborator the orchestrator talks to.
//!
//! Enabled with the `test-support` feature:
//!
//! ```toml
//! [dev-dependencies]
//! neuro_core = { workspace = true, features = ["test-support"] }
//! ```

use std::collections::HashMap;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::balance::{BalanceLedger, BalanceReason, DeltaApplied, Stars};
use crate::clock::Clock;
use crate::error::{LedgerError, NotificationError, ProviderError, StoreError};
use crate::notify::{MessageAction, Notifier, Recipient};
use crate::provider::{SubmittedTraining, TrainingInputs, TrainingProvider};
use crate::training::dto::{TrainingPatch, TrainingRecord, TrainingStatus};
use crate::training::store::TrainingStore;

// ── MockLedger ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub telegram_id: i64,
    pub delta: i64,
    pub reason: BalanceReason,
    pub operation_id: String,
}

/// Balance ledger with the same operation-id dedupe as the durable one.
#[derive(Clone, Default)]
pub struct MockLedger {
    balances: Arc<Mutex<HashMap<i64, i64>>>,
    applied: Arc<Mutex<HashMap<String, i64>>>,
    entries: Arc<Mutex<Vec<LedgerEntry>>>,
    fail_reads: Arc<AtomicBool>,
    fail_debits: Arc<AtomicBool>,
    fail_refunds: Arc<AtomicBool>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(self, telegram_id: i64, amount: i64) -> Self {
        self.set_balance(telegram_id, amount);
        self
    }

    pub fn set_balance(&self, telegram_id: i64, amount: i64) {
        self.balances.lock().unwrap().insert(telegram_id, amount);
    }

    pub fn balance_of(&self, telegram_id: i64) -> i64 {
        self.balances
            .lock()
            .unwrap()
            .get(&telegram_id)
            .copied()
            .unwrap_or(0)
    }

    /// Deltas that actually changed a balance, in order.
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn entries_with(&self, reason: BalanceReason) -> Vec<LedgerEntry> {
        self.entries()
            .into_iter()
            .filter(|entry| entry.reason == reason)
            .collect()
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_debits(&self, fail: bool) {
        self.fail_debits.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refunds(&self, fail: bool) {
        self.fail_refunds.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BalanceLedger for MockLedger {
    async fn balance(&self, telegram_id: i64) -> Result<Stars, LedgerError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("mock balance read failure".into()));
        }
        Ok(Stars(self.balance_of(telegram_id)))
    }

    async fn apply_delta(
        &self,
        telegram_id: i64,
        delta: i64,
        reason: BalanceReason,
        operation_id: &str,
    ) -> Result<DeltaApplied, LedgerError> {
        let failing = if delta < 0 {
            &self.fail_debits
        } else {
            &self.fail_refunds
        };
        if failing.load(Ordering::SeqCst) {
            return Err(LedgerError::Storage("mock ledger write failure".into()));
        }

        let mut applied = self.applied.lock().unwrap();
        if let Some(balance) = applied.get(operation_id) {
            return Ok(DeltaApplied {
                balance: Stars(*balance),
                duplicate: true,
            });
        }
        let mut balances = self.balances.lock().unwrap();
        let balance = balances.entry(telegram_id).or_insert(0);
        *balance += delta;
        applied.insert(operation_id.to_string(), *balance);
        self.entries.lock().unwrap().push(LedgerEntry {
            telegram_id,
            delta,
            reason,
            operation_id: operation_id.to_string(),
        });
        Ok(DeltaApplied {
            balance: Stars(*balance),
            duplicate: false,
        })
    }
}

// ── MockTrainingStore ────────────────────────────────────────────────────────

#[derive(Clone, Default)]
pub struct MockTrainingStore {
    records: Arc<Mutex<Vec<TrainingRecord>>>,
    read_error: Arc<Mutex<Option<StoreError>>>,
    create_error: Arc<Mutex<Option<StoreError>>>,
    update_error: Arc<Mutex<Option<StoreError>>>,
    mark_error: Arc<Mutex<Option<StoreError>>>,
}

impl MockTrainingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, record: TrainingRecord) {
        self.records.lock().unwrap().push(record);
    }

    pub fn records(&self) -> Vec<TrainingRecord> {
        self.records.lock().unwrap().clone()
    }

    pub fn record(&self, id: &str) -> Option<TrainingRecord> {
        self.records().into_iter().find(|record| record.id == id)
    }

    /// Makes `find_active` fail with `error`.
    pub fn fail_reads(&self, error: StoreError) {
        *self.read_error.lock().unwrap() = Some(error);
    }

    pub fn fail_creates(&self, error: StoreError) {
        *self.create_error.lock().unwrap() = Some(error);
    }

    pub fn fail_updates(&self, error: StoreError) {
        *self.update_error.lock().unwrap() = Some(error);
    }

    pub fn restore_updates(&self) {
        *self.update_error.lock().unwrap() = None;
    }

    pub fn fail_submission_marks(&self, error: StoreError) {
        *self.mark_error.lock().unwrap() = Some(error);
    }

    fn injected(slot: &Mutex<Option<StoreError>>) -> Result<(), StoreError> {
        match slot.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TrainingStore for MockTrainingStore {
    async fn find_active(
        &self,
        telegram_id: i64,
        model_name: &str,
    ) -> Result<Option<TrainingRecord>, StoreError> {
        Self::injected(&self.read_error)?;
        Ok(self
            .records()
            .into_iter()
            .filter(|record| {
                record.telegram_id == telegram_id
                    && record.model_name == model_name
                    && record.status.is_open()
            })
            .max_by_key(|record| record.created_at))
    }

    async fn create_record(&self, record: TrainingRecord) -> Result<TrainingRecord, StoreError> {
        Self::injected(&self.create_error)?;
        self.insert(record.clone());
        Ok(record)
    }

    async fn update_record(&self, id: &str, patch: TrainingPatch) -> Result<(), StoreError> {
        Self::injected(&self.update_error)?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if let Some(status) = patch.status {
            record.status = status;
        }
        if patch.external_job_id.is_some() {
            record.external_job_id = patch.external_job_id;
        }
        if patch.cancel_url.is_some() {
            record.cancel_url = patch.cancel_url;
        }
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn mark_submission_started(&self, id: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        Self::injected(&self.mark_error)?;
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if record.status == TrainingStatus::Pending {
            record.submission_started_at = Some(at);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn get_record(&self, id: &str) -> Result<Option<TrainingRecord>, StoreError> {
        Ok(self.record(id))
    }

    async fn find_by_external_job(&self, job_id: &str) -> Result<Option<TrainingRecord>, StoreError> {
        Ok(self
            .records()
            .into_iter()
            .find(|record| record.external_job_id.as_deref() == Some(job_id)))
    }

    async fn transition(
        &self,
        id: &str,
        from: &[TrainingStatus],
        to: TrainingStatus,
    ) -> Result<Option<TrainingRecord>, StoreError> {
        let mut records = self.records.lock().unwrap();
        let record = records
            .iter_mut()
            .find(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        if !from.contains(&record.status) {
            return Ok(None);
        }
        record.status = to;
        record.updated_at = Utc::now();
        Ok(Some(record.clone()))
    }

    async fn list_stale_pending(
        &self,
        created_before: DateTime<Utc>,
    ) -> Result<Vec<TrainingRecord>, StoreError> {
        Ok(self
            .records()
            .into_iter()
            .filter(|record| {
                record.status == TrainingStatus::Pending
                    && record.external_job_id.is_none()
                    && record.created_at < created_before
            })
            .collect())
    }
}

// ── MockProvider ─────────────────────────────────────────────────────────────

type SubmitHook = Box<dyn FnOnce() + Send>;

/// Scriptable training provider. Hands out `job_id` (default `abc123`) and
/// records every call.
#[derive(Clone)]
pub struct MockProvider {
    job_id: Arc<Mutex<String>>,
    submissions: Arc<Mutex<Vec<(String, TrainingInputs)>>>,
    canceled: Arc<Mutex<Vec<String>>>,
    ensure_calls: Arc<AtomicUsize>,
    ensure_error: Arc<Mutex<Option<ProviderError>>>,
    submit_error: Arc<Mutex<Option<ProviderError>>>,
    cancel_error: Arc<Mutex<Option<ProviderError>>>,
    before_submit: Arc<Mutex<Option<SubmitHook>>>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            job_id: Arc::new(Mutex::new("abc123".to_string())),
            submissions: Arc::default(),
            canceled: Arc::default(),
            ensure_calls: Arc::default(),
            ensure_error: Arc::default(),
            submit_error: Arc::default(),
            cancel_error: Arc::default(),
            before_submit: Arc::default(),
        }
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_job_id(&self, job_id: &str) {
        *self.job_id.lock().unwrap() = job_id.to_string();
    }

    pub fn fail_ensure(&self, error: ProviderError) {
        *self.ensure_error.lock().unwrap() = Some(error);
    }

    pub fn fail_submissions(&self, error: ProviderError) {
        *self.submit_error.lock().unwrap() = Some(error);
    }

    pub fn fail_cancels(&self, error: ProviderError) {
        *self.cancel_error.lock().unwrap() = Some(error);
    }

    /// Runs `hook` once, at the start of the next `submit_training` call.
    pub fn before_next_submit(&self, hook: impl FnOnce() + Send + 'static) {
        *self.before_submit.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn submissions(&self) -> Vec<(String, TrainingInputs)> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn submit_count(&self) -> usize {
        self.submissions.lock().unwrap().len()
    }

    pub fn ensure_count(&self) -> usize {
        self.ensure_calls.load(Ordering::SeqCst)
    }

    pub fn canceled_jobs(&self) -> Vec<String> {
        self.canceled.lock().unwrap().clone()
    }
}

#[async_trait]
impl TrainingProvider for MockProvider {
    async fn ensure_model(&self, model_name: &str, _trigger_word: &str) -> Result<String, ProviderError> {
        self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.ensure_error.lock().unwrap().clone() {
            return Err(error);
        }
        Ok(format!("neuro/{}", model_name))
    }

    async fn submit_training(
        &self,
        destination: &str,
        inputs: &TrainingInputs,
    ) -> Result<SubmittedTraining, ProviderError> {
        let hook = self.before_submit.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        self.submissions
            .lock()
            .unwrap()
            .push((destination.to_string(), inputs.clone()));
        if let Some(error) = self.submit_error.lock().unwrap().clone() {
            return Err(error);
        }
        let job_id = self.job_id.lock().unwrap().clone();
        Ok(SubmittedTraining {
            cancel_url: Some(format!("https://provider.test/trainings/{}/cancel", job_id)),
            job_id,
        })
    }

    async fn cancel_training(&self, job_id: &str) -> Result<(), ProviderError> {
        self.canceled.lock().unwrap().push(job_id.to_string());
        match self.cancel_error.lock().unwrap().clone() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

// ── MockNotifier ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SentMessage {
    pub recipient: Recipient,
    pub text: String,
    pub action: Option<MessageAction>,
}

#[derive(Clone, Default)]
pub struct MockNotifier {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    fail: Arc<AtomicBool>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<SentMessage> {
        self.sent.lock().unwrap().last().cloned()
    }

    /// Every send fails; attempts are still recorded.
    pub fn fail_all(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send_user_message(
        &self,
        recipient: &Recipient,
        text: &str,
        action: Option<MessageAction>,
    ) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(SentMessage {
            recipient: recipient.clone(),
            text: text.to_string(),
            action,
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err(NotificationError::Delivery("mock delivery failure".into()));
        }
        Ok(())
    }
}

// ── MockClock ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
pub struct MockClock {
    now_ms: Arc<AtomicI64>,
}

impl MockClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: chrono::Duration) {
        self.advance_ms(by.num_milliseconds());
    }
}

impl Clock for MockClock {
    fn now(&self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default()
    }

    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
