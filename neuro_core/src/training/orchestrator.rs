use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;

use crate::balance::{BalanceLedger, BalanceReason, Stars};
use crate::clock::Clock;
use crate::error::{ProviderError, ProviderErrorKind, StoreError, TrainingError};
use crate::messages;
use crate::notify::{MessageAction, Notifier, Recipient};
use crate::pricing::Pricing;
use crate::provider::{SubmittedTraining, TrainingInputs, TrainingProvider};
use crate::training::cache::{CacheStatus, TRAINING_CACHE_TTL_MS, TrainingCache};
use crate::training::cancellation::{CancelHandle, CancellationRegistry};
use crate::training::dto::{
    CancelOutcome, CompletionEvent, CompletionOutcome, CompletionStatus, SubmissionStage,
    TrainingEvent, TrainingPatch, TrainingRecord, TrainingRequest, TrainingStatus,
    TrainingOutcome, refund_operation_id,
};
use crate::training::guard::{ActiveDetail, ActiveSource, DuplicateGuard};
use crate::training::store::TrainingStore;
use crate::training::validate::validate_event;

/// Writes of a freshly started job id before it is kept in memory only.
const JOB_LINK_ATTEMPTS: usize = 3;

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub pricing: Pricing,
    pub cache_ttl_ms: i64,
    /// Age after which a `pending` record without a job id is given up on.
    pub stale_pending_after: chrono::Duration,
    /// Base for relative archive URLs.
    pub api_base_url: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            pricing: Pricing::default(),
            cache_ttl_ms: TRAINING_CACHE_TTL_MS,
            stale_pending_after: chrono::Duration::minutes(30),
            api_base_url: String::new(),
        }
    }
}

/// Collaborators the orchestrator drives.
#[derive(Clone)]
pub struct OrchestratorDeps {
    pub cache: Arc<dyn TrainingCache>,
    pub ledger: Arc<dyn BalanceLedger>,
    pub store: Arc<dyn TrainingStore>,
    pub provider: Arc<dyn TrainingProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
}

/// Receives provider completion callbacks.
#[async_trait]
pub trait CompletionHandler: Send + Sync {
    async fn handle_completion(&self, event: CompletionEvent) -> CompletionOutcome;
}

/// Charge state of one submission attempt. `compensated` is the single flag
/// that keeps a refund from being issued twice within the attempt.
struct Submission {
    charge: Stars,
    charge_operation_id: String,
    charged: bool,
    compensated: bool,
}

impl Submission {
    fn new(request: &TrainingRequest, charge: Stars) -> Self {
        Self {
            charge,
            charge_operation_id: format!(
                "train-{}-{}",
                request.telegram_id,
                uuid::Uuid::new_v4()
            ),
            charged: false,
            compensated: false,
        }
    }
}

/// Runs a training submission from event to started job, and settles it when
/// the provider reports back.
pub struct TrainingOrchestrator {
    config: OrchestratorConfig,
    step_rate_bits: AtomicU64,
    guard: DuplicateGuard,
    cancellations: CancellationRegistry,
    /// Started jobs whose id never reached the record, keyed by record id.
    unlinked: DashMap<String, SubmittedTraining>,
    ledger: Arc<dyn BalanceLedger>,
    store: Arc<dyn TrainingStore>,
    provider: Arc<dyn TrainingProvider>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl TrainingOrchestrator {
    pub fn new(config: OrchestratorConfig, deps: OrchestratorDeps) -> Self {
        let guard = DuplicateGuard::new(
            deps.cache,
            deps.store.clone(),
            deps.clock.clone(),
            config.cache_ttl_ms,
        );
        Self {
            step_rate_bits: AtomicU64::new(config.pricing.stars_per_step.to_bits()),
            config,
            guard,
            cancellations: CancellationRegistry::new(),
            unlinked: DashMap::new(),
            ledger: deps.ledger,
            store: deps.store,
            provider: deps.provider,
            notifier: deps.notifier,
            clock: deps.clock,
        }
    }

    pub fn pricing(&self) -> Pricing {
        Pricing::new(f64::from_bits(self.step_rate_bits.load(Ordering::SeqCst)))
    }

    /// Affects submissions that have not been charged yet. In-flight ones keep
    /// the amount captured at charge time.
    pub fn set_pricing(&self, pricing: Pricing) {
        log::info!("Training price set to {} stars per step", pricing.stars_per_step);
        self.step_rate_bits
            .store(pricing.stars_per_step.to_bits(), Ordering::SeqCst);
    }

    pub fn guard(&self) -> &DuplicateGuard {
        &self.guard
    }

    pub fn cancellations(&self) -> &CancellationRegistry {
        &self.cancellations
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub async fn submit(&self, event: TrainingEvent) -> TrainingOutcome {
        let lang = event.language();
        let request = match validate_event(&event, &self.config.api_base_url) {
            Ok(request) => request,
            Err(e) => {
                log::warn!(
                    "Rejected training event for user {} model {}: {}",
                    event.telegram_id,
                    event.model_name,
                    e
                );
                let error = TrainingError::from(e);
                if let Ok(telegram_id) = event.telegram_id.trim().parse::<i64>() {
                    let recipient = Recipient::new(event.bot_name.clone(), telegram_id);
                    let text = messages::training_error(lang, &messages::failure_reason(lang, &error));
                    self.notify(&recipient, &text, None).await;
                }
                return TrainingOutcome::Failed {
                    stage: SubmissionStage::Validating,
                    error,
                    refunded: None,
                };
            }
        };

        let recipient = Recipient::new(request.bot_name.clone(), request.telegram_id);
        log::info!(
            "Training submission for user {} model {} ({} steps)",
            request.telegram_id,
            request.model_name,
            request.steps
        );

        let check = self
            .guard
            .check_active(request.telegram_id, &request.model_name)
            .await;
        if check.active {
            return self
                .reject_duplicate(&request, &recipient, check.source, check.detail)
                .await;
        }
        if !self.guard.acquire(request.telegram_id, &request.model_name) {
            return self
                .reject_duplicate(&request, &recipient, ActiveSource::Cache, ActiveDetail::default())
                .await;
        }

        self.notify(&recipient, &messages::training_starting(lang), None)
            .await;

        let cost = self.pricing().training_cost(request.steps);
        let mut submission = Submission::new(&request, cost);

        let available = match self.ledger.balance(request.telegram_id).await {
            Ok(balance) => balance,
            Err(e) => {
                return self
                    .abort_uncharged(&request, &recipient, SubmissionStage::Charging, e.into())
                    .await;
            }
        };
        if available < cost {
            log::info!(
                "Insufficient balance for user {} model {}: required {}, available {}",
                request.telegram_id,
                request.model_name,
                cost,
                available
            );
            self.guard.release(request.telegram_id, &request.model_name);
            self.notify(
                &recipient,
                &messages::insufficient_balance(lang, cost, available),
                None,
            )
            .await;
            return TrainingOutcome::Failed {
                stage: SubmissionStage::Charging,
                error: TrainingError::InsufficientBalance {
                    required: cost,
                    available,
                },
                refunded: None,
            };
        }

        match self
            .ledger
            .apply_delta(
                request.telegram_id,
                cost.as_charge(),
                BalanceReason::TrainingCharge,
                &submission.charge_operation_id,
            )
            .await
        {
            Ok(applied) => {
                submission.charged = true;
                log::info!(
                    "Charged {} to user {} for model {} (op {}), balance now {}",
                    cost,
                    request.telegram_id,
                    request.model_name,
                    submission.charge_operation_id,
                    applied.balance
                );
            }
            Err(e) => {
                return self
                    .abort_uncharged(&request, &recipient, SubmissionStage::Charging, e.into())
                    .await;
            }
        }

        let pending = TrainingRecord::pending(
            &request,
            cost,
            submission.charge_operation_id.clone(),
            self.clock.now(),
        );
        let record = match self.store.create_record(pending).await {
            Ok(record) => record,
            Err(source) => {
                let error = TrainingError::Persistence {
                    stage: SubmissionStage::Charging,
                    source,
                };
                return self
                    .compensate(&request, &recipient, &mut submission, None, SubmissionStage::Charging, error)
                    .await;
            }
        };

        let destination = match self
            .provider
            .ensure_model(&request.model_name, &request.trigger_word)
            .await
        {
            Ok(destination) => destination,
            Err(e) => {
                return self
                    .compensate(
                        &request,
                        &recipient,
                        &mut submission,
                        Some(&record),
                        SubmissionStage::Submitting,
                        e.into(),
                    )
                    .await;
            }
        };

        let inputs = TrainingInputs {
            archive_url: request.archive_url.clone(),
            trigger_word: request.trigger_word.clone(),
            steps: request.steps,
        };
        if let Err(source) = self
            .store
            .mark_submission_started(&record.id, self.clock.now())
            .await
        {
            let error = TrainingError::Persistence {
                stage: SubmissionStage::Submitting,
                source,
            };
            return self
                .compensate(&request, &recipient, &mut submission, Some(&record), SubmissionStage::Submitting, error)
                .await;
        }

        let submitted = match self.provider.submit_training(&destination, &inputs).await {
            Ok(submitted) => submitted,
            Err(e) if e.kind == ProviderErrorKind::Unconfirmed => {
                return self.hold_unconfirmed(&request, &recipient, &record, e).await;
            }
            Err(e) => {
                return self
                    .compensate(
                        &request,
                        &recipient,
                        &mut submission,
                        Some(&record),
                        SubmissionStage::Submitting,
                        e.into(),
                    )
                    .await;
            }
        };
        log::info!(
            "Provider accepted training for user {} model {}: job {}",
            request.telegram_id,
            request.model_name,
            submitted.job_id
        );

        self.link_job(&request, &record, &submitted).await;
        self.guard.transition(
            request.telegram_id,
            &request.model_name,
            CacheStatus::Running,
            Some(submitted.job_id.clone()),
        );
        self.register_cancel_handle(&request, &submitted.job_id);

        self.notify(&recipient, &messages::training_submitted(lang), None)
            .await;

        TrainingOutcome::Started {
            record_id: record.id,
            external_job_id: submitted.job_id,
            charged: cost,
        }
    }

    /// Settles a job the provider reports as finished. Safe to call any number
    /// of times for the same job.
    pub async fn complete(&self, event: CompletionEvent) -> CompletionOutcome {
        let found = match self.store.find_by_external_job(&event.job_id).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => match self.unlinked_record_for(&event.job_id) {
                Some(record_id) => self.relink(&record_id).await,
                None => Ok(None),
            },
            Err(e) => Err(e),
        };
        let record = match found {
            Ok(Some(record)) => record,
            Ok(None) => {
                log::warn!("Completion for unknown job {} ({:?})", event.job_id, event.status);
                return CompletionOutcome::UnknownJob;
            }
            Err(e) => {
                log::error!("Failed to look up job {}: {}", event.job_id, e);
                return CompletionOutcome::Retry {
                    reason: e.to_string(),
                };
            }
        };

        let target = match event.status {
            CompletionStatus::Completed => TrainingStatus::Completed,
            CompletionStatus::Failed => TrainingStatus::Failed,
            CompletionStatus::Canceled => TrainingStatus::Canceled,
        };

        let record = match self
            .store
            .transition(&record.id, &TrainingStatus::OPEN, target)
            .await
        {
            Ok(Some(record)) => record,
            Ok(None) => {
                log::info!(
                    "Record {} for job {} already settled as {:?}",
                    record.id,
                    event.job_id,
                    record.status
                );
                if target != TrainingStatus::Completed
                    && matches!(record.status, TrainingStatus::Failed | TrainingStatus::Canceled)
                {
                    // Replays the refund in case the first delivery could not
                    // reach the ledger; the ledger applies it at most once.
                    if self.refund(&record).await.is_none() {
                        return CompletionOutcome::Retry {
                            reason: format!("refund for record {} still pending", record.id),
                        };
                    }
                }
                return CompletionOutcome::AlreadyTerminal {
                    record_id: record.id,
                };
            }
            Err(e) => {
                log::error!("Failed to settle record {} for job {}: {}", record.id, event.job_id, e);
                return CompletionOutcome::Retry {
                    reason: e.to_string(),
                };
            }
        };

        self.cancellations.remove_job(record.telegram_id, &event.job_id);
        self.guard.release(record.telegram_id, &record.model_name);
        let recipient = Recipient::new(record.bot_name.clone(), record.telegram_id);
        let lang = record.language;

        if target == TrainingStatus::Completed {
            log::info!(
                "Training {} for user {} model {} completed (output {:?})",
                event.job_id,
                record.telegram_id,
                record.model_name,
                event.output_ref
            );
            self.notify(&recipient, &messages::training_ready(lang, &record.model_name), None)
                .await;
            return CompletionOutcome::Completed {
                record_id: record.id,
            };
        }

        log::warn!(
            "Training {} for user {} model {} ended as {:?}: {}",
            event.job_id,
            record.telegram_id,
            record.model_name,
            target,
            event.error.as_deref().unwrap_or("no error reported")
        );
        let refunded = self.refund(&record).await;

        let mut text = if target == TrainingStatus::Canceled {
            messages::training_canceled(lang, &record.model_name)
        } else {
            let error = TrainingError::Provider(ProviderError::new(
                ProviderErrorKind::Api,
                event.error.clone().unwrap_or_default(),
            ));
            messages::training_error(lang, &messages::failure_reason(lang, &error))
        };
        if let Some(amount) = refunded {
            text.push_str("\n\n");
            text.push_str(&messages::stars_refunded(lang, amount));
        }
        self.notify(&recipient, &text, None).await;

        match refunded {
            Some(refunded) => CompletionOutcome::Compensated {
                record_id: record.id,
                status: target,
                refunded,
            },
            None => CompletionOutcome::Retry {
                reason: format!("refund for record {} failed", record.id),
            },
        }
    }

    /// Cancels the user's running job through the registry. The refund follows
    /// once the provider confirms the cancellation.
    pub async fn cancel_training(&self, telegram_id: i64) -> CancelOutcome {
        match self.cancellations.cancel(telegram_id).await {
            Some(job_id) => CancelOutcome::CancelRequested { job_id },
            None => {
                log::info!("Nothing to cancel for user {}", telegram_id);
                CancelOutcome::NothingToCancel
            }
        }
    }

    /// Cancels the job behind a specific record, e.g. from the button on the
    /// duplicate notice. Falls back to the provider when another process
    /// started the job.
    pub async fn cancel_record(&self, telegram_id: i64, record_id: &str) -> CancelOutcome {
        let record = match self.store.get_record(record_id).await {
            Ok(Some(record)) if record.telegram_id == telegram_id && record.status.is_open() => record,
            Ok(_) => return CancelOutcome::NothingToCancel,
            Err(e) => {
                log::error!("Failed to load record {} for cancel: {}", record_id, e);
                return CancelOutcome::NothingToCancel;
            }
        };
        let Some(job_id) = record.external_job_id else {
            return CancelOutcome::NothingToCancel;
        };

        if self.cancellations.job_for(telegram_id).as_deref() == Some(job_id.as_str()) {
            return self.cancel_training(telegram_id).await;
        }

        log::info!(
            "Canceling job {} of record {} directly with the provider",
            job_id,
            record_id
        );
        if let Err(e) = self.provider.cancel_training(&job_id).await {
            log::warn!("Provider cancel for job {} failed: {}", job_id, e);
        }
        CancelOutcome::CancelRequested { job_id }
    }

    /// Fails and refunds `pending` records that never got a job id. Records
    /// whose provider submission had started are never refunded here: they are
    /// linked to their job when this process still knows it, and otherwise
    /// left pending for manual review. Returns how many were settled.
    pub async fn sweep_stale_pending(&self) -> usize {
        let cutoff = self.clock.now() - self.config.stale_pending_after;
        let stale = match self.store.list_stale_pending(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                log::error!("Failed to list stale pending trainings: {}", e);
                return 0;
            }
        };

        let mut settled = 0;
        for candidate in stale {
            if let Some(started_at) = candidate.submission_started_at {
                match self.relink(&candidate.id).await {
                    Ok(Some(record)) => log::info!(
                        "Stale record {} linked to job {:?}",
                        record.id,
                        record.external_job_id
                    ),
                    Ok(None) => log::error!(
                        "CRITICAL: record {} for user {} model {} started a provider submission at {} but has no job id; needs manual review",
                        candidate.id,
                        candidate.telegram_id,
                        candidate.model_name,
                        started_at
                    ),
                    Err(e) => log::error!("Failed to link job for record {}: {}", candidate.id, e),
                }
                continue;
            }
            let record = match self
                .store
                .transition(&candidate.id, &[TrainingStatus::Pending], TrainingStatus::Failed)
                .await
            {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    log::error!("Failed to fail stale record {}: {}", candidate.id, e);
                    continue;
                }
            };
            log::warn!(
                "Stale pending training {} for user {} model {} marked failed",
                record.id,
                record.telegram_id,
                record.model_name
            );
            let refunded = self.refund(&record).await;
            self.guard.release(record.telegram_id, &record.model_name);

            let lang = record.language;
            let error = TrainingError::Provider(ProviderError::new(
                ProviderErrorKind::Network,
                "provider never confirmed the training",
            ));
            let mut text = messages::training_error(lang, &messages::failure_reason(lang, &error));
            if let Some(amount) = refunded {
                text.push_str("\n\n");
                text.push_str(&messages::stars_refunded(lang, amount));
            }
            self.notify(&Recipient::new(record.bot_name.clone(), record.telegram_id), &text, None)
                .await;
            settled += 1;
        }
        settled
    }

    fn started_patch(submitted: &SubmittedTraining) -> TrainingPatch {
        TrainingPatch {
            status: Some(TrainingStatus::Active),
            external_job_id: Some(submitted.job_id.clone()),
            cancel_url: submitted.cancel_url.clone(),
        }
    }

    /// Records the started job on its record. When every attempt fails the job
    /// id is kept in memory so completion and the sweep can link it later.
    async fn link_job(&self, request: &TrainingRequest, record: &TrainingRecord, submitted: &SubmittedTraining) {
        for attempt in 1..=JOB_LINK_ATTEMPTS {
            match self
                .store
                .update_record(&record.id, Self::started_patch(submitted))
                .await
            {
                Ok(()) => return,
                Err(e) => log::warn!(
                    "Attempt {}/{} to store job {} on record {} failed: {}",
                    attempt,
                    JOB_LINK_ATTEMPTS,
                    submitted.job_id,
                    record.id,
                    e
                ),
            }
        }
        log::error!(
            "CRITICAL: job {} for user {} model {} is running but record {} was not updated",
            submitted.job_id,
            request.telegram_id,
            request.model_name,
            record.id
        );
        self.unlinked.insert(record.id.clone(), submitted.clone());
    }

    fn unlinked_record_for(&self, job_id: &str) -> Option<String> {
        self.unlinked
            .iter()
            .find(|entry| entry.value().job_id == job_id)
            .map(|entry| entry.key().clone())
    }

    /// Retries storing a job id that [`Self::link_job`] could not persist.
    /// `Ok(None)` when this process holds no job for the record.
    async fn relink(&self, record_id: &str) -> Result<Option<TrainingRecord>, StoreError> {
        let Some(submitted) = self.unlinked.get(record_id).map(|entry| entry.value().clone()) else {
            return Ok(None);
        };
        self.store
            .update_record(record_id, Self::started_patch(&submitted))
            .await?;
        self.unlinked.remove(record_id);
        log::info!("Job {} linked to record {}", submitted.job_id, record_id);
        self.store.get_record(record_id).await
    }

    /// The provider may have started the job, so the charge stays and the
    /// record stays pending with its submission mark.
    async fn hold_unconfirmed(
        &self,
        request: &TrainingRequest,
        recipient: &Recipient,
        record: &TrainingRecord,
        error: ProviderError,
    ) -> TrainingOutcome {
        log::error!(
            "CRITICAL: submission for user {} model {} (record {}) is unconfirmed, charge kept: {}",
            request.telegram_id,
            request.model_name,
            record.id,
            error
        );
        self.notify(recipient, &messages::training_unconfirmed(request.language), None)
            .await;
        TrainingOutcome::Failed {
            stage: SubmissionStage::Submitting,
            error: error.into(),
            refunded: None,
        }
    }

    async fn reject_duplicate(
        &self,
        request: &TrainingRequest,
        recipient: &Recipient,
        source: ActiveSource,
        detail: ActiveDetail,
    ) -> TrainingOutcome {
        log::info!(
            "Duplicate training for user {} model {} rejected ({:?}, record {:?})",
            request.telegram_id,
            request.model_name,
            source,
            detail.record_id
        );
        let lang = request.language;
        let mut text = messages::duplicate_request(lang);
        let action = detail.record_id.as_deref().map(|record_id| MessageAction {
            label: messages::cancel_button_label(lang),
            callback_data: messages::cancel_callback_data(record_id),
        });
        if action.is_some() {
            text.push_str("\n\n");
            text.push_str(&messages::cancel_offer(lang));
        }
        self.notify(recipient, &text, action).await;

        TrainingOutcome::DuplicateActive {
            source,
            record_id: detail.record_id,
            external_job_id: detail.external_job_id,
        }
    }

    async fn abort_uncharged(
        &self,
        request: &TrainingRequest,
        recipient: &Recipient,
        stage: SubmissionStage,
        error: TrainingError,
    ) -> TrainingOutcome {
        log::error!(
            "Training for user {} model {} failed at {:?} before charging: {}",
            request.telegram_id,
            request.model_name,
            stage,
            error
        );
        self.guard.release(request.telegram_id, &request.model_name);
        let lang = request.language;
        let text = messages::training_error(lang, &messages::failure_reason(lang, &error));
        self.notify(recipient, &text, None).await;
        TrainingOutcome::Failed {
            stage,
            error,
            refunded: None,
        }
    }

    async fn compensate(
        &self,
        request: &TrainingRequest,
        recipient: &Recipient,
        submission: &mut Submission,
        record: Option<&TrainingRecord>,
        stage: SubmissionStage,
        error: TrainingError,
    ) -> TrainingOutcome {
        log::error!(
            "Training for user {} model {} failed at {:?}: {}",
            request.telegram_id,
            request.model_name,
            stage,
            error
        );

        let mut refunded = None;
        if submission.charged && !submission.compensated {
            submission.compensated = true;
            let owns_refund = match record {
                Some(record) => match self
                    .store
                    .transition(&record.id, &TrainingStatus::OPEN, TrainingStatus::Failed)
                    .await
                {
                    Ok(Some(_)) => true,
                    Ok(None) => {
                        log::warn!("Record {} was settled elsewhere; skipping refund", record.id);
                        false
                    }
                    Err(e) => {
                        log::error!("Failed to mark record {} failed: {}", record.id, e);
                        true
                    }
                },
                None => true,
            };
            if owns_refund {
                refunded = self
                    .apply_refund(
                        request.telegram_id,
                        submission.charge,
                        &refund_operation_id(&submission.charge_operation_id),
                    )
                    .await;
            }
        }

        self.guard.release(request.telegram_id, &request.model_name);
        if self.cancellations.model_for(request.telegram_id).as_deref() == Some(request.model_name.as_str()) {
            self.cancellations.cancel(request.telegram_id).await;
        }

        let lang = request.language;
        let mut text = messages::training_error(lang, &messages::failure_reason(lang, &error));
        if let Some(amount) = refunded {
            text.push_str("\n\n");
            text.push_str(&messages::stars_refunded(lang, amount));
        }
        self.notify(recipient, &text, None).await;

        TrainingOutcome::Failed {
            stage,
            error,
            refunded,
        }
    }

    async fn refund(&self, record: &TrainingRecord) -> Option<Stars> {
        self.apply_refund(
            record.telegram_id,
            record.charged_stars,
            &record.refund_operation_id(),
        )
        .await
    }

    async fn apply_refund(&self, telegram_id: i64, amount: Stars, operation_id: &str) -> Option<Stars> {
        match self
            .ledger
            .apply_delta(
                telegram_id,
                amount.as_refund(),
                BalanceReason::TrainingRefund,
                operation_id,
            )
            .await
        {
            Ok(applied) if applied.duplicate => {
                log::info!("Refund {} for user {} was already applied", operation_id, telegram_id);
                Some(amount)
            }
            Ok(applied) => {
                log::info!(
                    "Refunded {} to user {} (op {}), balance now {}",
                    amount,
                    telegram_id,
                    operation_id,
                    applied.balance
                );
                Some(amount)
            }
            Err(e) => {
                log::error!(
                    "CRITICAL: refund {} of {} for user {} failed: {}",
                    operation_id,
                    amount,
                    telegram_id,
                    e
                );
                None
            }
        }
    }

    fn register_cancel_handle(&self, request: &TrainingRequest, job_id: &str) {
        let provider = self.provider.clone();
        let target = job_id.to_string();
        self.cancellations.register(
            request.telegram_id,
            CancelHandle::new(job_id, request.model_name.clone(), move || {
                async move { provider.cancel_training(&target).await }.boxed()
            }),
        );
    }

    async fn notify(&self, recipient: &Recipient, text: &str, action: Option<MessageAction>) {
        if let Err(e) = self
            .notifier
            .send_user_message(recipient, text, action)
            .await
        {
            log::warn!(
                "Failed to notify user {} via {}: {}",
                recipient.telegram_id,
                recipient.bot_name,
                e
            );
        }
    }
}

#[async_trait]
impl CompletionHandler for TrainingOrchestrator {
    async fn handle_completion(&self, event: CompletionEvent) -> CompletionOutcome {
        self.complete(event).await
    }
}

