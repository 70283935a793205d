use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::balance::Stars;
use crate::error::TrainingError;
use crate::messages::Language;
use crate::training::guard::ActiveSource;

/// Steps as they arrive on the event bus: producers send both numbers and strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StepsInput {
    Int(i64),
    Float(f64),
    Text(String),
}

impl From<u32> for StepsInput {
    fn from(value: u32) -> Self {
        StepsInput::Int(i64::from(value))
    }
}

/// `is_ru` arrives either as a JSON bool or as the string `"true"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LanguageFlag {
    Bool(bool),
    Text(String),
}

impl Default for LanguageFlag {
    fn default() -> Self {
        LanguageFlag::Bool(false)
    }
}

impl LanguageFlag {
    pub fn language(&self) -> Language {
        let is_ru = match self {
            LanguageFlag::Bool(value) => *value,
            LanguageFlag::Text(value) => value.trim().eq_ignore_ascii_case("true"),
        };
        if is_ru { Language::Ru } else { Language::En }
    }
}

impl From<Language> for LanguageFlag {
    fn from(value: Language) -> Self {
        LanguageFlag::Bool(value.is_ru())
    }
}

/// One `model-training/start` event, exactly as delivered by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingEvent {
    pub bot_name: String,
    pub telegram_id: String,
    #[serde(rename = "modelName")]
    pub model_name: String,
    pub steps: StepsInput,
    #[serde(rename = "triggerWord")]
    pub trigger_word: String,
    #[serde(rename = "zipUrl")]
    pub zip_url: String,
    #[serde(default)]
    pub is_ru: LanguageFlag,
}

impl TrainingEvent {
    pub fn language(&self) -> Language {
        self.is_ru.language()
    }

    /// Idempotency key the event bus can use to collapse redeliveries.
    pub fn idempotency_key(&self) -> String {
        format!("train:{}:{}", self.telegram_id, self.model_name)
    }
}

/// Validated submission. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingRequest {
    pub bot_name: String,
    pub telegram_id: i64,
    pub model_name: String,
    pub steps: u32,
    pub trigger_word: String,
    pub archive_url: Url,
    pub language: Language,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingStatus {
    Pending,
    Active,
    Completed,
    Failed,
    Canceled,
}

impl TrainingStatus {
    pub const OPEN: [TrainingStatus; 2] = [TrainingStatus::Pending, TrainingStatus::Active];

    /// Pending and active records block new submissions for the same pair.
    pub fn is_open(self) -> bool {
        Self::OPEN.contains(&self)
    }
}

/// Durable audit record of one accepted submission. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingRecord {
    pub id: String,
    pub telegram_id: i64,
    pub bot_name: String,
    pub model_name: String,
    pub trigger_word: String,
    pub source_archive_url: String,
    pub steps: u32,
    pub external_job_id: Option<String>,
    pub cancel_url: Option<String>,
    pub status: TrainingStatus,
    pub charged_stars: Stars,
    pub charge_operation_id: String,
    pub language: Language,
    /// Set right before the provider is asked to start the job. A pending
    /// record carrying it may have a job running somewhere.
    #[serde(default)]
    pub submission_started_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrainingRecord {
    pub fn pending(
        request: &TrainingRequest,
        charged_stars: Stars,
        charge_operation_id: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            telegram_id: request.telegram_id,
            bot_name: request.bot_name.clone(),
            model_name: request.model_name.clone(),
            trigger_word: request.trigger_word.clone(),
            source_archive_url: request.archive_url.to_string(),
            steps: request.steps,
            external_job_id: None,
            cancel_url: None,
            status: TrainingStatus::Pending,
            charged_stars,
            charge_operation_id,
            language: request.language,
            submission_started_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Ledger operation id of the refund for this record's charge.
    pub fn refund_operation_id(&self) -> String {
        refund_operation_id(&self.charge_operation_id)
    }
}

/// A charge and its refund share one id stem, so the ledger can only ever
/// apply the refund once.
pub fn refund_operation_id(charge_operation_id: &str) -> String {
    format!("refund:{}", charge_operation_id)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingPatch {
    pub status: Option<TrainingStatus>,
    pub external_job_id: Option<String>,
    pub cancel_url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionStatus {
    Completed,
    Failed,
    Canceled,
}

/// Provider-reported end of an external job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    pub job_id: String,
    pub status: CompletionStatus,
    pub output_ref: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubmissionStage {
    Validating,
    CheckingDuplicate,
    Charging,
    Submitting,
    Persisting,
    Running,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    Started {
        record_id: String,
        external_job_id: String,
        charged: Stars,
    },
    DuplicateActive {
        source: ActiveSource,
        record_id: Option<String>,
        external_job_id: Option<String>,
    },
    Failed {
        stage: SubmissionStage,
        error: TrainingError,
        refunded: Option<Stars>,
    },
}

impl TrainingOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TrainingOutcome::Started { .. })
    }

    pub fn active_training_exists(&self) -> bool {
        matches!(self, TrainingOutcome::DuplicateActive { .. })
    }

    pub fn external_job_id(&self) -> Option<&str> {
        match self {
            TrainingOutcome::Started { external_job_id, .. } => Some(external_job_id),
            TrainingOutcome::DuplicateActive { external_job_id, .. } => external_job_id.as_deref(),
            TrainingOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    Completed { record_id: String },
    Compensated {
        record_id: String,
        status: TrainingStatus,
        refunded: Stars,
    },
    /// The record had already reached a terminal status; nothing was done.
    AlreadyTerminal { record_id: String },
    UnknownJob,
    /// State could not be read or written; the callback should be redelivered.
    Retry { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    NothingToCancel,
    CancelRequested { job_id: String },
}
