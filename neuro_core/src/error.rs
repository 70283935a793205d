use thiserror::Error;

use crate::balance::Stars;
use crate::training::dto::SubmissionStage;

/// Bad input. Raised before any side effect and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid steps count: {0}")]
    InvalidSteps(String),

    #[error("invalid telegram id: {0}")]
    InvalidTelegramId(String),

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("invalid archive url: {0}")]
    InvalidArchiveUrl(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Network,
    Validation,
    RateLimited,
    Unauthorized,
    Api,
    /// The provider accepted the request but its reply could not be read, so
    /// the job may be running. Never refunded automatically.
    Unconfirmed,
}

/// Anything the training provider reported back. Only `message` reaches the
/// user, and only through the localization heuristics in `messages`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("provider error ({kind:?}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("ledger storage error: {0}")]
    Storage(String),

    #[error("corrupted ledger entry: {0}")]
    Decode(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("training store error: {0}")]
    Storage(String),

    #[error("corrupted training record {id}: {reason}")]
    Decode { id: String, reason: String },

    #[error("training record {0} not found")]
    NotFound(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    #[error("no bot registered under name {0}")]
    UnknownBot(String),

    #[error("failed to deliver message: {0}")]
    Delivery(String),
}

/// Every way a submission can end other than a started job.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrainingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("an active training already exists for {telegram_id}:{model_name}")]
    DuplicateActive { telegram_id: i64, model_name: String },

    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: Stars, available: Stars },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("persistence failed during {stage:?}: {source}")]
    Persistence {
        stage: SubmissionStage,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}
