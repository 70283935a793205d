use async_trait::async_trait;
use url::Url;

use crate::error::ProviderError;

/// Normalized inputs for one fine-tuning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingInputs {
    pub archive_url: Url,
    pub trigger_word: String,
    pub steps: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTraining {
    pub job_id: String,
    pub cancel_url: Option<String>,
}

/// The external ML service that runs the fine-tuning.
#[async_trait]
pub trait TrainingProvider: Send + Sync {
    /// Makes sure the destination model exists and returns its reference.
    async fn ensure_model(&self, model_name: &str, trigger_word: &str)
    -> Result<String, ProviderError>;

    async fn submit_training(
        &self,
        destination: &str,
        inputs: &TrainingInputs,
    ) -> Result<SubmittedTraining, ProviderError>;

    async fn cancel_training(&self, job_id: &str) -> Result<(), ProviderError>;
}
