use async_trait::async_trait;
use neuro_core::error::{ProviderError, ProviderErrorKind};
use neuro_core::provider::{SubmittedTraining, TrainingInputs, TrainingProvider};
use reqwest::StatusCode;
use tokio::time::{Duration, sleep};

use crate::replicate::dto::{
    ApiErrorBody, CreateModelRequest, CreateTrainingRequest, TrainerInput, TrainingResponse,
};
use crate::replicate::{REPLICATE_MAX_RETRIES, REPLICATE_RETRY_BASE_DELAY_MS, ReplicateConfig};

#[derive(Clone)]
pub struct ReplicateClient {
    http: reqwest::Client,
    config: ReplicateConfig,
    retry_base_delay_ms: u64,
}

impl ReplicateClient {
    pub fn new(config: ReplicateConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
            retry_base_delay_ms: REPLICATE_RETRY_BASE_DELAY_MS,
        }
    }

    #[cfg(test)]
    fn with_retry_base_delay_ms(mut self, delay_ms: u64) -> Self {
        self.retry_base_delay_ms = delay_ms;
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_url.trim_end_matches('/'), path)
    }

    /// GET with linear backoff on transport errors, 5xx and 429. Returns the
    /// final status and body, whatever they are.
    async fn get_with_retry(&self, url: &str) -> Result<(StatusCode, String), ProviderError> {
        let mut attempt = 0;
        loop {
            let attempt_number = attempt + 1;
            let delay = Duration::from_millis(self.retry_base_delay_ms * attempt_number as u64);
            match self
                .http
                .get(url)
                .bearer_auth(&self.config.api_token)
                .header("Accept", "application/json")
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    let should_retry =
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if should_retry && attempt_number < REPLICATE_MAX_RETRIES {
                        log::warn!(
                            "Replicate request returned status {} on attempt {}. Retrying in {}ms...",
                            status,
                            attempt_number,
                            delay.as_millis()
                        );
                        sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Ok((status, body));
                }
                Err(error) => {
                    if attempt_number >= REPLICATE_MAX_RETRIES {
                        log::error!(
                            "Replicate request failed after {} attempts: {} (url: {})",
                            attempt_number,
                            error,
                            url
                        );
                        return Err(ProviderError::new(ProviderErrorKind::Network, error.to_string()));
                    }
                    log::warn!(
                        "Replicate request attempt {} failed: {}. Retrying in {}ms...",
                        attempt_number,
                        error,
                        delay.as_millis()
                    );
                    sleep(delay).await;
                }
            }
            attempt += 1;
        }
    }

    async fn post_json<T: serde::Serialize>(
        &self,
        url: &str,
        body: Option<&T>,
    ) -> Result<(StatusCode, String), ProviderError> {
        let mut request = self
            .http
            .post(url)
            .bearer_auth(&self.config.api_token)
            .header("Accept", "application/json");
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Network, e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::new(ProviderErrorKind::Network, e.to_string()))?;
        Ok((status, body))
    }
}

/// Maps a non-success response to the provider error taxonomy, keeping the
/// API's own `detail` text when it sent one.
pub fn error_from_response(status: StatusCode, body: &str) -> ProviderError {
    let kind = match status {
        StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => ProviderErrorKind::Validation,
        StatusCode::TOO_MANY_REQUESTS => ProviderErrorKind::RateLimited,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ProviderErrorKind::Unauthorized,
        _ => ProviderErrorKind::Api,
    };
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .and_then(|parsed| parsed.detail.or(parsed.title))
        .unwrap_or_else(|| body.to_string());
    ProviderError::new(kind, format!("{} ({})", message, status))
}

/// Job id and cancel link from a training reply that does not match
/// [`TrainingResponse`].
fn salvage_training(body: &str) -> Option<SubmittedTraining> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let job_id = value
        .get("id")
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty())?;
    Some(SubmittedTraining {
        job_id: job_id.to_string(),
        cancel_url: value
            .pointer("/urls/cancel")
            .and_then(|url| url.as_str())
            .map(str::to_string),
    })
}

#[async_trait]
impl TrainingProvider for ReplicateClient {
    async fn ensure_model(&self, model_name: &str, trigger_word: &str) -> Result<String, ProviderError> {
        let destination = format!("{}/{}", self.config.username, model_name);
        let (status, body) = self
            .get_with_retry(&self.url(&format!("models/{}", destination)))
            .await?;

        if status.is_success() {
            log::info!("Replicate model {} already exists", destination);
            return Ok(destination);
        }
        if status != StatusCode::NOT_FOUND {
            return Err(error_from_response(status, &body));
        }

        log::info!("Creating Replicate model {}", destination);
        let request = CreateModelRequest::lora(&self.config.username, model_name, trigger_word);
        let (status, body) = self.post_json(&self.url("models"), Some(&request)).await?;
        if status.is_success() || status == StatusCode::CONFLICT {
            Ok(destination)
        } else {
            Err(error_from_response(status, &body))
        }
    }

    async fn submit_training(
        &self,
        destination: &str,
        inputs: &TrainingInputs,
    ) -> Result<SubmittedTraining, ProviderError> {
        let url = self.url(&format!(
            "models/{}/{}/versions/{}/trainings",
            self.config.trainer_owner, self.config.trainer_model, self.config.trainer_version
        ));
        let request = CreateTrainingRequest {
            destination: destination.to_string(),
            input: TrainerInput::new(
                inputs.archive_url.to_string(),
                inputs.trigger_word.clone(),
                inputs.steps,
            ),
            webhook: self.config.webhook_url.clone(),
            webhook_events_filter: vec!["completed".to_string()],
        };

        // Never retried: a second POST could start a second paid job.
        let (status, body) = self.post_json(&url, Some(&request)).await?;
        if !status.is_success() {
            log::error!(
                "Replicate rejected training for {} with status {}: {}",
                destination,
                status,
                body
            );
            return Err(error_from_response(status, &body));
        }

        let training: TrainingResponse = match serde_json::from_str(&body) {
            Ok(training) => training,
            Err(e) => {
                // Accepted with status 2xx, so the job may well be running.
                log::error!(
                    "CRITICAL: Replicate accepted training for {} with status {} but the reply did not parse ({}): {}",
                    destination,
                    status,
                    e,
                    body
                );
                return salvage_training(&body).ok_or_else(|| {
                    ProviderError::new(
                        ProviderErrorKind::Unconfirmed,
                        format!("unreadable training response: {}", e),
                    )
                });
            }
        };
        log::info!(
            "Replicate training {} created for {} ({})",
            training.id,
            destination,
            training.status
        );
        Ok(SubmittedTraining {
            cancel_url: training.urls.and_then(|urls| urls.cancel),
            job_id: training.id,
        })
    }

    async fn cancel_training(&self, job_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("trainings/{}/cancel", job_id));
        let (status, body) = self.post_json::<()>(&url, None).await?;
        if status.is_success() {
            log::info!("Replicate training {} canceled", job_id);
            Ok(())
        } else {
            Err(error_from_response(status, &body))
        }
    }
}
