use neuro_core::training::{CompletionEvent, CompletionStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Training object as Replicate posts it to the webhook.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReplicateTrainingWebhook {
    pub id: String,
    pub status: String,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub output: Option<Value>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct WebhookAck {
    pub job_id: String,
    pub outcome: String,
}

impl ReplicateTrainingWebhook {
    /// `None` for statuses that do not end the job (`starting`, `processing`).
    pub fn completion_status(&self) -> Option<CompletionStatus> {
        match self.status.as_str() {
            "succeeded" => Some(CompletionStatus::Completed),
            "failed" => Some(CompletionStatus::Failed),
            "canceled" => Some(CompletionStatus::Canceled),
            _ => None,
        }
    }

    pub fn completion_event(&self) -> Option<CompletionEvent> {
        let status = self.completion_status()?;
        Some(CompletionEvent {
            job_id: self.id.clone(),
            status,
            output_ref: self.output_ref(),
            error: self.error.as_ref().and_then(value_text),
        })
    }

    /// Trained version id, or the weights URL when the version is missing.
    fn output_ref(&self) -> Option<String> {
        let output = self.output.as_ref()?;
        output
            .get("version")
            .or_else(|| output.get("weights"))
            .and_then(value_text)
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn succeeded_payload_carries_version() {
        let payload: ReplicateTrainingWebhook = serde_json::from_value(json!({
            "id": "abc123",
            "status": "succeeded",
            "output": {
                "version": "neuro/test_lora_model:9f2e",
                "weights": "https://replicate.delivery/weights.tar"
            },
            "error": null
        }))
        .unwrap();

        let event = payload.completion_event().unwrap();
        assert_eq!(event.status, CompletionStatus::Completed);
        assert_eq!(event.output_ref.as_deref(), Some("neuro/test_lora_model:9f2e"));
        assert_eq!(event.error, None);
    }

    #[test]
    fn failed_payload_keeps_error_text() {
        let payload: ReplicateTrainingWebhook = serde_json::from_value(json!({
            "id": "abc123",
            "status": "failed",
            "error": "CUDA out of memory"
        }))
        .unwrap();

        let event = payload.completion_event().unwrap();
        assert_eq!(event.status, CompletionStatus::Failed);
        assert_eq!(event.error.as_deref(), Some("CUDA out of memory"));
    }

    #[test]
    fn intermediate_status_is_not_a_completion() {
        let payload: ReplicateTrainingWebhook =
            serde_json::from_value(json!({"id": "abc123", "status": "processing"})).unwrap();
        assert!(payload.completion_event().is_none());
    }
}
