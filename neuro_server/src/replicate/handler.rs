use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode};
use neuro_core::training::CompletionOutcome;

use crate::{
    error::ErrorServer,
    replicate::dto::{ReplicateTrainingWebhook, WebhookAck},
    state::ServerState,
};

#[utoipa::path(
    post,
    path = "/webhooks/replicate",
    description = "Replicate training status callback",
    request_body = ReplicateTrainingWebhook,
    responses(
        (status = 200, description = "Completion handled", body = WebhookAck),
        (status = 202, description = "Intermediate status, nothing to do", body = WebhookAck),
        (status = 503, description = "State unavailable, redeliver later", body = ErrorServer),
    )
)]
pub async fn replicate_webhook(
    State(server_state): State<Arc<ServerState>>,
    Json(payload): Json<ReplicateTrainingWebhook>,
) -> Result<(StatusCode, Json<WebhookAck>), ErrorServer> {
    let event = match payload.completion_event() {
        Some(event) => event,
        None => {
            log::debug!(
                "Ignoring Replicate status {} for training {}",
                payload.status,
                payload.id
            );
            return Ok((
                StatusCode::ACCEPTED,
                Json(WebhookAck {
                    job_id: payload.id,
                    outcome: "ignored".to_string(),
                }),
            ));
        }
    };

    log::info!("Replicate training {} finished: {}", payload.id, payload.status);

    let outcome = match server_state.completion_handler().handle_completion(event).await {
        CompletionOutcome::Completed { .. } => "completed",
        CompletionOutcome::Compensated { .. } => "compensated",
        CompletionOutcome::AlreadyTerminal { .. } => "already_terminal",
        CompletionOutcome::UnknownJob => {
            log::warn!("Replicate webhook for unknown training {}", payload.id);
            "unknown_job"
        }
        CompletionOutcome::Retry { reason } => {
            log::error!(
                "Replicate webhook for {} not settled, asking for redelivery: {}",
                payload.id,
                reason
            );
            return Err(ErrorServer {
                status: StatusCode::SERVICE_UNAVAILABLE.into(),
                message: reason,
            });
        }
    };

    Ok((
        StatusCode::OK,
        Json(WebhookAck {
            job_id: payload.id,
            outcome: outcome.to_string(),
        }),
    ))
}
