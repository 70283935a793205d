pub mod error;
pub mod replicate;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use neuro_core::training::CompletionHandler;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_redoc::{Redoc, Servable};

use crate::{
    error::ErrorServer,
    replicate::dto::{ReplicateTrainingWebhook, WebhookAck},
    state::ServerState,
};

#[derive(OpenApi)]
#[openapi(
    paths(health, replicate::handler::replicate_webhook),
    components(schemas(ReplicateTrainingWebhook, WebhookAck, ErrorServer)),
    info(title = "Neuro Server", description = "Provider callbacks for the neuro bots")
)]
pub struct ApiDoc;

#[utoipa::path(
    get,
    path = "/",
    responses((status = 200, description = "Server is up"))
)]
pub async fn health() -> &'static str {
    "ok"
}

pub fn router(server_state: Arc<ServerState>) -> Router {
    Router::new()
        .merge(Redoc::with_url("/redoc", ApiDoc::openapi()))
        .route("/", get(health))
        .route(
            "/webhooks/replicate",
            post(replicate::handler::replicate_webhook),
        )
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(server_state)
}

pub async fn serve(addr: SocketAddr, completion_handler: Arc<dyn CompletionHandler>) -> std::io::Result<()> {
    let server_state = Arc::new(ServerState::from(completion_handler));
    let app = router(server_state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("Webhook server listening on {}", addr);
    axum::serve(listener, app).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use neuro_core::training::{CompletionEvent, CompletionOutcome, CompletionStatus};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    struct StubHandler {
        outcome: CompletionOutcome,
        events: Mutex<Vec<CompletionEvent>>,
    }

    #[async_trait]
    impl CompletionHandler for StubHandler {
        async fn handle_completion(&self, event: CompletionEvent) -> CompletionOutcome {
            self.events.lock().unwrap().push(event);
            self.outcome.clone()
        }
    }

    fn app(outcome: CompletionOutcome) -> (Router, Arc<StubHandler>) {
        let handler = Arc::new(StubHandler {
            outcome,
            events: Mutex::new(Vec::new()),
        });
        let completion_handler: Arc<dyn CompletionHandler> = handler.clone();
        (router(Arc::new(ServerState::from(completion_handler))), handler)
    }

    async fn post_webhook(app: Router, payload: Value) -> (StatusCode, Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhooks/replicate")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn succeeded_training_is_completed() {
        let (app, handler) = app(CompletionOutcome::Completed {
            record_id: "r1".to_string(),
        });
        let (status, body) = post_webhook(
            app,
            json!({"id": "abc123", "status": "succeeded", "output": {"version": "neuro/m:1"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "completed");
        let events = handler.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job_id, "abc123");
        assert_eq!(events[0].status, CompletionStatus::Completed);
    }

    #[tokio::test]
    async fn intermediate_status_is_accepted_without_settling() {
        let (app, handler) = app(CompletionOutcome::UnknownJob);
        let (status, body) =
            post_webhook(app, json!({"id": "abc123", "status": "processing"})).await;

        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["outcome"], "ignored");
        assert!(handler.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_job_is_acknowledged() {
        let (app, _) = app(CompletionOutcome::UnknownJob);
        let (status, body) =
            post_webhook(app, json!({"id": "ghost", "status": "failed", "error": "boom"})).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "unknown_job");
    }

    #[tokio::test]
    async fn unsettled_completion_asks_for_redelivery() {
        let (app, _) = app(CompletionOutcome::Retry {
            reason: "training store error: down".to_string(),
        });
        let (status, body) =
            post_webhook(app, json!({"id": "abc123", "status": "canceled"})).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], 503);
    }

    #[tokio::test]
    async fn health_check_responds() {
        let (app, _) = app(CompletionOutcome::UnknownJob);
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
