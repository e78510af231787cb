use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use tracing::{debug, error, warn};

use crate::infrastructure::signature::{SIGNATURE_HEADER, verify_signature};
use crate::presentation::controllers::AppState;
use crate::presentation::middleware::error_response;
use crate::presentation::models::WebhookAck;

pub const EVENT_HEADER: &str = "x-github-event";
pub const DELIVERY_HEADER: &str = "x-github-delivery";

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

/// POST /github-app/webhook - Receive a GitHub App webhook delivery
#[utoipa::path(
    post,
    path = "/github-app/webhook",
    request_body(content = String, description = "Raw GitHub webhook payload", content_type = "application/json"),
    params(
        ("X-GitHub-Event" = String, Header, description = "Event name"),
        ("X-GitHub-Delivery" = String, Header, description = "Delivery id"),
        ("X-Hub-Signature-256" = String, Header, description = "sha256=<hex> HMAC of the body")
    ),
    responses(
        (status = 200, description = "Delivery accepted", body = WebhookAck),
        (status = 400, description = "Event or delivery header missing", body = crate::presentation::models::ErrorResponse),
        (status = 401, description = "Signature invalid", body = crate::presentation::models::ErrorResponse),
        (status = 503, description = "Webhook secret not configured", body = crate::presentation::models::ErrorResponse)
    ),
    tag = "github-app"
)]
pub async fn receive_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "WEBHOOK_NOT_CONFIGURED",
            "GitHub webhook secret is not configured",
            None,
        );
    };

    let (Some(event), Some(delivery_id)) =
        (header(&headers, EVENT_HEADER), header(&headers, DELIVERY_HEADER))
    else {
        return error_response(
            StatusCode::BAD_REQUEST,
            "MISSING_HEADERS",
            "X-GitHub-Event and X-GitHub-Delivery headers are required",
            None,
        );
    };

    if let Err(e) = verify_signature(secret, &body, header(&headers, SIGNATURE_HEADER)) {
        warn!(delivery_id, event, error = %e, "Rejected webhook with invalid signature");
        return error_response(
            StatusCode::UNAUTHORIZED,
            "INVALID_SIGNATURE",
            "Webhook signature verification failed",
            None,
        );
    }

    // Detached: a request timeout must not cancel a scan before its attempt is recorded
    let process_webhook = state.process_webhook.clone();
    let (event_name, delivery) = (event.to_string(), delivery_id.to_string());
    let processing = tokio::spawn(async move {
        process_webhook
            .execute(&event_name, &delivery, &body)
            .await
    });
    let report = match processing.await {
        Ok(report) => report,
        Err(e) => {
            error!(delivery_id, event, error = %e, "Webhook processing task failed");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Webhook processing failed",
                None,
            );
        }
    };
    debug!(
        delivery_id,
        event,
        parsed = report.parsed,
        scans = report.scans.len(),
        heads_updated = report.heads_updated,
        "Webhook processed"
    );

    Json(WebhookAck { ok: true }).into_response()
}
