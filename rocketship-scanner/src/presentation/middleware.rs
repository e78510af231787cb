//! HTTP middleware and error mapping

use axum::{
    extract::Request,
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use chrono::Utc;
use std::time::Instant;
use uuid::Uuid;

use rocketship_core::domain::discovery::StoreError;
use rocketship_core::infrastructure::github::ContentError;

use crate::application::ApplicationError;
use crate::presentation::models::ErrorResponse;

/// Convert application errors to HTTP responses
pub fn application_error_to_response(error: ApplicationError) -> Response {
    let sanitize_errors = std::env::var("ENV").unwrap_or_default() == "production";

    let (status, code, message) = match &error {
        ApplicationError::NotConfigured => (
            StatusCode::SERVICE_UNAVAILABLE,
            "GITHUB_APP_NOT_CONFIGURED",
            "GitHub App is not configured",
        ),
        ApplicationError::NotInstalled { .. } => (
            StatusCode::PRECONDITION_FAILED,
            "NOT_INSTALLED",
            "GitHub App is not installed for this organization",
        ),
        ApplicationError::InstallationNotFound { .. } => (
            StatusCode::NOT_FOUND,
            "INSTALLATION_NOT_FOUND",
            "GitHub App installation not found",
        ),
        ApplicationError::RepositoryNotFound { .. } => (
            StatusCode::NOT_FOUND,
            "REPOSITORY_NOT_FOUND",
            "Repository is not accessible to the GitHub App installation",
        ),
        ApplicationError::InvalidInput { .. } => (
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Invalid input provided",
        ),
        ApplicationError::Upstream(ContentError::RateLimited { .. }) => (
            StatusCode::BAD_GATEWAY,
            "GITHUB_RATE_LIMITED",
            "GitHub rate limit exceeded. Please retry later.",
        ),
        ApplicationError::Upstream(_) => (
            StatusCode::BAD_GATEWAY,
            "GITHUB_ERROR",
            "GitHub request failed",
        ),
        ApplicationError::Store(StoreError::NotFound { .. }) => {
            (StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found")
        }
        ApplicationError::Store(StoreError::InvalidInput { .. }) => (
            StatusCode::BAD_REQUEST,
            "INVALID_INPUT",
            "Invalid input provided",
        ),
        ApplicationError::Store(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            if sanitize_errors {
                "An internal error occurred"
            } else {
                "Database operation failed"
            },
        ),
    };

    // 4xx = client errors (warn level), 5xx = server errors (error level)
    if status.is_server_error() {
        tracing::error!(
            error = %error,
            http_status = %status,
            error_code = code,
            "Server error mapped to HTTP response"
        );
    } else {
        tracing::warn!(
            error = %error,
            http_status = %status,
            error_code = code,
            "Client error mapped to HTTP response"
        );
    }

    error_response(status, code, message, (!sanitize_errors).then(|| error.to_string()))
}

/// Build an [`ErrorResponse`] body with a fresh request id
pub fn error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    detail: Option<String>,
) -> Response {
    let body = ErrorResponse {
        code: code.to_string(),
        message: message.to_string(),
        details: detail.map(|error| serde_json::json!({ "error": error })),
        request_id: Uuid::new_v4(),
        timestamp: Utc::now(),
    };

    (status, Json(body)).into_response()
}

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Log each request with its duration and echo a request id back to the caller.
/// Health probes are logged at debug.
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = Uuid::new_v4();
    let started = Instant::now();

    let mut response = next.run(request).await;
    let status = response.status();
    let duration_ms = started.elapsed().as_millis() as u64;

    if path == "/health" {
        tracing::debug!(request_id = %request_id, %status, duration_ms, "Health check");
    } else if status.is_server_error() {
        tracing::warn!(request_id = %request_id, %method, path = %path, %status, duration_ms, "Request failed");
    } else {
        tracing::info!(request_id = %request_id, %method, path = %path, %status, duration_ms, "Request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
