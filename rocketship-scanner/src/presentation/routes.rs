//! Route definitions and server setup

use axum::http::StatusCode;
use axum::{
    Router, middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use rocketship_core::config::ServerConfig;

use crate::presentation::{
    controllers::{
        AppState,
        github_app::{
            connect_repository, get_installation_status, list_repositories,
            register_installation,
        },
        health::health_check,
        scan_attempts::list_scan_attempts,
        webhook::receive_webhook,
    },
    middleware::logging_middleware,
    models::*,
};

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::presentation::controllers::webhook::receive_webhook,
        crate::presentation::controllers::github_app::get_installation_status,
        crate::presentation::controllers::github_app::register_installation,
        crate::presentation::controllers::github_app::list_repositories,
        crate::presentation::controllers::github_app::connect_repository,
        crate::presentation::controllers::scan_attempts::list_scan_attempts,
        crate::presentation::controllers::health::health_check
    ),
    components(
        schemas(
            ErrorResponse,
            HealthResponse,
            WebhookAck,
            RegisterInstallationRequest,
            ConnectRepositoryRequest,
            InstallationStatusResponse,
            RepositoryResponse,
            BootstrapScanResponse,
            BootstrapResponse,
            ScanAttemptResponse,
            ScanAttemptListResponse
        )
    ),
    tags(
        (name = "github-app", description = "GitHub App webhook, installation and repository connection"),
        (name = "scans", description = "Scan attempt audit trail"),
        (name = "health", description = "Service health")
    ),
    info(
        title = "Rocketship Control Plane",
        version = "0.3.0",
        description = "Discovers .rocketship test suites in GitHub repositories and keeps them in sync with pushes and pull requests.",
        license(name = "Apache-2.0", url = "https://www.apache.org/licenses/LICENSE-2.0")
    )
)]
pub struct ApiDoc;

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let methods = [
        axum::http::Method::GET,
        axum::http::Method::POST,
        axum::http::Method::OPTIONS,
    ];
    let headers = [
        axum::http::header::CONTENT_TYPE,
        axum::http::header::ACCEPT,
        axum::http::header::USER_AGENT,
        axum::http::header::ORIGIN,
    ];

    if config.allowed_origins.len() == 1 && config.allowed_origins[0] == "*" {
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::any())
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(false)
            .max_age(Duration::from_secs(3600))
    } else {
        tracing::debug!("CORS: Configured with specific origins");

        let origins: Vec<axum::http::HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|origin| {
                axum::http::HeaderValue::from_str(origin)
                    .map_err(|_| {
                        tracing::warn!(origin, "Invalid CORS origin in config; skipping");
                    })
                    .ok()
            })
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
            .max_age(Duration::from_secs(3600))
    }
}

/// Create the application router
pub fn create_router(state: AppState, config: &ServerConfig) -> Router {
    let scan_timeout = TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        Duration::from_secs(config.scan_timeout_seconds),
    );

    // Routes that may run scans synchronously get the longer timeout
    let scanning_api_routes = Router::new()
        .route(
            "/organizations/{org_id}/github-app/connect",
            post(connect_repository),
        )
        .layer(scan_timeout.clone());

    let api_routes = Router::new()
        .route(
            "/organizations/{org_id}/github-app/status",
            get(get_installation_status),
        )
        .route(
            "/organizations/{org_id}/github-app/installations",
            post(register_installation),
        )
        .route(
            "/organizations/{org_id}/github-app/repos",
            get(list_repositories),
        )
        .route(
            "/organizations/{org_id}/scan-attempts",
            get(list_scan_attempts),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(config.request_timeout_seconds),
        ))
        .merge(scanning_api_routes);

    let webhook_routes = Router::new()
        .route("/github-app/webhook", post(receive_webhook))
        .layer(scan_timeout);

    async fn root_handler() -> Response {
        axum::Json(serde_json::json!({
            "name": "Rocketship Control Plane",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "health": "/health",
                "webhook": "/github-app/webhook",
                "api": "/api/v1",
                "docs": "/docs"
            }
        }))
        .into_response()
    }

    let health_routes = Router::new()
        .route("/", get(root_handler))
        .route("/health", get(health_check));

    let mut router = Router::new()
        .nest("/api/v1", api_routes)
        .merge(webhook_routes)
        .merge(health_routes);

    if config.enable_docs {
        router =
            router.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    }

    let service_builder = ServiceBuilder::new()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(config))
        .layer(middleware::from_fn(logging_middleware));

    router.layer(service_builder).with_state(state)
}
