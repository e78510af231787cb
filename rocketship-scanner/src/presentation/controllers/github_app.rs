//! GitHub App installation and repository connection endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Json, Response},
};
use tracing::error;
use uuid::Uuid;

use rocketship_core::domain::discovery::OrganizationId;

use crate::presentation::controllers::AppState;
use crate::presentation::middleware::{application_error_to_response, error_response};
use crate::presentation::models::{
    BootstrapResponse, ConnectRepositoryRequest, ErrorResponse, InstallationStatusResponse,
    RegisterInstallationRequest, RepositoryResponse,
};

/// GET /api/v1/organizations/{org_id}/github-app/status
#[utoipa::path(
    get,
    path = "/api/v1/organizations/{org_id}/github-app/status",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Installation status", body = InstallationStatusResponse),
        (status = 503, description = "GitHub App not configured", body = ErrorResponse)
    ),
    tag = "github-app"
)]
pub async fn get_installation_status(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<InstallationStatusResponse>, Response> {
    let status = state
        .github_app()?
        .status
        .execute(OrganizationId::new(org_id))
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(status.into()))
}

/// POST /api/v1/organizations/{org_id}/github-app/installations
#[utoipa::path(
    post,
    path = "/api/v1/organizations/{org_id}/github-app/installations",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = RegisterInstallationRequest,
    responses(
        (status = 200, description = "Installation bound to the organization", body = InstallationStatusResponse),
        (status = 400, description = "Invalid installation id", body = ErrorResponse),
        (status = 404, description = "Installation unknown to GitHub", body = ErrorResponse),
        (status = 502, description = "GitHub request failed", body = ErrorResponse),
        (status = 503, description = "GitHub App not configured", body = ErrorResponse)
    ),
    tag = "github-app"
)]
pub async fn register_installation(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(request): Json<RegisterInstallationRequest>,
) -> Result<Json<InstallationStatusResponse>, Response> {
    let status = state
        .github_app()?
        .register
        .execute(OrganizationId::new(org_id), request.installation_id)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(status.into()))
}

/// GET /api/v1/organizations/{org_id}/github-app/repos
#[utoipa::path(
    get,
    path = "/api/v1/organizations/{org_id}/github-app/repos",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    responses(
        (status = 200, description = "Repositories visible to the installation", body = [RepositoryResponse]),
        (status = 412, description = "GitHub App not installed", body = ErrorResponse),
        (status = 502, description = "GitHub request failed", body = ErrorResponse),
        (status = 503, description = "GitHub App not configured", body = ErrorResponse)
    ),
    tag = "github-app"
)]
pub async fn list_repositories(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
) -> Result<Json<Vec<RepositoryResponse>>, Response> {
    let repositories = state
        .github_app()?
        .list_repositories
        .execute(OrganizationId::new(org_id))
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(repositories.into_iter().map(Into::into).collect()))
}

/// POST /api/v1/organizations/{org_id}/github-app/connect - Scan a repository and its open pull requests
#[utoipa::path(
    post,
    path = "/api/v1/organizations/{org_id}/github-app/connect",
    params(("org_id" = Uuid, Path, description = "Organization ID")),
    request_body = ConnectRepositoryRequest,
    responses(
        (status = 200, description = "Repository scanned", body = BootstrapResponse),
        (status = 400, description = "Malformed repository name", body = ErrorResponse),
        (status = 404, description = "Repository not accessible to the installation", body = ErrorResponse),
        (status = 412, description = "GitHub App not installed", body = ErrorResponse),
        (status = 502, description = "GitHub request failed", body = ErrorResponse),
        (status = 503, description = "GitHub App not configured", body = ErrorResponse)
    ),
    tag = "github-app"
)]
pub async fn connect_repository(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Json(request): Json<ConnectRepositoryRequest>,
) -> Result<Json<BootstrapResponse>, Response> {
    let bootstrap = state.github_app()?.bootstrap.clone();
    let bootstrapping = tokio::spawn(async move {
        bootstrap
            .execute(OrganizationId::new(org_id), &request.repo_full_name)
            .await
    });
    let report = bootstrapping
        .await
        .map_err(|e| {
            error!(organization_id = %org_id, error = %e, "Bootstrap task failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Repository bootstrap failed",
                None,
            )
        })?
        .map_err(application_error_to_response)?;
    Ok(Json(report.into()))
}
