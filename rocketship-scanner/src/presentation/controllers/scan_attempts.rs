use axum::{
    extract::{Path, Query, State},
    response::{Json, Response},
};
use uuid::Uuid;

use rocketship_core::domain::discovery::OrganizationId;

use crate::presentation::controllers::AppState;
use crate::presentation::middleware::application_error_to_response;
use crate::presentation::models::{ErrorResponse, ScanAttemptListResponse, ScanAttemptQuery};

/// GET /api/v1/organizations/{org_id}/scan-attempts - Most recent scan attempts
#[utoipa::path(
    get,
    path = "/api/v1/organizations/{org_id}/scan-attempts",
    params(
        ("org_id" = Uuid, Path, description = "Organization ID"),
        ScanAttemptQuery
    ),
    responses(
        (status = 200, description = "Scan attempts, newest first", body = ScanAttemptListResponse),
        (status = 500, description = "Internal server error", body = ErrorResponse)
    ),
    tag = "scans"
)]
pub async fn list_scan_attempts(
    State(state): State<AppState>,
    Path(org_id): Path<Uuid>,
    Query(query): Query<ScanAttemptQuery>,
) -> Result<Json<ScanAttemptListResponse>, Response> {
    let attempts = state
        .list_scan_attempts
        .execute(OrganizationId::new(org_id), query.limit)
        .await
        .map_err(application_error_to_response)?;
    Ok(Json(ScanAttemptListResponse {
        attempts: attempts.into_iter().map(Into::into).collect(),
    }))
}
