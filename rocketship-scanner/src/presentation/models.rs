//! API request and response models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use rocketship_core::domain::discovery::ScanAttempt;
use rocketship_core::infrastructure::github::RepositoryInfo;

use crate::domain::{BootstrapReport, BootstrapScan, InstallationStatus};

/// Error response model
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// Machine-readable error code
    #[schema(example = "NOT_INSTALLED")]
    pub code: String,

    /// Human-readable error message
    #[schema(example = "GitHub App is not installed for this organization")]
    pub message: String,

    /// Additional error context
    pub details: Option<serde_json::Value>,

    /// Unique request identifier for tracking and support
    pub request_id: Uuid,

    /// Error occurrence timestamp
    pub timestamp: DateTime<Utc>,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,

    #[schema(example = "0.3.0")]
    pub version: String,

    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement returned to GitHub for every accepted delivery
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub ok: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterInstallationRequest {
    /// Installation id GitHub passes to the setup callback
    #[schema(example = 12345678)]
    pub installation_id: i64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ConnectRepositoryRequest {
    #[schema(example = "acme/widgets")]
    pub repo_full_name: String,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct InstallationStatusResponse {
    pub installed: bool,
    #[schema(example = "https://github.com/apps/rocketship/installations/new")]
    pub install_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
}

impl From<InstallationStatus> for InstallationStatusResponse {
    fn from(status: InstallationStatus) -> Self {
        Self {
            installed: status.installed,
            install_url: status.install_url,
            account_login: status.account_login,
            account_type: status.account_type,
        }
    }
}

/// Repository visible to the installation
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct RepositoryResponse {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub private: bool,
    pub default_branch: String,
    pub html_url: String,
}

impl From<RepositoryInfo> for RepositoryResponse {
    fn from(repo: RepositoryInfo) -> Self {
        let html_url = repo
            .html_url
            .unwrap_or_else(|| format!("https://github.com/{}", repo.full_name));
        Self {
            id: repo.id,
            name: repo.name,
            full_name: repo.full_name,
            private: repo.private,
            default_branch: repo.default_branch,
            html_url,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BootstrapScanResponse {
    #[schema(example = "main")]
    pub source_ref: String,
    #[schema(example = "success")]
    pub status: String,
    pub suites_found: i32,
    pub tests_found: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<BootstrapScan> for BootstrapScanResponse {
    fn from(scan: BootstrapScan) -> Self {
        Self {
            source_ref: scan.source_ref,
            status: scan.status.to_string(),
            suites_found: scan.suites_found,
            tests_found: scan.tests_found,
            error: scan.error,
        }
    }
}

/// Result of connecting a repository
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct BootstrapResponse {
    pub repo_full_name: String,
    pub default_branch: String,
    pub scans: Vec<BootstrapScanResponse>,
}

impl From<BootstrapReport> for BootstrapResponse {
    fn from(report: BootstrapReport) -> Self {
        Self {
            repo_full_name: report.repo_full_name,
            default_branch: report.default_branch,
            scans: report.scans.into_iter().map(Into::into).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanAttemptResponse {
    pub id: Uuid,
    pub delivery_id: String,
    pub repository_full_name: String,
    pub source_ref: String,
    pub head_sha: Option<String>,
    #[schema(example = "error")]
    pub status: String,
    pub error_message: Option<String>,
    pub suites_found: i32,
    pub tests_found: i32,
    pub created_at: DateTime<Utc>,
}

impl From<ScanAttempt> for ScanAttemptResponse {
    fn from(attempt: ScanAttempt) -> Self {
        Self {
            id: attempt.id,
            delivery_id: attempt.delivery_id,
            repository_full_name: attempt.repository_full_name,
            source_ref: attempt.source_ref,
            head_sha: attempt.head_sha,
            status: attempt.status.to_string(),
            error_message: attempt.error_message,
            suites_found: attempt.suites_found,
            tests_found: attempt.tests_found,
            created_at: attempt.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ScanAttemptListResponse {
    pub attempts: Vec<ScanAttemptResponse>,
}

#[derive(Debug, Deserialize, utoipa::IntoParams)]
pub struct ScanAttemptQuery {
    /// Maximum number of attempts, 1 to 1000
    pub limit: Option<i64>,
}
