//! HTTP controllers

pub mod github_app;
pub mod health;
pub mod scan_attempts;
pub mod webhook;

use axum::response::Response;
use std::sync::Arc;

use crate::application::{
    ApplicationError, BootstrapRepositoryUseCase, GetInstallationStatusUseCase,
    ListInstallationRepositoriesUseCase, ListScanAttemptsUseCase, ProcessWebhookUseCase,
    RegisterInstallationUseCase,
};
use crate::presentation::middleware::application_error_to_response;

/// Use cases that need a configured GitHub App
#[derive(Clone)]
pub struct GitHubAppUseCases {
    pub status: Arc<GetInstallationStatusUseCase>,
    pub register: Arc<RegisterInstallationUseCase>,
    pub list_repositories: Arc<ListInstallationRepositoriesUseCase>,
    pub bootstrap: Arc<BootstrapRepositoryUseCase>,
}

/// Application state shared by every route
#[derive(Clone)]
pub struct AppState {
    /// Shared secret for `X-Hub-Signature-256`; the webhook route answers 503 without it
    pub webhook_secret: Option<Arc<str>>,
    pub process_webhook: Arc<ProcessWebhookUseCase>,
    /// `None` when the GitHub App credentials are not configured
    pub github_app: Option<GitHubAppUseCases>,
    pub list_scan_attempts: Arc<ListScanAttemptsUseCase>,
}

impl AppState {
    pub(crate) fn github_app(&self) -> Result<&GitHubAppUseCases, Response> {
        self.github_app
            .as_ref()
            .ok_or_else(|| application_error_to_response(ApplicationError::NotConfigured))
    }
}
