//! Control plane use cases

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use rocketship_core::domain::discovery::{
    GitHubAppInstallation, IReconciliationStore, LifecycleChange, NormalizedRef, OrganizationId,
    RefScope, RepositoryName, ScanAttempt, WebhookDelivery,
};
use rocketship_core::infrastructure::github::{RepositoryContentClient, RepositoryInfo};

use crate::application::classifier::{self, Decision, HeadUpdate, LifecycleAction};
use crate::application::errors::ApplicationError;
use crate::application::scanner::Scanner;
use crate::domain::{
    BootstrapReport, BootstrapScan, InstallationStatus, ScanInput, ScanKind, ScanOutcome,
    WebhookEvent,
};

pub const DEFAULT_SCAN_ATTEMPT_LIMIT: i64 = 20;
pub const MAX_SCAN_ATTEMPT_LIMIT: i64 = 1000;

/// What a webhook delivery caused
#[derive(Debug, Clone, Default)]
pub struct WebhookReport {
    pub event: String,
    /// False when the body was not valid JSON for the event
    pub parsed: bool,
    pub lifecycle: LifecycleChange,
    pub heads_updated: u64,
    pub scans: Vec<ScanOutcome>,
}

/// Use case for processing a verified GitHub webhook delivery
pub struct ProcessWebhookUseCase {
    store: Arc<dyn IReconciliationStore>,
    /// `None` when the GitHub App is not configured; deliveries are then only audited
    scanner: Option<Arc<Scanner>>,
}

impl ProcessWebhookUseCase {
    pub fn new(store: Arc<dyn IReconciliationStore>, scanner: Option<Arc<Scanner>>) -> Self {
        Self { store, scanner }
    }

    #[tracing::instrument(skip(self, body), fields(event = %event_name, delivery_id = %delivery_id))]
    pub async fn execute(&self, event_name: &str, delivery_id: &str, body: &[u8]) -> WebhookReport {
        let mut report = WebhookReport {
            event: event_name.to_string(),
            ..Default::default()
        };

        let event = match WebhookEvent::parse(event_name, body) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring webhook with unparseable payload");
                return report;
            }
        };
        report.parsed = true;

        self.audit(delivery_id, &event).await;

        let Some(scanner) = self.scanner.as_ref() else {
            debug!("GitHub App not configured, skipping processing");
            return report;
        };
        let Some(installation_id) = event.installation_id() else {
            debug!("Webhook has no installation, skipping processing");
            return report;
        };
        let Some(repository) = event.repository() else {
            debug!("Webhook has no repository, skipping processing");
            return report;
        };
        let repository: RepositoryName = match repository.full_name.parse() {
            Ok(repository) => repository,
            Err(e) => {
                warn!(error = %e, "Webhook repository name is malformed");
                return report;
            }
        };

        let plan = classifier::plan(&event, Utc::now());
        if plan.lifecycle.is_none()
            && plan.head_update.is_none()
            && let Decision::Ignore { reason } = &plan.decision
        {
            debug!(reason = %reason, repo = %repository, "Webhook ignored");
            return report;
        }

        let organizations = match self.store.list_orgs_by_installation(installation_id).await {
            Ok(organizations) => organizations,
            Err(e) => {
                error!(installation_id, error = %e, "Failed to list organizations for installation");
                return report;
            }
        };
        if organizations.is_empty() {
            info!(installation_id, "Installation is not bound to any organization");
            return report;
        }

        let repo_url = repository.repo_url();
        for organization_id in organizations {
            if let Some(action) = &plan.lifecycle {
                let change = self
                    .apply_lifecycle(organization_id, &repo_url, action)
                    .await;
                report.lifecycle.projects += change.projects;
                report.lifecycle.suites += change.suites;
            }

            if let Some(update) = &plan.head_update {
                report.heads_updated += self
                    .apply_head_update(organization_id, &repo_url, update)
                    .await;
            }

            let (source_ref, head_sha, kind) = match &plan.decision {
                Decision::Ignore { reason } => {
                    debug!(organization_id = %organization_id, reason = %reason, "No scan for webhook");
                    continue;
                }
                Decision::FullScan {
                    source_ref,
                    head_sha,
                } => (source_ref, head_sha, ScanKind::Full),
                Decision::DeltaScan {
                    source_ref,
                    head_sha,
                    pr_number,
                } => (
                    source_ref,
                    head_sha,
                    ScanKind::Delta {
                        pr_number: *pr_number,
                    },
                ),
            };

            let input = ScanInput {
                organization_id,
                installation_id,
                repository: repository.clone(),
                source_ref: source_ref.clone(),
                head_sha: head_sha.clone(),
                delivery_id: delivery_id.to_string(),
            };
            report.scans.push(scanner.scan_and_record(&input, kind).await);
        }

        report
    }

    async fn audit(&self, delivery_id: &str, event: &WebhookEvent) {
        let delivery = WebhookDelivery {
            delivery_id: delivery_id.to_string(),
            event: event.name().to_string(),
            repository_full_name: event.repository().map(|r| r.full_name.clone()),
            git_ref: event.git_ref().map(str::to_string),
            action: event.action().map(str::to_string),
        };
        match self.store.insert_webhook_delivery(&delivery).await {
            Ok(true) => {}
            Ok(false) => debug!("Webhook delivery already recorded"),
            Err(e) => error!(error = %e, "Failed to record webhook delivery"),
        }
    }

    async fn apply_lifecycle(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        action: &LifecycleAction,
    ) -> LifecycleChange {
        let source_ref = match action {
            LifecycleAction::Deactivate { source_ref, .. }
            | LifecycleAction::Reactivate { source_ref } => source_ref.as_str(),
        };
        let scope = RefScope {
            organization_id,
            repo_url,
            source_ref,
        };

        // Suite counts are taken before the project cascade touches the same rows
        let (suites, projects) = match action {
            LifecycleAction::Deactivate { reason, .. } => {
                let suites = self.store.deactivate_suites_for_ref(&scope, *reason).await;
                let projects = self.store.deactivate_projects_for_ref(&scope, *reason).await;
                (suites, projects)
            }
            LifecycleAction::Reactivate { .. } => {
                let suites = self.store.reactivate_suites_for_ref(&scope).await;
                let projects = self.store.reactivate_projects_for_ref(&scope).await;
                (suites, projects)
            }
        };

        let mut change = LifecycleChange::default();
        match projects {
            Ok(count) => change.projects = count,
            Err(e) => error!(organization_id = %organization_id, source_ref, error = %e, "Failed to update project lifecycle"),
        }
        match suites {
            Ok(count) => change.suites = count,
            Err(e) => error!(organization_id = %organization_id, source_ref, error = %e, "Failed to update suite lifecycle"),
        }
        info!(
            organization_id = %organization_id,
            source_ref,
            action = ?action,
            projects = change.projects,
            suites = change.suites,
            "Applied pull request lifecycle"
        );
        change
    }

    async fn apply_head_update(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        update: &HeadUpdate,
    ) -> u64 {
        match self
            .store
            .update_default_branch_head(
                organization_id,
                repo_url,
                &update.default_branch,
                &update.head,
            )
            .await
        {
            Ok(updated) => {
                debug!(organization_id = %organization_id, sha = %update.head.sha, updated, "Updated default branch head");
                updated
            }
            Err(e) => {
                error!(organization_id = %organization_id, error = %e, "Failed to update default branch head");
                0
            }
        }
    }
}

/// Use case for connecting a repository: scan the default branch, then every open pull request
pub struct BootstrapRepositoryUseCase {
    store: Arc<dyn IReconciliationStore>,
    content: Arc<dyn RepositoryContentClient>,
    scanner: Arc<Scanner>,
}

impl BootstrapRepositoryUseCase {
    pub fn new(
        store: Arc<dyn IReconciliationStore>,
        content: Arc<dyn RepositoryContentClient>,
        scanner: Arc<Scanner>,
    ) -> Self {
        Self {
            store,
            content,
            scanner,
        }
    }

    #[tracing::instrument(skip(self), fields(organization_id = %organization_id))]
    pub async fn execute(
        &self,
        organization_id: OrganizationId,
        repo_full_name: &str,
    ) -> Result<BootstrapReport, ApplicationError> {
        let requested: RepositoryName = repo_full_name
            .parse()
            .map_err(|_| ApplicationError::invalid("repo_full_name must be owner/repo"))?;

        let installation = self
            .store
            .get_installation(organization_id)
            .await?
            .ok_or(ApplicationError::NotInstalled { organization_id })?;
        let installation_id = installation.installation_id;

        let info = self
            .content
            .list_installation_repositories(installation_id)
            .await?
            .into_iter()
            .find(|repo| repo.full_name.eq_ignore_ascii_case(&requested.full_name()))
            .ok_or_else(|| ApplicationError::RepositoryNotFound {
                repository: requested.full_name(),
            })?;
        let repository = info.full_name.parse().unwrap_or(requested);
        let default_branch = info.default_branch.clone();

        let delivery_id = format!("bootstrap-{}-{}", organization_id.short(), repository.name);
        let delivery = WebhookDelivery {
            delivery_id: delivery_id.clone(),
            event: "bootstrap".to_string(),
            repository_full_name: Some(repository.full_name()),
            git_ref: Some(NormalizedRef::branch(default_branch.as_str()).raw),
            action: None,
        };
        if let Err(e) = self.store.insert_webhook_delivery(&delivery).await {
            error!(delivery_id = %delivery_id, error = %e, "Failed to record bootstrap delivery");
        }

        let head_sha = match self
            .content
            .get_branch_head_sha(installation_id, &repository, &default_branch)
            .await
        {
            Ok(sha) => Some(sha),
            Err(e) => {
                warn!(branch = %default_branch, error = %e, "Could not resolve default branch head, scanning by name");
                None
            }
        };

        let mut scans = Vec::new();
        let default_input = ScanInput {
            organization_id,
            installation_id,
            repository: repository.clone(),
            source_ref: NormalizedRef::branch(default_branch.as_str()),
            head_sha,
            delivery_id: delivery_id.clone(),
        };
        let outcome = self
            .scanner
            .scan_and_record(&default_input, ScanKind::Full)
            .await;
        scans.push(BootstrapScan::from(&outcome));

        match self
            .content
            .list_open_pull_requests(installation_id, &repository)
            .await
        {
            Ok(pull_requests) => {
                for pr in pull_requests.into_iter().filter(|pr| !pr.head_ref.is_empty()) {
                    let input = ScanInput {
                        organization_id,
                        installation_id,
                        repository: repository.clone(),
                        source_ref: NormalizedRef::branch(pr.head_ref.as_str()),
                        head_sha: Some(pr.head_sha).filter(|sha| !sha.is_empty()),
                        delivery_id: delivery_id.clone(),
                    };
                    let outcome = self
                        .scanner
                        .scan_and_record(
                            &input,
                            ScanKind::Delta {
                                pr_number: pr.number,
                            },
                        )
                        .await;
                    scans.push(BootstrapScan::from(&outcome));
                }
            }
            Err(e) => warn!(repo = %repository, error = %e, "Failed to list open pull requests"),
        }

        info!(
            repo = %repository,
            scans = scans.len(),
            "Repository bootstrap finished"
        );

        Ok(BootstrapReport {
            repo_full_name: repository.full_name(),
            default_branch,
            scans,
        })
    }
}

/// Use case for binding an installation to an organization
pub struct RegisterInstallationUseCase {
    store: Arc<dyn IReconciliationStore>,
    content: Arc<dyn RepositoryContentClient>,
    install_url: String,
}

impl RegisterInstallationUseCase {
    pub fn new(
        store: Arc<dyn IReconciliationStore>,
        content: Arc<dyn RepositoryContentClient>,
        install_url: String,
    ) -> Self {
        Self {
            store,
            content,
            install_url,
        }
    }

    pub async fn execute(
        &self,
        organization_id: OrganizationId,
        installation_id: i64,
    ) -> Result<InstallationStatus, ApplicationError> {
        if installation_id <= 0 {
            return Err(ApplicationError::invalid("installation_id must be positive"));
        }

        let info = self
            .content
            .get_installation_info(installation_id)
            .await?
            .ok_or(ApplicationError::InstallationNotFound { installation_id })?;

        let installation = GitHubAppInstallation {
            organization_id,
            installation_id,
            account_login: info.account_login,
            account_type: info.account_type,
            installed_at: Utc::now(),
        };
        self.store.upsert_installation(&installation).await?;
        info!(
            organization_id = %organization_id,
            installation_id,
            account = %installation.account_login,
            "Registered GitHub App installation"
        );

        Ok(InstallationStatus::new(
            self.install_url.clone(),
            Some(&installation),
        ))
    }
}

pub struct GetInstallationStatusUseCase {
    store: Arc<dyn IReconciliationStore>,
    install_url: String,
}

impl GetInstallationStatusUseCase {
    pub fn new(store: Arc<dyn IReconciliationStore>, install_url: String) -> Self {
        Self { store, install_url }
    }

    pub async fn execute(
        &self,
        organization_id: OrganizationId,
    ) -> Result<InstallationStatus, ApplicationError> {
        let installation = self.store.get_installation(organization_id).await?;
        Ok(InstallationStatus::new(
            self.install_url.clone(),
            installation.as_ref(),
        ))
    }
}

pub struct ListInstallationRepositoriesUseCase {
    store: Arc<dyn IReconciliationStore>,
    content: Arc<dyn RepositoryContentClient>,
}

impl ListInstallationRepositoriesUseCase {
    pub fn new(
        store: Arc<dyn IReconciliationStore>,
        content: Arc<dyn RepositoryContentClient>,
    ) -> Self {
        Self { store, content }
    }

    pub async fn execute(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<RepositoryInfo>, ApplicationError> {
        let installation = self
            .store
            .get_installation(organization_id)
            .await?
            .ok_or(ApplicationError::NotInstalled { organization_id })?;
        Ok(self
            .content
            .list_installation_repositories(installation.installation_id)
            .await?)
    }
}

pub struct ListScanAttemptsUseCase {
    store: Arc<dyn IReconciliationStore>,
}

impl ListScanAttemptsUseCase {
    pub fn new(store: Arc<dyn IReconciliationStore>) -> Self {
        Self { store }
    }

    pub async fn execute(
        &self,
        organization_id: OrganizationId,
        limit: Option<i64>,
    ) -> Result<Vec<ScanAttempt>, ApplicationError> {
        Ok(self
            .store
            .list_recent_scan_attempts(organization_id, clamp_limit(limit))
            .await?)
    }
}

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit
        .unwrap_or(DEFAULT_SCAN_ATTEMPT_LIMIT)
        .clamp(1, MAX_SCAN_ATTEMPT_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(None, 20)]
    #[case(Some(0), 1)]
    #[case(Some(-5), 1)]
    #[case(Some(50), 50)]
    #[case(Some(5000), 1000)]
    fn test_clamp_limit(#[case] limit: Option<i64>, #[case] expected: i64) {
        assert_eq!(clamp_limit(limit), expected);
    }
}
