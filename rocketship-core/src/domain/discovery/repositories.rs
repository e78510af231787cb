//! Reconciliation store trait
//!
//! Every write is keyed by a natural key (name, file path, source ref) so that
//! replayed or concurrent webhook deliveries converge on the same rows.

use async_trait::async_trait;
use uuid::Uuid;

use super::entities::{
    DefaultBranchHead, GitHubAppInstallation, NewProject, NewScanAttempt,
    Project, RefScope, ScanAttempt, Suite, SuiteUpsert, Test, TestUpsert, WebhookDelivery,
};
use super::errors::StoreError;
use super::value_objects::{DeactivationReason, OrganizationId};

/// Persistence boundary used by the scanner and the webhook use cases
#[async_trait]
pub trait IReconciliationStore: Send + Sync {
    // --- Projects ---

    /// Insert a project. A concurrent insert of the same `(organization, name, source_ref)`
    /// yields [`StoreError::Conflict`].
    async fn create_project(&self, project: &NewProject) -> Result<Project, StoreError>;

    /// Case-insensitive check on `(organization, name, source_ref)`
    async fn project_name_exists(
        &self,
        organization_id: OrganizationId,
        name: &str,
        source_ref: &str,
    ) -> Result<bool, StoreError>;

    /// All projects of an organization, active or not, ordered by name then source ref
    async fn list_projects(&self, organization_id: OrganizationId)
    -> Result<Vec<Project>, StoreError>;

    /// Active project tracking the default branch for the same repository and path scope
    async fn find_default_branch_project(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        path_scope: &[String],
    ) -> Result<Option<Project>, StoreError>;

    /// Record the latest default-branch commit on every project of a repository.
    /// Returns the number of projects updated.
    async fn update_default_branch_head(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        default_branch: &str,
        head: &DefaultBranchHead,
    ) -> Result<u64, StoreError>;

    // --- Suites and tests ---

    /// Create or update a suite by `(project_id, file_path, source_ref)`; updates reactivate.
    async fn upsert_suite(&self, suite: &SuiteUpsert) -> Result<Suite, StoreError>;

    /// Create or update a test by `(suite_id, name, source_ref)`; updates reactivate.
    async fn upsert_test(&self, test: &TestUpsert) -> Result<Test, StoreError>;

    /// Tombstone active suites under `rocketship_dir/` for this ref whose path is not in
    /// `present_file_paths`, together with their tests. Returns the number of suites.
    async fn deactivate_suites_missing_from_directory(
        &self,
        project_id: Uuid,
        source_ref: &str,
        rocketship_dir: &str,
        present_file_paths: &[String],
        reason: DeactivationReason,
    ) -> Result<u64, StoreError>;

    /// Tombstone active tests of a suite for this ref whose name is not in `present_test_names`.
    async fn deactivate_tests_missing_from_suite(
        &self,
        suite_id: Uuid,
        source_ref: &str,
        present_test_names: &[String],
        reason: DeactivationReason,
    ) -> Result<u64, StoreError>;

    /// Tombstone the suite at `file_path` and its tests. A missing suite is not an error;
    /// returns whether a suite was found.
    async fn deactivate_suite_by_path(
        &self,
        project_id: Uuid,
        source_ref: &str,
        file_path: &str,
        reason: DeactivationReason,
    ) -> Result<bool, StoreError>;

    // --- Pull request lifecycle ---

    /// Tombstone projects whose own source ref matches, cascading to their suites and tests
    async fn deactivate_projects_for_ref(
        &self,
        scope: &RefScope<'_>,
        reason: DeactivationReason,
    ) -> Result<u64, StoreError>;

    /// Tombstone suites (and tests) for this ref across every project of the repository
    async fn deactivate_suites_for_ref(
        &self,
        scope: &RefScope<'_>,
        reason: DeactivationReason,
    ) -> Result<u64, StoreError>;

    /// Undo lifecycle tombstones (`closed` / `merged`) on projects whose own source ref
    /// matches, cascading to their suites and tests
    async fn reactivate_projects_for_ref(&self, scope: &RefScope<'_>) -> Result<u64, StoreError>;

    /// Undo lifecycle tombstones on suites (and tests) for this ref across every project of
    /// the repository, including reused default-branch projects
    async fn reactivate_suites_for_ref(&self, scope: &RefScope<'_>) -> Result<u64, StoreError>;

    // --- Audit ---

    async fn insert_scan_attempt(&self, attempt: &NewScanAttempt) -> Result<ScanAttempt, StoreError>;

    /// Most recent attempts first
    async fn list_recent_scan_attempts(
        &self,
        organization_id: OrganizationId,
        limit: i64,
    ) -> Result<Vec<ScanAttempt>, StoreError>;

    /// Insert keyed by delivery id; a duplicate delivery is ignored. Returns whether a row
    /// was written.
    async fn insert_webhook_delivery(&self, delivery: &WebhookDelivery) -> Result<bool, StoreError>;

    // --- Installations ---

    /// Organizations bound to an installation (multi-tenant fan-out)
    async fn list_orgs_by_installation(
        &self,
        installation_id: i64,
    ) -> Result<Vec<OrganizationId>, StoreError>;

    async fn upsert_installation(
        &self,
        installation: &GitHubAppInstallation,
    ) -> Result<(), StoreError>;

    async fn get_installation(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<GitHubAppInstallation>, StoreError>;
}
