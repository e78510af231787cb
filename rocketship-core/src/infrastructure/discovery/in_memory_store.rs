//! In-memory reconciliation store
//!
//! Mirrors the PostgreSQL semantics (case-insensitive natural keys, reactivating upserts,
//! cascading tombstones) so scanner and webhook flows can be exercised without a database.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::discovery::{
    DeactivationReason, DefaultBranchHead, GitHubAppInstallation, IReconciliationStore,
    NewProject, NewScanAttempt, OrganizationId, Project, RefScope, ScanAttempt, StoreError, Suite,
    SuiteUpsert, Test, TestUpsert, WebhookDelivery, parse_reason,
};

#[derive(Default)]
struct State {
    projects: Vec<Project>,
    suites: Vec<Suite>,
    tests: Vec<Test>,
    scan_attempts: Vec<ScanAttempt>,
    deliveries: Vec<WebhookDelivery>,
    installations: HashMap<Uuid, GitHubAppInstallation>,
    /// Next `create_project` behaves as if a concurrent writer inserted the row first
    lose_next_project_race: bool,
}

fn eq(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

fn contains_ignore_case(values: &[String], needle: &str) -> bool {
    values.iter().any(|v| eq(v, needle))
}

fn is_lifecycle_tombstone(reason: Option<&str>) -> bool {
    parse_reason(reason).is_some_and(|r| r.is_lifecycle())
}

trait Lifecycle {
    fn tombstone(&mut self, reason: DeactivationReason);
    fn revive(&mut self);
}

macro_rules! impl_lifecycle {
    ($($entity:ty),*) => {
        $(impl Lifecycle for $entity {
            fn tombstone(&mut self, reason: DeactivationReason) {
                let now = Utc::now();
                self.is_active = false;
                self.deactivated_at = Some(now);
                self.deactivated_reason = Some(reason.as_str().to_string());
                self.updated_at = now;
            }

            fn revive(&mut self) {
                self.is_active = true;
                self.deactivated_at = None;
                self.deactivated_reason = None;
                self.updated_at = Utc::now();
            }
        })*
    };
}

impl_lifecycle!(Project, Suite, Test);

/// Reconciliation store kept in process memory
#[derive(Default)]
pub struct InMemoryReconciliationStore {
    state: RwLock<State>,
}

impl InMemoryReconciliationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn projects(&self) -> Vec<Project> {
        self.state.read().await.projects.clone()
    }

    pub async fn suites(&self) -> Vec<Suite> {
        self.state.read().await.suites.clone()
    }

    pub async fn tests(&self) -> Vec<Test> {
        self.state.read().await.tests.clone()
    }

    pub async fn scan_attempts(&self) -> Vec<ScanAttempt> {
        self.state.read().await.scan_attempts.clone()
    }

    pub async fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.state.read().await.deliveries.clone()
    }

    /// Make the next project insert report a unique violation after storing the row,
    /// as when two scans create the same project concurrently.
    pub async fn lose_next_project_race(&self) {
        self.state.write().await.lose_next_project_race = true;
    }

    fn tombstone_tests_of_suites(
        tests: &mut [Test],
        suite_ids: &[Uuid],
        source_ref: &str,
        reason: DeactivationReason,
    ) {
        for test in tests.iter_mut().filter(|t| {
            t.is_active && suite_ids.contains(&t.suite_id) && eq(&t.source_ref, source_ref)
        }) {
            test.tombstone(reason);
        }
    }
}

#[async_trait]
impl IReconciliationStore for InMemoryReconciliationStore {
    async fn create_project(&self, project: &NewProject) -> Result<Project, StoreError> {
        project.validate()?;
        let mut state = self.state.write().await;

        let duplicate = state.projects.iter().any(|p| {
            p.organization_id == project.organization_id
                && eq(&p.name, &project.name)
                && eq(&p.source_ref, &project.source_ref)
        });

        let conflict = || StoreError::Conflict {
            constraint: "projects_org_name_ref_idx".to_string(),
            message: "project name already exists in organization for this ref".to_string(),
        };
        if duplicate {
            return Err(conflict());
        }

        let now = Utc::now();
        let created = Project {
            id: Uuid::new_v4(),
            organization_id: project.organization_id,
            name: project.name.clone(),
            repo_url: project.repo_url.clone(),
            default_branch: project.default_branch.clone(),
            path_scope: project.path_scope.clone(),
            source_ref: project.source_ref.clone(),
            is_active: true,
            deactivated_at: None,
            deactivated_reason: None,
            default_branch_head: None,
            created_at: now,
            updated_at: now,
        };
        state.projects.push(created.clone());

        if std::mem::take(&mut state.lose_next_project_race) {
            return Err(conflict());
        }
        Ok(created)
    }

    async fn project_name_exists(
        &self,
        organization_id: OrganizationId,
        name: &str,
        source_ref: &str,
    ) -> Result<bool, StoreError> {
        let state = self.state.read().await;
        Ok(state.projects.iter().any(|p| {
            p.organization_id == organization_id
                && eq(&p.name, name)
                && eq(&p.source_ref, source_ref)
        }))
    }

    async fn list_projects(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Project>, StoreError> {
        let state = self.state.read().await;
        let mut projects: Vec<Project> = state
            .projects
            .iter()
            .filter(|p| p.organization_id == organization_id)
            .cloned()
            .collect();
        projects.sort_by(|a, b| {
            a.name
                .cmp(&b.name)
                .then_with(|| a.source_ref.cmp(&b.source_ref))
        });
        Ok(projects)
    }

    async fn find_default_branch_project(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        path_scope: &[String],
    ) -> Result<Option<Project>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .projects
            .iter()
            .find(|p| {
                p.is_active
                    && p.organization_id == organization_id
                    && eq(&p.repo_url, repo_url)
                    && p.path_scope == path_scope
                    && p.source_ref == p.default_branch
            })
            .cloned())
    }

    async fn update_default_branch_head(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        default_branch: &str,
        head: &DefaultBranchHead,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        for project in state.projects.iter_mut().filter(|p| {
            p.organization_id == organization_id
                && eq(&p.repo_url, repo_url)
                && eq(&p.default_branch, default_branch)
        }) {
            project.default_branch_head = Some(head.clone());
            project.updated_at = Utc::now();
            updated += 1;
        }
        Ok(updated)
    }

    async fn upsert_suite(&self, suite: &SuiteUpsert) -> Result<Suite, StoreError> {
        suite.validate()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.suites.iter_mut().find(|s| {
            s.project_id == suite.project_id
                && eq(&s.file_path, &suite.file_path)
                && eq(&s.source_ref, &suite.source_ref)
        }) {
            existing.name = suite.name.clone();
            existing.description = suite.description.clone();
            existing.yaml_payload = suite.yaml_payload.clone();
            existing.test_count = suite.test_count;
            existing.revive();
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let created = Suite {
            id: Uuid::new_v4(),
            project_id: suite.project_id,
            name: suite.name.clone(),
            description: suite.description.clone(),
            file_path: suite.file_path.clone(),
            source_ref: suite.source_ref.clone(),
            test_count: suite.test_count,
            yaml_payload: suite.yaml_payload.clone(),
            is_active: true,
            deactivated_at: None,
            deactivated_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.suites.push(created.clone());
        Ok(created)
    }

    async fn upsert_test(&self, test: &TestUpsert) -> Result<Test, StoreError> {
        test.validate()?;
        let mut state = self.state.write().await;

        if let Some(existing) = state.tests.iter_mut().find(|t| {
            t.suite_id == test.suite_id
                && eq(&t.name, &test.name)
                && eq(&t.source_ref, &test.source_ref)
        }) {
            existing.step_count = test.step_count;
            existing.revive();
            return Ok(existing.clone());
        }

        let now = Utc::now();
        let created = Test {
            id: Uuid::new_v4(),
            suite_id: test.suite_id,
            project_id: test.project_id,
            name: test.name.clone(),
            source_ref: test.source_ref.clone(),
            step_count: test.step_count,
            is_active: true,
            deactivated_at: None,
            deactivated_reason: None,
            created_at: now,
            updated_at: now,
        };
        state.tests.push(created.clone());
        Ok(created)
    }

    async fn deactivate_suites_missing_from_directory(
        &self,
        project_id: Uuid,
        source_ref: &str,
        rocketship_dir: &str,
        present_file_paths: &[String],
        reason: DeactivationReason,
    ) -> Result<u64, StoreError> {
        if source_ref.trim().is_empty() {
            return Err(StoreError::invalid("source ref required"));
        }
        if rocketship_dir.trim().is_empty() {
            return Err(StoreError::invalid("rocketship dir required"));
        }

        let prefix = format!("{}/", rocketship_dir.trim_end_matches('/')).to_lowercase();
        let mut state = self.state.write().await;
        let mut suite_ids = Vec::new();

        for suite in state.suites.iter_mut().filter(|s| {
            s.is_active
                && s.project_id == project_id
                && eq(&s.source_ref, source_ref)
                && s.file_path.to_lowercase().starts_with(&prefix)
                && !contains_ignore_case(present_file_paths, &s.file_path)
        }) {
            suite.tombstone(reason);
            suite_ids.push(suite.id);
        }

        Self::tombstone_tests_of_suites(&mut state.tests, &suite_ids, source_ref, reason);
        Ok(suite_ids.len() as u64)
    }

    async fn deactivate_tests_missing_from_suite(
        &self,
        suite_id: Uuid,
        source_ref: &str,
        present_test_names: &[String],
        reason: DeactivationReason,
    ) -> Result<u64, StoreError> {
        if source_ref.trim().is_empty() {
            return Err(StoreError::invalid("source ref required"));
        }

        let mut state = self.state.write().await;
        let mut count = 0;
        for test in state.tests.iter_mut().filter(|t| {
            t.is_active
                && t.suite_id == suite_id
                && eq(&t.source_ref, source_ref)
                && !contains_ignore_case(present_test_names, &t.name)
        }) {
            test.tombstone(reason);
            count += 1;
        }
        Ok(count)
    }

    async fn deactivate_suite_by_path(
        &self,
        project_id: Uuid,
        source_ref: &str,
        file_path: &str,
        reason: DeactivationReason,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let Some(suite) = state.suites.iter_mut().find(|s| {
            s.project_id == project_id
                && eq(&s.source_ref, source_ref)
                && eq(&s.file_path, file_path)
        }) else {
            return Ok(false);
        };

        suite.tombstone(reason);
        let suite_id = suite.id;
        Self::tombstone_tests_of_suites(&mut state.tests, &[suite_id], source_ref, reason);
        Ok(true)
    }

    async fn deactivate_projects_for_ref(
        &self,
        scope: &RefScope<'_>,
        reason: DeactivationReason,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut project_ids = Vec::new();

        for project in state.projects.iter_mut().filter(|p| {
            p.is_active
                && p.organization_id == scope.organization_id
                && eq(&p.repo_url, scope.repo_url)
                && eq(&p.source_ref, scope.source_ref)
        }) {
            project.tombstone(reason);
            project_ids.push(project.id);
        }

        for suite in state
            .suites
            .iter_mut()
            .filter(|s| s.is_active && project_ids.contains(&s.project_id))
        {
            suite.tombstone(reason);
        }
        for test in state
            .tests
            .iter_mut()
            .filter(|t| t.is_active && project_ids.contains(&t.project_id))
        {
            test.tombstone(reason);
        }

        Ok(project_ids.len() as u64)
    }

    async fn deactivate_suites_for_ref(
        &self,
        scope: &RefScope<'_>,
        reason: DeactivationReason,
    ) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let repo_projects: Vec<Uuid> = state
            .projects
            .iter()
            .filter(|p| p.organization_id == scope.organization_id && eq(&p.repo_url, scope.repo_url))
            .map(|p| p.id)
            .collect();

        let mut suite_ids = Vec::new();
        for suite in state.suites.iter_mut().filter(|s| {
            s.is_active && repo_projects.contains(&s.project_id) && eq(&s.source_ref, scope.source_ref)
        }) {
            suite.tombstone(reason);
            suite_ids.push(suite.id);
        }

        Self::tombstone_tests_of_suites(&mut state.tests, &suite_ids, scope.source_ref, reason);
        Ok(suite_ids.len() as u64)
    }

    async fn reactivate_projects_for_ref(&self, scope: &RefScope<'_>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let mut project_ids = Vec::new();

        for project in state.projects.iter_mut().filter(|p| {
            !p.is_active
                && is_lifecycle_tombstone(p.deactivated_reason.as_deref())
                && p.organization_id == scope.organization_id
                && eq(&p.repo_url, scope.repo_url)
                && eq(&p.source_ref, scope.source_ref)
        }) {
            project.revive();
            project_ids.push(project.id);
        }

        for suite in state.suites.iter_mut().filter(|s| {
            !s.is_active
                && is_lifecycle_tombstone(s.deactivated_reason.as_deref())
                && project_ids.contains(&s.project_id)
        }) {
            suite.revive();
        }
        for test in state.tests.iter_mut().filter(|t| {
            !t.is_active
                && is_lifecycle_tombstone(t.deactivated_reason.as_deref())
                && project_ids.contains(&t.project_id)
        }) {
            test.revive();
        }

        Ok(project_ids.len() as u64)
    }

    async fn reactivate_suites_for_ref(&self, scope: &RefScope<'_>) -> Result<u64, StoreError> {
        let mut state = self.state.write().await;
        let repo_projects: Vec<Uuid> = state
            .projects
            .iter()
            .filter(|p| p.organization_id == scope.organization_id && eq(&p.repo_url, scope.repo_url))
            .map(|p| p.id)
            .collect();

        let mut suite_ids = Vec::new();
        for suite in state.suites.iter_mut().filter(|s| {
            !s.is_active
                && is_lifecycle_tombstone(s.deactivated_reason.as_deref())
                && repo_projects.contains(&s.project_id)
                && eq(&s.source_ref, scope.source_ref)
        }) {
            suite.revive();
            suite_ids.push(suite.id);
        }

        for test in state.tests.iter_mut().filter(|t| {
            !t.is_active
                && is_lifecycle_tombstone(t.deactivated_reason.as_deref())
                && suite_ids.contains(&t.suite_id)
                && eq(&t.source_ref, scope.source_ref)
        }) {
            test.revive();
        }

        Ok(suite_ids.len() as u64)
    }

    async fn insert_scan_attempt(
        &self,
        attempt: &NewScanAttempt,
    ) -> Result<ScanAttempt, StoreError> {
        let recorded = ScanAttempt {
            id: Uuid::new_v4(),
            delivery_id: attempt.delivery_id.clone(),
            organization_id: attempt.organization_id,
            repository_full_name: attempt.repository_full_name.clone(),
            source_ref: attempt.source_ref.clone(),
            head_sha: attempt.head_sha.clone(),
            status: attempt.status,
            error_message: attempt.error_message.clone(),
            suites_found: attempt.suites_found,
            tests_found: attempt.tests_found,
            created_at: Utc::now(),
        };
        self.state.write().await.scan_attempts.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_recent_scan_attempts(
        &self,
        organization_id: OrganizationId,
        limit: i64,
    ) -> Result<Vec<ScanAttempt>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .scan_attempts
            .iter()
            .rev()
            .filter(|a| a.organization_id == organization_id)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn insert_webhook_delivery(
        &self,
        delivery: &WebhookDelivery,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        if state
            .deliveries
            .iter()
            .any(|d| d.delivery_id == delivery.delivery_id)
        {
            return Ok(false);
        }
        state.deliveries.push(delivery.clone());
        Ok(true)
    }

    async fn list_orgs_by_installation(
        &self,
        installation_id: i64,
    ) -> Result<Vec<OrganizationId>, StoreError> {
        let state = self.state.read().await;
        let mut bound: Vec<&GitHubAppInstallation> = state
            .installations
            .values()
            .filter(|i| i.installation_id == installation_id)
            .collect();
        bound.sort_by_key(|i| i.installed_at);
        Ok(bound.into_iter().map(|i| i.organization_id).collect())
    }

    async fn upsert_installation(
        &self,
        installation: &GitHubAppInstallation,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = installation.organization_id.as_uuid();
        let installed_at = state
            .installations
            .get(&key)
            .map(|existing| existing.installed_at)
            .unwrap_or(installation.installed_at);

        state.installations.insert(
            key,
            GitHubAppInstallation {
                installed_at,
                ..installation.clone()
            },
        );
        Ok(())
    }

    async fn get_installation(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<GitHubAppInstallation>, StoreError> {
        let state = self.state.read().await;
        Ok(state.installations.get(&organization_id.as_uuid()).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn org() -> OrganizationId {
        OrganizationId::generate()
    }

    fn new_project(org: OrganizationId, name: &str, source_ref: &str) -> NewProject {
        NewProject {
            organization_id: org,
            name: name.to_string(),
            repo_url: "https://github.com/acme/widgets".to_string(),
            default_branch: "main".to_string(),
            path_scope: vec![".rocketship/**".to_string()],
            source_ref: source_ref.to_string(),
        }
    }

    fn suite(project_id: Uuid, path: &str, source_ref: &str) -> SuiteUpsert {
        SuiteUpsert {
            project_id,
            name: path.to_string(),
            description: None,
            file_path: path.to_string(),
            source_ref: source_ref.to_string(),
            test_count: 1,
            yaml_payload: None,
        }
    }

    #[tokio::test]
    async fn test_project_names_are_unique_ignoring_case() {
        let store = InMemoryReconciliationStore::new();
        let org = org();
        store
            .create_project(&new_project(org, "widgets", "main"))
            .await
            .unwrap();

        let err = store
            .create_project(&new_project(org, "Widgets", "MAIN"))
            .await
            .unwrap_err();
        assert!(err.is_conflict());
        assert!(store.project_name_exists(org, "WIDGETS", "main").await.unwrap());
        assert!(
            store
                .create_project(&new_project(org, "widgets", "feature"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_suite_upsert_reactivates() {
        let store = InMemoryReconciliationStore::new();
        let project = store
            .create_project(&new_project(org(), "widgets", "main"))
            .await
            .unwrap();

        let first = store
            .upsert_suite(&suite(project.id, ".rocketship/a.yaml", "main"))
            .await
            .unwrap();
        assert!(
            store
                .deactivate_suite_by_path(
                    project.id,
                    "main",
                    ".rocketship/A.yaml",
                    DeactivationReason::RemovedInPr
                )
                .await
                .unwrap()
        );
        assert!(!store.suites().await[0].is_active);

        let second = store
            .upsert_suite(&suite(project.id, ".rocketship/a.yaml", "main"))
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert!(second.is_active);
        assert!(second.deactivated_reason.is_none());
    }

    #[tokio::test]
    async fn test_missing_suite_by_path_is_not_an_error() {
        let store = InMemoryReconciliationStore::new();
        let found = store
            .deactivate_suite_by_path(
                Uuid::new_v4(),
                "main",
                ".rocketship/nope.yaml",
                DeactivationReason::RemovedInPr,
            )
            .await
            .unwrap();
        assert!(!found);
    }

    #[tokio::test]
    async fn test_reactivation_only_undoes_lifecycle_tombstones() {
        let store = InMemoryReconciliationStore::new();
        let org = org();
        let project = store
            .create_project(&new_project(org, "widgets-feature", "feature"))
            .await
            .unwrap();
        store
            .upsert_suite(&suite(project.id, ".rocketship/kept.yaml", "feature"))
            .await
            .unwrap();
        store
            .upsert_suite(&suite(project.id, ".rocketship/removed.yaml", "feature"))
            .await
            .unwrap();
        store
            .deactivate_suite_by_path(
                project.id,
                "feature",
                ".rocketship/removed.yaml",
                DeactivationReason::RemovedInPr,
            )
            .await
            .unwrap();

        let scope = RefScope {
            organization_id: org,
            repo_url: "https://github.com/acme/widgets",
            source_ref: "feature",
        };
        assert_eq!(
            store
                .deactivate_projects_for_ref(&scope, DeactivationReason::Closed)
                .await
                .unwrap(),
            1
        );
        assert!(store.suites().await.iter().all(|s| !s.is_active));

        assert_eq!(store.reactivate_projects_for_ref(&scope).await.unwrap(), 1);
        let suites = store.suites().await;
        let kept = suites.iter().find(|s| s.file_path.ends_with("kept.yaml")).unwrap();
        let removed = suites
            .iter()
            .find(|s| s.file_path.ends_with("removed.yaml"))
            .unwrap();
        assert!(kept.is_active);
        assert!(!removed.is_active);
        assert_eq!(removed.deactivated_reason.as_deref(), Some("removed_in_pr"));
    }

    #[tokio::test]
    async fn test_repo_url_matching_ignores_case() {
        let store = InMemoryReconciliationStore::new();
        let org = org();
        let project = store
            .create_project(&new_project(org, "widgets", "main"))
            .await
            .unwrap();

        let found = store
            .find_default_branch_project(
                org,
                "https://github.com/Acme/Widgets",
                &[".rocketship/**".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(found.map(|p| p.id), Some(project.id));

        let scope = RefScope {
            organization_id: org,
            repo_url: "https://github.com/ACME/widgets",
            source_ref: "Main",
        };
        assert_eq!(
            store
                .deactivate_projects_for_ref(&scope, DeactivationReason::Closed)
                .await
                .unwrap(),
            1
        );
        assert_eq!(store.reactivate_projects_for_ref(&scope).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_directory_reconciliation_matches_literal_prefix_ignoring_case() {
        let store = InMemoryReconciliationStore::new();
        let project = store
            .create_project(&new_project(org(), "widgets", "main"))
            .await
            .unwrap();
        store
            .upsert_suite(&suite(project.id, "Web_App/.rocketship/a.yaml", "main"))
            .await
            .unwrap();
        store
            .upsert_suite(&suite(project.id, "webXapp/.rocketship/b.yaml", "main"))
            .await
            .unwrap();

        let removed = store
            .deactivate_suites_missing_from_directory(
                project.id,
                "main",
                "web_app/.rocketship",
                &[],
                DeactivationReason::MissingFromScan,
            )
            .await
            .unwrap();
        assert_eq!(removed, 1);

        let suites = store.suites().await;
        let sibling = suites
            .iter()
            .find(|s| s.file_path.starts_with("webXapp"))
            .unwrap();
        assert!(sibling.is_active);
    }

    #[tokio::test]
    async fn test_duplicate_delivery_is_ignored() {
        let store = InMemoryReconciliationStore::new();
        let delivery = WebhookDelivery {
            delivery_id: "d-1".to_string(),
            event: "push".to_string(),
            repository_full_name: Some("acme/widgets".to_string()),
            git_ref: Some("refs/heads/main".to_string()),
            action: None,
        };
        assert!(store.insert_webhook_delivery(&delivery).await.unwrap());
        assert!(!store.insert_webhook_delivery(&delivery).await.unwrap());
        assert_eq!(store.deliveries().await.len(), 1);
    }
}
