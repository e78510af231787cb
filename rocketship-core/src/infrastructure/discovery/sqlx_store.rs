//! SQLx (PostgreSQL) implementation of the reconciliation store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use sqlx::types::Json;
use std::sync::Arc;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::discovery::{
    DeactivationReason, DefaultBranchHead, GitHubAppInstallation, IReconciliationStore,
    NewProject, NewScanAttempt, OrganizationId, Project, RefScope, ScanAttempt, StoreError, Suite,
    SuiteUpsert, Test, TestUpsert, WebhookDelivery,
};

const PROJECT_UNIQUE_INDEX: &str = "projects_org_name_ref_idx";

fn database_error(context: &str, e: sqlx::Error) -> StoreError {
    tracing::error!(error = %e, "Database error {}", context);
    StoreError::DatabaseError {
        message: e.to_string(),
    }
}

fn lifecycle_reasons() -> Vec<String> {
    DeactivationReason::lifecycle_reasons()
        .iter()
        .map(|r| r.as_str().to_string())
        .collect()
}

#[derive(sqlx::FromRow)]
struct ProjectRow {
    id: Uuid,
    organization_id: Uuid,
    name: String,
    repo_url: String,
    default_branch: String,
    path_scope: Json<Vec<String>>,
    source_ref: String,
    is_active: bool,
    deactivated_at: Option<DateTime<Utc>>,
    deactivated_reason: Option<String>,
    default_branch_head_sha: Option<String>,
    default_branch_head_message: Option<String>,
    default_branch_head_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProjectRow> for Project {
    fn from(row: ProjectRow) -> Self {
        let default_branch_head = match (row.default_branch_head_sha, row.default_branch_head_at) {
            (Some(sha), Some(at)) => Some(DefaultBranchHead {
                sha,
                message: row.default_branch_head_message.unwrap_or_default(),
                at,
            }),
            _ => None,
        };

        Self {
            id: row.id,
            organization_id: OrganizationId::from(row.organization_id),
            name: row.name,
            repo_url: row.repo_url,
            default_branch: row.default_branch,
            path_scope: row.path_scope.0,
            source_ref: row.source_ref,
            is_active: row.is_active,
            deactivated_at: row.deactivated_at,
            deactivated_reason: row.deactivated_reason,
            default_branch_head,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SuiteRow {
    id: Uuid,
    project_id: Uuid,
    name: String,
    description: Option<String>,
    file_path: String,
    source_ref: String,
    test_count: i32,
    yaml_payload: Option<String>,
    is_active: bool,
    deactivated_at: Option<DateTime<Utc>>,
    deactivated_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SuiteRow> for Suite {
    fn from(row: SuiteRow) -> Self {
        Self {
            id: row.id,
            project_id: row.project_id,
            name: row.name,
            description: row.description,
            file_path: row.file_path,
            source_ref: row.source_ref,
            test_count: row.test_count,
            yaml_payload: row.yaml_payload,
            is_active: row.is_active,
            deactivated_at: row.deactivated_at,
            deactivated_reason: row.deactivated_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TestRow {
    id: Uuid,
    suite_id: Uuid,
    project_id: Uuid,
    name: String,
    source_ref: String,
    step_count: i32,
    is_active: bool,
    deactivated_at: Option<DateTime<Utc>>,
    deactivated_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TestRow> for Test {
    fn from(row: TestRow) -> Self {
        Self {
            id: row.id,
            suite_id: row.suite_id,
            project_id: row.project_id,
            name: row.name,
            source_ref: row.source_ref,
            step_count: row.step_count,
            is_active: row.is_active,
            deactivated_at: row.deactivated_at,
            deactivated_reason: row.deactivated_reason,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ScanAttemptRow {
    id: Uuid,
    delivery_id: String,
    organization_id: Uuid,
    repository_full_name: String,
    source_ref: String,
    head_sha: Option<String>,
    status: String,
    error_message: Option<String>,
    suites_found: i32,
    tests_found: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<ScanAttemptRow> for ScanAttempt {
    type Error = StoreError;

    fn try_from(row: ScanAttemptRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            delivery_id: row.delivery_id,
            organization_id: OrganizationId::from(row.organization_id),
            repository_full_name: row.repository_full_name,
            source_ref: row.source_ref,
            head_sha: row.head_sha,
            status: row.status.parse()?,
            error_message: row.error_message,
            suites_found: row.suites_found,
            tests_found: row.tests_found,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct InstallationRow {
    organization_id: Uuid,
    installation_id: i64,
    account_login: String,
    account_type: String,
    installed_at: DateTime<Utc>,
}

impl From<InstallationRow> for GitHubAppInstallation {
    fn from(row: InstallationRow) -> Self {
        Self {
            organization_id: OrganizationId::from(row.organization_id),
            installation_id: row.installation_id,
            account_login: row.account_login,
            account_type: row.account_type,
            installed_at: row.installed_at,
        }
    }
}

/// SQLx implementation of the reconciliation store
pub struct SqlxReconciliationStore {
    pool: Arc<PgPool>,
}

impl SqlxReconciliationStore {
    /// Create a new SQLx reconciliation store
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IReconciliationStore for SqlxReconciliationStore {
    #[instrument(skip(self, project), fields(name = %project.name, source_ref = %project.source_ref))]
    async fn create_project(&self, project: &NewProject) -> Result<Project, StoreError> {
        project.validate()?;

        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            INSERT INTO projects (id, organization_id, name, repo_url, default_branch, path_scope,
                                  source_ref, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING id, organization_id, name, repo_url, default_branch, path_scope, source_ref,
                      is_active, deactivated_at, deactivated_reason, default_branch_head_sha,
                      default_branch_head_message, default_branch_head_at, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(project.organization_id.as_uuid())
        .bind(&project.name)
        .bind(&project.repo_url)
        .bind(&project.default_branch)
        .bind(Json(&project.path_scope))
        .bind(&project.source_ref)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| {
            if let Some(db_err) = e.as_database_error()
                && db_err.constraint() == Some(PROJECT_UNIQUE_INDEX)
            {
                debug!(name = %project.name, "Project already exists for this ref");
                return StoreError::Conflict {
                    constraint: PROJECT_UNIQUE_INDEX.to_string(),
                    message: "project name already exists in organization for this ref"
                        .to_string(),
                };
            }
            database_error("creating project", e)
        })?;

        Ok(row.into())
    }

    async fn project_name_exists(
        &self,
        organization_id: OrganizationId,
        name: &str,
        source_ref: &str,
    ) -> Result<bool, StoreError> {
        sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM projects
                WHERE organization_id = $1 AND lower(name) = lower($2)
                  AND lower(source_ref) = lower($3)
            )
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(name)
        .bind(source_ref)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| database_error("checking project name", e))
    }

    async fn list_projects(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Vec<Project>, StoreError> {
        let rows = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, organization_id, name, repo_url, default_branch, path_scope, source_ref,
                   is_active, deactivated_at, deactivated_reason, default_branch_head_sha,
                   default_branch_head_message, default_branch_head_at, created_at, updated_at
            FROM projects
            WHERE organization_id = $1
            ORDER BY name ASC, source_ref ASC
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| database_error("listing projects", e))?;

        Ok(rows.into_iter().map(Project::from).collect())
    }

    #[instrument(skip(self))]
    async fn find_default_branch_project(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        path_scope: &[String],
    ) -> Result<Option<Project>, StoreError> {
        let row = sqlx::query_as::<_, ProjectRow>(
            r#"
            SELECT id, organization_id, name, repo_url, default_branch, path_scope, source_ref,
                   is_active, deactivated_at, deactivated_reason, default_branch_head_sha,
                   default_branch_head_message, default_branch_head_at, created_at, updated_at
            FROM projects
            WHERE organization_id = $1 AND lower(repo_url) = lower($2) AND path_scope = $3
              AND source_ref = default_branch AND is_active = true
            LIMIT 1
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(repo_url)
        .bind(Json(path_scope))
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| database_error("finding default branch project", e))?;

        Ok(row.map(Project::from))
    }

    #[instrument(skip(self, head), fields(sha = %head.sha))]
    async fn update_default_branch_head(
        &self,
        organization_id: OrganizationId,
        repo_url: &str,
        default_branch: &str,
        head: &DefaultBranchHead,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE projects
            SET default_branch_head_sha = $4, default_branch_head_message = $5,
                default_branch_head_at = $6, updated_at = NOW()
            WHERE organization_id = $1 AND lower(repo_url) = lower($2)
              AND lower(default_branch) = lower($3)
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(repo_url)
        .bind(default_branch)
        .bind(&head.sha)
        .bind(&head.message)
        .bind(head.at)
        .execute(&*self.pool)
        .await
        .map_err(|e| database_error("updating default branch head", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self, suite), fields(file_path = %suite.file_path, source_ref = %suite.source_ref))]
    async fn upsert_suite(&self, suite: &SuiteUpsert) -> Result<Suite, StoreError> {
        suite.validate()?;

        let row = sqlx::query_as::<_, SuiteRow>(
            r#"
            INSERT INTO suites (id, project_id, name, description, file_path, source_ref,
                                test_count, yaml_payload, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW(), NOW())
            ON CONFLICT (project_id, lower(file_path), lower(source_ref)) DO UPDATE
            SET name = EXCLUDED.name, description = EXCLUDED.description,
                yaml_payload = EXCLUDED.yaml_payload, test_count = EXCLUDED.test_count,
                is_active = true, deactivated_at = NULL, deactivated_reason = NULL,
                updated_at = NOW()
            RETURNING id, project_id, name, description, file_path, source_ref, test_count,
                      yaml_payload, is_active, deactivated_at, deactivated_reason,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(suite.project_id)
        .bind(&suite.name)
        .bind(&suite.description)
        .bind(&suite.file_path)
        .bind(&suite.source_ref)
        .bind(suite.test_count)
        .bind(&suite.yaml_payload)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| database_error("upserting suite", e))?;

        Ok(row.into())
    }

    async fn upsert_test(&self, test: &TestUpsert) -> Result<Test, StoreError> {
        test.validate()?;

        let row = sqlx::query_as::<_, TestRow>(
            r#"
            INSERT INTO tests (id, suite_id, project_id, name, source_ref, step_count,
                               created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW(), NOW())
            ON CONFLICT (suite_id, lower(name), lower(source_ref)) DO UPDATE
            SET step_count = EXCLUDED.step_count, is_active = true, deactivated_at = NULL,
                deactivated_reason = NULL, updated_at = NOW()
            RETURNING id, suite_id, project_id, name, source_ref, step_count, is_active,
                      deactivated_at, deactivated_reason, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(test.suite_id)
        .bind(test.project_id)
        .bind(&test.name)
        .bind(&test.source_ref)
        .bind(test.step_count)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| database_error("upserting test", e))?;

        Ok(row.into())
    }

    #[instrument(skip(self, present_file_paths))]
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

        let prefix = format!("{}/", rocketship_dir.trim_end_matches('/'));
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("beginning transaction", e))?;

        // An empty present list tombstones every suite under the directory
        let suite_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE suites
            SET is_active = false, deactivated_at = NOW(), deactivated_reason = $5,
                updated_at = NOW()
            WHERE project_id = $1
              AND lower(source_ref) = lower($2)
              AND left(lower(file_path), length($3)) = lower($3)
              AND is_active = true
              AND NOT (lower(file_path) = ANY(SELECT lower(p) FROM unnest($4::text[]) AS p))
            RETURNING id
            "#,
        )
        .bind(project_id)
        .bind(source_ref)
        .bind(&prefix)
        .bind(present_file_paths)
        .bind(reason.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| database_error("deactivating missing suites", e))?;

        if !suite_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE tests
                SET is_active = false, deactivated_at = NOW(), deactivated_reason = $3,
                    updated_at = NOW()
                WHERE suite_id = ANY($1) AND lower(source_ref) = lower($2) AND is_active = true
                "#,
            )
            .bind(&suite_ids)
            .bind(source_ref)
            .bind(reason.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("deactivating tests of missing suites", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("committing transaction", e))?;

        Ok(suite_ids.len() as u64)
    }

    #[instrument(skip(self, present_test_names))]
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

        let result = sqlx::query(
            r#"
            UPDATE tests
            SET is_active = false, deactivated_at = NOW(), deactivated_reason = $4,
                updated_at = NOW()
            WHERE suite_id = $1
              AND lower(source_ref) = lower($2)
              AND is_active = true
              AND NOT (lower(name) = ANY(SELECT lower(n) FROM unnest($3::text[]) AS n))
            "#,
        )
        .bind(suite_id)
        .bind(source_ref)
        .bind(present_test_names)
        .bind(reason.as_str())
        .execute(&*self.pool)
        .await
        .map_err(|e| database_error("deactivating missing tests", e))?;

        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn deactivate_suite_by_path(
        &self,
        project_id: Uuid,
        source_ref: &str,
        file_path: &str,
        reason: DeactivationReason,
    ) -> Result<bool, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("beginning transaction", e))?;

        let suite_id = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE suites
            SET is_active = false, deactivated_at = NOW(), deactivated_reason = $4,
                updated_at = NOW()
            WHERE project_id = $1 AND lower(source_ref) = lower($2)
              AND lower(file_path) = lower($3)
            RETURNING id
            "#,
        )
        .bind(project_id)
        .bind(source_ref)
        .bind(file_path)
        .bind(reason.as_str())
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| database_error("deactivating suite by path", e))?;

        let Some(suite_id) = suite_id else {
            debug!("No suite recorded at path for this ref");
            return Ok(false);
        };

        sqlx::query(
            r#"
            UPDATE tests
            SET is_active = false, deactivated_at = NOW(), deactivated_reason = $3,
                updated_at = NOW()
            WHERE suite_id = $1 AND lower(source_ref) = lower($2) AND is_active = true
            "#,
        )
        .bind(suite_id)
        .bind(source_ref)
        .bind(reason.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| database_error("deactivating tests of suite", e))?;

        tx.commit()
            .await
            .map_err(|e| database_error("committing transaction", e))?;

        Ok(true)
    }

    #[instrument(skip(self), fields(repo_url = %scope.repo_url, source_ref = %scope.source_ref))]
    async fn deactivate_projects_for_ref(
        &self,
        scope: &RefScope<'_>,
        reason: DeactivationReason,
    ) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("beginning transaction", e))?;

        let project_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE projects
            SET is_active = false, deactivated_at = NOW(), deactivated_reason = $4,
                updated_at = NOW()
            WHERE organization_id = $1 AND lower(repo_url) = lower($2) AND lower(source_ref) = lower($3)
              AND is_active = true
            RETURNING id
            "#,
        )
        .bind(scope.organization_id.as_uuid())
        .bind(scope.repo_url)
        .bind(scope.source_ref)
        .bind(reason.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| database_error("deactivating projects", e))?;

        if !project_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE suites
                SET is_active = false, deactivated_at = NOW(), deactivated_reason = $2,
                    updated_at = NOW()
                WHERE project_id = ANY($1) AND is_active = true
                "#,
            )
            .bind(&project_ids)
            .bind(reason.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("deactivating suites of projects", e))?;

            sqlx::query(
                r#"
                UPDATE tests
                SET is_active = false, deactivated_at = NOW(), deactivated_reason = $2,
                    updated_at = NOW()
                WHERE project_id = ANY($1) AND is_active = true
                "#,
            )
            .bind(&project_ids)
            .bind(reason.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("deactivating tests of projects", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("committing transaction", e))?;

        Ok(project_ids.len() as u64)
    }

    #[instrument(skip(self), fields(repo_url = %scope.repo_url, source_ref = %scope.source_ref))]
    async fn deactivate_suites_for_ref(
        &self,
        scope: &RefScope<'_>,
        reason: DeactivationReason,
    ) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("beginning transaction", e))?;

        let suite_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE suites s
            SET is_active = false, deactivated_at = NOW(), deactivated_reason = $4,
                updated_at = NOW()
            FROM projects p
            WHERE s.project_id = p.id
              AND p.organization_id = $1
              AND lower(p.repo_url) = lower($2)
              AND lower(s.source_ref) = lower($3)
              AND s.is_active = true
            RETURNING s.id
            "#,
        )
        .bind(scope.organization_id.as_uuid())
        .bind(scope.repo_url)
        .bind(scope.source_ref)
        .bind(reason.as_str())
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| database_error("deactivating suites for ref", e))?;

        if !suite_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE tests
                SET is_active = false, deactivated_at = NOW(), deactivated_reason = $3,
                    updated_at = NOW()
                WHERE suite_id = ANY($1) AND lower(source_ref) = lower($2) AND is_active = true
                "#,
            )
            .bind(&suite_ids)
            .bind(scope.source_ref)
            .bind(reason.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("deactivating tests for ref", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("committing transaction", e))?;

        Ok(suite_ids.len() as u64)
    }

    #[instrument(skip(self), fields(repo_url = %scope.repo_url, source_ref = %scope.source_ref))]
    async fn reactivate_projects_for_ref(&self, scope: &RefScope<'_>) -> Result<u64, StoreError> {
        let reasons = lifecycle_reasons();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("beginning transaction", e))?;

        let project_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE projects
            SET is_active = true, deactivated_at = NULL, deactivated_reason = NULL,
                updated_at = NOW()
            WHERE organization_id = $1 AND lower(repo_url) = lower($2) AND lower(source_ref) = lower($3)
              AND is_active = false AND deactivated_reason = ANY($4)
            RETURNING id
            "#,
        )
        .bind(scope.organization_id.as_uuid())
        .bind(scope.repo_url)
        .bind(scope.source_ref)
        .bind(&reasons)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| database_error("reactivating projects", e))?;

        if !project_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE suites
                SET is_active = true, deactivated_at = NULL, deactivated_reason = NULL,
                    updated_at = NOW()
                WHERE project_id = ANY($1) AND is_active = false
                  AND deactivated_reason = ANY($2)
                "#,
            )
            .bind(&project_ids)
            .bind(&reasons)
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("reactivating suites of projects", e))?;

            sqlx::query(
                r#"
                UPDATE tests
                SET is_active = true, deactivated_at = NULL, deactivated_reason = NULL,
                    updated_at = NOW()
                WHERE project_id = ANY($1) AND is_active = false
                  AND deactivated_reason = ANY($2)
                "#,
            )
            .bind(&project_ids)
            .bind(&reasons)
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("reactivating tests of projects", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("committing transaction", e))?;

        Ok(project_ids.len() as u64)
    }

    #[instrument(skip(self), fields(repo_url = %scope.repo_url, source_ref = %scope.source_ref))]
    async fn reactivate_suites_for_ref(&self, scope: &RefScope<'_>) -> Result<u64, StoreError> {
        let reasons = lifecycle_reasons();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| database_error("beginning transaction", e))?;

        let suite_ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            UPDATE suites s
            SET is_active = true, deactivated_at = NULL, deactivated_reason = NULL,
                updated_at = NOW()
            FROM projects p
            WHERE s.project_id = p.id
              AND p.organization_id = $1
              AND lower(p.repo_url) = lower($2)
              AND lower(s.source_ref) = lower($3)
              AND s.is_active = false
              AND s.deactivated_reason = ANY($4)
            RETURNING s.id
            "#,
        )
        .bind(scope.organization_id.as_uuid())
        .bind(scope.repo_url)
        .bind(scope.source_ref)
        .bind(&reasons)
        .fetch_all(&mut *tx)
        .await
        .map_err(|e| database_error("reactivating suites for ref", e))?;

        if !suite_ids.is_empty() {
            sqlx::query(
                r#"
                UPDATE tests
                SET is_active = true, deactivated_at = NULL, deactivated_reason = NULL,
                    updated_at = NOW()
                WHERE suite_id = ANY($1) AND lower(source_ref) = lower($2)
                  AND is_active = false AND deactivated_reason = ANY($3)
                "#,
            )
            .bind(&suite_ids)
            .bind(scope.source_ref)
            .bind(&reasons)
            .execute(&mut *tx)
            .await
            .map_err(|e| database_error("reactivating tests for ref", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| database_error("committing transaction", e))?;

        Ok(suite_ids.len() as u64)
    }

    async fn insert_scan_attempt(
        &self,
        attempt: &NewScanAttempt,
    ) -> Result<ScanAttempt, StoreError> {
        let row = sqlx::query_as::<_, ScanAttemptRow>(
            r#"
            INSERT INTO scan_attempts (id, delivery_id, organization_id, repository_full_name,
                                       source_ref, head_sha, status, error_message,
                                       suites_found, tests_found, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, NOW())
            RETURNING id, delivery_id, organization_id, repository_full_name, source_ref,
                      head_sha, status, error_message, suites_found, tests_found, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&attempt.delivery_id)
        .bind(attempt.organization_id.as_uuid())
        .bind(&attempt.repository_full_name)
        .bind(&attempt.source_ref)
        .bind(&attempt.head_sha)
        .bind(attempt.status.as_str())
        .bind(&attempt.error_message)
        .bind(attempt.suites_found)
        .bind(attempt.tests_found)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| database_error("inserting scan attempt", e))?;

        row.try_into()
    }

    async fn list_recent_scan_attempts(
        &self,
        organization_id: OrganizationId,
        limit: i64,
    ) -> Result<Vec<ScanAttempt>, StoreError> {
        let rows = sqlx::query_as::<_, ScanAttemptRow>(
            r#"
            SELECT id, delivery_id, organization_id, repository_full_name, source_ref,
                   head_sha, status, error_message, suites_found, tests_found, created_at
            FROM scan_attempts
            WHERE organization_id = $1
            ORDER BY created_at DESC
            LIMIT $2
            "#,
        )
        .bind(organization_id.as_uuid())
        .bind(limit)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| database_error("listing scan attempts", e))?;

        rows.into_iter().map(ScanAttempt::try_from).collect()
    }

    async fn insert_webhook_delivery(
        &self,
        delivery: &WebhookDelivery,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_deliveries (delivery_id, event, repository_full_name, ref, action,
                                            received_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (delivery_id) DO NOTHING
            "#,
        )
        .bind(&delivery.delivery_id)
        .bind(&delivery.event)
        .bind(&delivery.repository_full_name)
        .bind(&delivery.git_ref)
        .bind(&delivery.action)
        .execute(&*self.pool)
        .await
        .map_err(|e| database_error("inserting webhook delivery", e))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_orgs_by_installation(
        &self,
        installation_id: i64,
    ) -> Result<Vec<OrganizationId>, StoreError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT organization_id FROM github_app_installations
            WHERE installation_id = $1
            ORDER BY installed_at ASC
            "#,
        )
        .bind(installation_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| database_error("listing organizations by installation", e))?;

        Ok(ids.into_iter().map(OrganizationId::from).collect())
    }

    async fn upsert_installation(
        &self,
        installation: &GitHubAppInstallation,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO github_app_installations (organization_id, installation_id, account_login,
                                                  account_type, installed_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            ON CONFLICT (organization_id) DO UPDATE
            SET installation_id = EXCLUDED.installation_id,
                account_login = EXCLUDED.account_login,
                account_type = EXCLUDED.account_type,
                updated_at = NOW()
            "#,
        )
        .bind(installation.organization_id.as_uuid())
        .bind(installation.installation_id)
        .bind(&installation.account_login)
        .bind(&installation.account_type)
        .bind(installation.installed_at)
        .execute(&*self.pool)
        .await
        .map_err(|e| database_error("upserting installation", e))?;

        Ok(())
    }

    async fn get_installation(
        &self,
        organization_id: OrganizationId,
    ) -> Result<Option<GitHubAppInstallation>, StoreError> {
        let row = sqlx::query_as::<_, InstallationRow>(
            r#"
            SELECT organization_id, installation_id, account_login, account_type, installed_at
            FROM github_app_installations
            WHERE organization_id = $1
            "#,
        )
        .bind(organization_id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| database_error("fetching installation", e))?;

        Ok(row.map(GitHubAppInstallation::from))
    }
}
