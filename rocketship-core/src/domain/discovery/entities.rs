//! Discovery entities

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::StoreError;
use super::value_objects::{DeactivationReason, OrganizationId, ScanAttemptStatus};

/// A discovered `.rocketship` directory scoped to one organization, repository and source ref
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub organization_id: OrganizationId,
    pub name: String,
    pub repo_url: String,
    pub default_branch: String,
    pub path_scope: Vec<String>,
    pub source_ref: String,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_reason: Option<String>,
    pub default_branch_head: Option<DefaultBranchHead>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Whether this project tracks the repository's default branch
    pub fn is_default_branch_project(&self) -> bool {
        self.source_ref.eq_ignore_ascii_case(&self.default_branch)
    }
}

/// Input for creating a project
#[derive(Debug, Clone, PartialEq)]
pub struct NewProject {
    pub organization_id: OrganizationId,
    pub name: String,
    pub repo_url: String,
    pub default_branch: String,
    pub path_scope: Vec<String>,
    pub source_ref: String,
}

impl NewProject {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.organization_id.as_uuid().is_nil() {
            return Err(StoreError::invalid("organization id required"));
        }
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("project name required"));
        }
        if self.repo_url.trim().is_empty() {
            return Err(StoreError::invalid("repo url required"));
        }
        if self.source_ref.trim().is_empty() {
            return Err(StoreError::invalid("source ref required"));
        }
        Ok(())
    }
}

/// Latest commit seen on the default branch, refreshed on every default-branch push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultBranchHead {
    pub sha: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// One suite YAML file inside a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suite {
    pub id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_path: String,
    pub source_ref: String,
    pub test_count: i32,
    pub yaml_payload: Option<String>,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for upserting a suite, keyed by `(project_id, file_path, source_ref)`
#[derive(Debug, Clone, PartialEq)]
pub struct SuiteUpsert {
    pub project_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub file_path: String,
    pub source_ref: String,
    pub test_count: i32,
    pub yaml_payload: Option<String>,
}

impl SuiteUpsert {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.project_id.is_nil() {
            return Err(StoreError::invalid("project id required"));
        }
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("suite name required"));
        }
        if self.source_ref.trim().is_empty() {
            return Err(StoreError::invalid("source ref required"));
        }
        if self.file_path.trim().is_empty() {
            return Err(StoreError::invalid("file_path required for suite upsert"));
        }
        Ok(())
    }
}

/// One test entry inside a suite
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Test {
    pub id: Uuid,
    pub suite_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub source_ref: String,
    pub step_count: i32,
    pub is_active: bool,
    pub deactivated_at: Option<DateTime<Utc>>,
    pub deactivated_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for upserting a test, keyed by `(suite_id, name, source_ref)`
#[derive(Debug, Clone, PartialEq)]
pub struct TestUpsert {
    pub suite_id: Uuid,
    pub project_id: Uuid,
    pub name: String,
    pub source_ref: String,
    pub step_count: i32,
}

impl TestUpsert {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.suite_id.is_nil() {
            return Err(StoreError::invalid("suite id required"));
        }
        if self.project_id.is_nil() {
            return Err(StoreError::invalid("project id required"));
        }
        if self.name.trim().is_empty() {
            return Err(StoreError::invalid("test name required"));
        }
        if self.source_ref.trim().is_empty() {
            return Err(StoreError::invalid("source ref required"));
        }
        Ok(())
    }
}

/// Append-only audit record of one scan execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanAttempt {
    pub id: Uuid,
    pub delivery_id: String,
    pub organization_id: OrganizationId,
    pub repository_full_name: String,
    pub source_ref: String,
    pub head_sha: Option<String>,
    pub status: ScanAttemptStatus,
    pub error_message: Option<String>,
    pub suites_found: i32,
    pub tests_found: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for recording a scan attempt
#[derive(Debug, Clone, PartialEq)]
pub struct NewScanAttempt {
    pub delivery_id: String,
    pub organization_id: OrganizationId,
    pub repository_full_name: String,
    pub source_ref: String,
    pub head_sha: Option<String>,
    pub status: ScanAttemptStatus,
    pub error_message: Option<String>,
    pub suites_found: i32,
    pub tests_found: i32,
}

/// Append-only audit record of an inbound webhook
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub delivery_id: String,
    pub event: String,
    pub repository_full_name: Option<String>,
    pub git_ref: Option<String>,
    pub action: Option<String>,
}

/// Binding between an organization and a GitHub App installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitHubAppInstallation {
    pub organization_id: OrganizationId,
    pub installation_id: i64,
    pub account_login: String,
    pub account_type: String,
    pub installed_at: DateTime<Utc>,
}

/// Selector for lifecycle operations on every row of one repository and ref
#[derive(Debug, Clone, PartialEq)]
pub struct RefScope<'a> {
    pub organization_id: OrganizationId,
    pub repo_url: &'a str,
    pub source_ref: &'a str,
}

/// Counts reported by pull request lifecycle updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleChange {
    pub projects: u64,
    pub suites: u64,
}

impl LifecycleChange {
    pub fn is_empty(&self) -> bool {
        self.projects == 0 && self.suites == 0
    }
}

/// Reason stored on a tombstoned row, parsed when it is a known value
pub fn parse_reason(reason: Option<&str>) -> Option<DeactivationReason> {
    reason.and_then(|r| r.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn suite_upsert() -> SuiteUpsert {
        SuiteUpsert {
            project_id: Uuid::new_v4(),
            name: "checkout".to_string(),
            description: None,
            file_path: ".rocketship/checkout.yaml".to_string(),
            source_ref: "main".to_string(),
            test_count: 2,
            yaml_payload: None,
        }
    }

    #[test]
    fn test_suite_upsert_requires_file_path_and_ref() {
        assert!(suite_upsert().validate().is_ok());

        let missing_path = SuiteUpsert {
            file_path: "  ".to_string(),
            ..suite_upsert()
        };
        assert!(matches!(
            missing_path.validate(),
            Err(StoreError::InvalidInput { .. })
        ));

        let missing_ref = SuiteUpsert {
            source_ref: String::new(),
            ..suite_upsert()
        };
        assert!(missing_ref.validate().is_err());
    }

    #[test]
    fn test_new_project_requires_org() {
        let project = NewProject {
            organization_id: OrganizationId::new(Uuid::nil()),
            name: "widgets".to_string(),
            repo_url: "https://github.com/acme/widgets".to_string(),
            default_branch: "main".to_string(),
            path_scope: vec![".rocketship/**".to_string()],
            source_ref: "main".to_string(),
        };
        assert!(project.validate().is_err());
    }

    #[test]
    fn test_parse_reason_ignores_unknown_values() {
        assert_eq!(parse_reason(Some("merged")), Some(DeactivationReason::Merged));
        assert_eq!(parse_reason(Some("manual")), None);
        assert_eq!(parse_reason(None), None);
    }
}
