//! Discovery value objects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::errors::StoreError;

/// Name of the directory that holds suite definitions.
pub const ROCKETSHIP_DIR: &str = ".rocketship";

/// Organization ID value object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub Uuid);

impl OrganizationId {
    pub fn new(id: Uuid) -> Self {
        Self(id)
    }

    /// Generate a new random OrganizationId
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }

    /// First eight characters of the hyphenated form, used in synthetic delivery ids
    pub fn short(&self) -> String {
        self.0.to_string().chars().take(8).collect()
    }
}

impl From<Uuid> for OrganizationId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a normalized source ref
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Branch,
    PullRequest,
    Sha,
    Unknown,
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branch => write!(f, "branch"),
            Self::PullRequest => write!(f, "pull_request"),
            Self::Sha => write!(f, "sha"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A git reference normalized once at the edge and threaded through the scan pipeline.
///
/// `name` is the value stored as `source_ref` on projects, suites and tests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedRef {
    pub name: String,
    pub kind: RefKind,
    pub raw: String,
}

impl NormalizedRef {
    /// Normalize a raw ref as delivered by GitHub.
    ///
    /// ```text
    /// refs/heads/main          -> main     (Branch)
    /// refs/pull/42/head|merge  -> pr/42    (PullRequest)
    /// refs/tags/v1.0.0         -> v1.0.0   (Unknown)
    /// <40 hex chars>           -> <lower>  (Sha)
    /// anything else            -> trimmed  (Unknown)
    /// ```
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();

        if let Some(branch) = trimmed.strip_prefix("refs/heads/") {
            return Self {
                name: branch.to_string(),
                kind: RefKind::Branch,
                raw: trimmed.to_string(),
            };
        }

        if let Some(rest) = trimmed.strip_prefix("refs/pull/") {
            let mut parts = rest.splitn(2, '/');
            if let (Some(number), Some(suffix)) = (parts.next(), parts.next())
                && !number.is_empty()
                && number.chars().all(|c| c.is_ascii_digit())
                && (suffix == "head" || suffix == "merge")
            {
                return Self {
                    name: format!("pr/{}", number),
                    kind: RefKind::PullRequest,
                    raw: trimmed.to_string(),
                };
            }
        }

        if let Some(tag) = trimmed.strip_prefix("refs/tags/") {
            return Self {
                name: tag.to_string(),
                kind: RefKind::Unknown,
                raw: trimmed.to_string(),
            };
        }

        if is_commit_sha(trimmed) {
            return Self {
                name: trimmed.to_ascii_lowercase(),
                kind: RefKind::Sha,
                raw: trimmed.to_string(),
            };
        }

        Self {
            name: trimmed.to_string(),
            kind: RefKind::Unknown,
            raw: trimmed.to_string(),
        }
    }

    /// Ref for a branch given by name (no `refs/heads/` prefix).
    pub fn branch(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            raw: format!("refs/heads/{}", name),
            name,
            kind: RefKind::Branch,
        }
    }

    pub fn is_branch(&self) -> bool {
        self.kind == RefKind::Branch
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for NormalizedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Whether `value` looks like a full 40-character hex commit SHA.
pub fn is_commit_sha(value: &str) -> bool {
    value.len() == 40 && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// `owner/repo` pair as used by the GitHub API
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepositoryName {
    pub owner: String,
    pub name: String,
}

impl RepositoryName {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// Canonical repository URL stored on projects.
    pub fn repo_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepositoryName {
    type Err = StoreError;

    fn from_str(full_name: &str) -> Result<Self, Self::Err> {
        let mut parts = full_name.trim().splitn(2, '/');
        match (parts.next(), parts.next()) {
            (Some(owner), Some(name))
                if !owner.is_empty() && !name.is_empty() && !name.contains('/') =>
            {
                Ok(Self {
                    owner: owner.to_string(),
                    name: name.to_string(),
                })
            }
            _ => Err(StoreError::InvalidInput {
                message: format!(
                    "invalid repository name '{}', expected owner/repo",
                    full_name
                ),
            }),
        }
    }
}

impl fmt::Display for RepositoryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Glob scope of a project rooted at a `.rocketship` directory.
pub fn path_scope_for_dir(rocketship_dir: &str) -> Vec<String> {
    vec![format!("{}/**", rocketship_dir)]
}

/// Why a project, suite or test row was tombstoned
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    /// Test no longer declared in its suite file
    MissingFromSuiteYaml,
    /// Suite file no longer present in its directory during a full scan
    MissingFromScan,
    /// Suite file deleted in a pull request
    RemovedInPr,
    /// Suite file renamed in a pull request (old path)
    RenamedInPr,
    /// Pull request closed without merging
    Closed,
    /// Pull request merged
    Merged,
}

impl DeactivationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingFromSuiteYaml => "missing_from_suite_yaml",
            Self::MissingFromScan => "missing_from_scan",
            Self::RemovedInPr => "removed_in_pr",
            Self::RenamedInPr => "renamed_in_pr",
            Self::Closed => "closed",
            Self::Merged => "merged",
        }
    }

    /// Reasons written by pull request lifecycle transitions; only these are undone on reopen.
    pub fn lifecycle_reasons() -> [DeactivationReason; 2] {
        [Self::Closed, Self::Merged]
    }

    pub fn is_lifecycle(&self) -> bool {
        matches!(self, Self::Closed | Self::Merged)
    }
}

impl fmt::Display for DeactivationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeactivationReason {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_from_suite_yaml" => Ok(Self::MissingFromSuiteYaml),
            "missing_from_scan" => Ok(Self::MissingFromScan),
            "removed_in_pr" => Ok(Self::RemovedInPr),
            "renamed_in_pr" => Ok(Self::RenamedInPr),
            "closed" => Ok(Self::Closed),
            "merged" => Ok(Self::Merged),
            other => Err(StoreError::InvalidInput {
                message: format!("unknown deactivation reason '{}'", other),
            }),
        }
    }
}

/// Outcome recorded on a scan attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanAttemptStatus {
    Success,
    Error,
    Skipped,
}

impl ScanAttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::Skipped => "skipped",
        }
    }
}

impl fmt::Display for ScanAttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScanAttemptStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "error" => Ok(Self::Error),
            "skipped" => Ok(Self::Skipped),
            other => Err(StoreError::InvalidInput {
                message: format!("unknown scan attempt status '{}'", other),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("refs/heads/main", "main", RefKind::Branch)]
    #[case("refs/heads/feature/login", "feature/login", RefKind::Branch)]
    #[case("refs/pull/42/head", "pr/42", RefKind::PullRequest)]
    #[case("refs/pull/7/merge", "pr/7", RefKind::PullRequest)]
    #[case("refs/pull/abc/head", "refs/pull/abc/head", RefKind::Unknown)]
    #[case("refs/tags/v1.2.0", "v1.2.0", RefKind::Unknown)]
    #[case(
        "ABCDEF0123456789ABCDEF0123456789ABCDEF01",
        "abcdef0123456789abcdef0123456789abcdef01",
        RefKind::Sha
    )]
    #[case("  develop  ", "develop", RefKind::Unknown)]
    #[case("", "", RefKind::Unknown)]
    fn test_normalize_ref(#[case] raw: &str, #[case] name: &str, #[case] kind: RefKind) {
        let normalized = NormalizedRef::normalize(raw);
        assert_eq!(normalized.name, name);
        assert_eq!(normalized.kind, kind);
    }

    #[test]
    fn test_branch_ref_keeps_raw_form() {
        let r = NormalizedRef::branch("feature/x");
        assert_eq!(r.name, "feature/x");
        assert_eq!(r.raw, "refs/heads/feature/x");
        assert!(r.is_branch());
    }

    #[test]
    fn test_repository_name_parsing() {
        let repo: RepositoryName = "acme/widgets".parse().unwrap();
        assert_eq!(repo.owner, "acme");
        assert_eq!(repo.name, "widgets");
        assert_eq!(repo.repo_url(), "https://github.com/acme/widgets");

        assert!("acme".parse::<RepositoryName>().is_err());
        assert!("/widgets".parse::<RepositoryName>().is_err());
        assert!("acme/".parse::<RepositoryName>().is_err());
        assert!("acme/widgets/extra".parse::<RepositoryName>().is_err());
    }

    #[test]
    fn test_lifecycle_reasons() {
        assert!(DeactivationReason::lifecycle_reasons()
            .iter()
            .all(DeactivationReason::is_lifecycle));
        assert!(DeactivationReason::Merged.is_lifecycle());
        assert!("tombstoned".parse::<DeactivationReason>().is_err());
        assert!(!DeactivationReason::RemovedInPr.is_lifecycle());
    }

    #[test]
    fn test_path_scope() {
        assert_eq!(
            path_scope_for_dir("api/.rocketship"),
            vec!["api/.rocketship/**".to_string()]
        );
    }

    #[test]
    fn test_org_short_id() {
        let org = OrganizationId::new(
            Uuid::parse_str("1b4e28ba-2fa1-11d2-883f-0016d3cca427").unwrap(),
        );
        assert_eq!(org.short(), "1b4e28ba");
    }
}
