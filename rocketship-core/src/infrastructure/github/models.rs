//! GitHub REST payloads consumed by the content client

use serde::{Deserialize, Serialize};

/// Repository metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub id: i64,
    pub name: String,
    pub full_name: String,
    pub default_branch: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub html_url: Option<String>,
}

/// Result of a recursive tree listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitTree {
    pub sha: String,
    #[serde(default)]
    pub truncated: bool,
    #[serde(rename = "tree", default)]
    pub entries: Vec<TreeEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: TreeEntryKind,
    pub sha: String,
    #[serde(default)]
    pub size: Option<u64>,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == TreeEntryKind::Blob
    }

    pub fn is_tree(&self) -> bool {
        self.kind == TreeEntryKind::Tree
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TreeEntryKind {
    Blob,
    Tree,
    /// Submodule
    Commit,
    #[serde(other)]
    Other,
}

/// A file touched by a pull request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PullRequestFile {
    pub filename: String,
    pub status: FileChangeStatus,
    #[serde(default)]
    pub previous_filename: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeStatus {
    Added,
    Removed,
    Modified,
    Renamed,
    Copied,
    Changed,
    Unchanged,
    #[serde(other)]
    Other,
}

/// Open pull request, addressed by its head branch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "PullRequestWire")]
pub struct PullRequestSummary {
    pub number: i64,
    pub head_ref: String,
    pub head_sha: String,
}

#[derive(Deserialize)]
struct PullRequestWire {
    number: i64,
    head: PullRequestHead,
}

#[derive(Deserialize)]
struct PullRequestHead {
    #[serde(rename = "ref")]
    git_ref: String,
    sha: String,
}

impl From<PullRequestWire> for PullRequestSummary {
    fn from(wire: PullRequestWire) -> Self {
        Self {
            number: wire.number,
            head_ref: wire.head.git_ref,
            head_sha: wire.head.sha,
        }
    }
}

/// Account an installation belongs to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "InstallationWire")]
pub struct InstallationInfo {
    pub id: i64,
    pub account_login: String,
    pub account_type: String,
}

#[derive(Deserialize)]
struct InstallationWire {
    id: i64,
    #[serde(default)]
    account: Option<InstallationAccount>,
}

#[derive(Deserialize)]
struct InstallationAccount {
    #[serde(default)]
    login: String,
    #[serde(rename = "type", default)]
    kind: String,
}

impl From<InstallationWire> for InstallationInfo {
    fn from(wire: InstallationWire) -> Self {
        let (account_login, account_type) = wire
            .account
            .map(|a| (a.login, a.kind))
            .unwrap_or_default();
        Self {
            id: wire.id,
            account_login,
            account_type,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct InstallationRepositoriesPage {
    #[serde(default)]
    pub total_count: usize,
    #[serde(default)]
    pub repositories: Vec<RepositoryInfo>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchResponse {
    pub commit: BranchCommit,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BranchCommit {
    pub sha: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tree_tolerates_unknown_entry_types() {
        let tree: GitTree = serde_json::from_value(json!({
            "sha": "abc",
            "truncated": false,
            "tree": [
                {"path": ".rocketship", "type": "tree", "sha": "1"},
                {"path": ".rocketship/a.yaml", "type": "blob", "sha": "2", "size": 10},
                {"path": "vendor/lib", "type": "commit", "sha": "3"},
                {"path": "weird", "type": "symlink", "sha": "4"}
            ]
        }))
        .unwrap();

        assert_eq!(tree.entries.len(), 4);
        assert!(tree.entries[0].is_tree());
        assert!(tree.entries[1].is_blob());
        assert_eq!(tree.entries[2].kind, TreeEntryKind::Commit);
        assert_eq!(tree.entries[3].kind, TreeEntryKind::Other);
    }

    #[test]
    fn test_pull_request_summary_flattens_head() {
        let pr: PullRequestSummary = serde_json::from_value(json!({
            "number": 7,
            "title": "ignored",
            "head": {"ref": "feature/x", "sha": "deadbeef", "label": "acme:feature/x"}
        }))
        .unwrap();

        assert_eq!(pr.number, 7);
        assert_eq!(pr.head_ref, "feature/x");
        assert_eq!(pr.head_sha, "deadbeef");
    }

    #[test]
    fn test_installation_without_account() {
        let info: InstallationInfo = serde_json::from_value(json!({"id": 42})).unwrap();
        assert_eq!(info.id, 42);
        assert!(info.account_login.is_empty());
    }

    #[test]
    fn test_file_status_other() {
        let file: PullRequestFile = serde_json::from_value(json!({
            "filename": ".rocketship/a.yaml",
            "status": "something-new"
        }))
        .unwrap();
        assert_eq!(file.status, FileChangeStatus::Other);
        assert!(file.previous_filename.is_none());
    }
}
