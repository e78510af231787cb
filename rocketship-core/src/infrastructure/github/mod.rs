//! GitHub App integration: credentials, REST client and payload models

pub mod client;
pub mod credentials;
pub mod errors;
pub mod models;

pub use client::GitHubAppClient;
pub use credentials::GitHubAppCredentials;
pub use errors::{ContentError, GitHubAppError};
pub use models::{
    FileChangeStatus, GitTree, InstallationInfo, PullRequestFile, PullRequestSummary,
    RepositoryInfo, TreeEntry, TreeEntryKind,
};

use async_trait::async_trait;

use crate::domain::discovery::RepositoryName;

pub const USER_AGENT: &str = "rocketship-controlplane";
pub const API_VERSION: &str = "2022-11-28";

/// Read access to repository content through an App installation
#[async_trait]
pub trait RepositoryContentClient: Send + Sync {
    async fn get_repository(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
    ) -> Result<RepositoryInfo, ContentError>;

    /// Recursive tree at a branch name or commit SHA
    async fn get_tree(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        git_ref: &str,
    ) -> Result<GitTree, ContentError>;

    /// Raw file bytes. A missing file is [`ContentError::NotFound`].
    async fn get_file_content(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, ContentError>;

    async fn list_pull_request_files(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        number: i64,
    ) -> Result<Vec<PullRequestFile>, ContentError>;

    async fn list_open_pull_requests(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
    ) -> Result<Vec<PullRequestSummary>, ContentError>;

    async fn get_branch_head_sha(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        branch: &str,
    ) -> Result<String, ContentError>;

    /// Repositories the installation was granted
    async fn list_installation_repositories(
        &self,
        installation_id: i64,
    ) -> Result<Vec<RepositoryInfo>, ContentError>;

    /// Installation account, authenticated as the App. Unknown installations yield `None`.
    async fn get_installation_info(
        &self,
        installation_id: i64,
    ) -> Result<Option<InstallationInfo>, ContentError>;
}
