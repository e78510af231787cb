//! GitHub REST client authenticated as an App installation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{ACCEPT, HeaderMap, USER_AGENT as USER_AGENT_HEADER};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};
use url::Url;

use super::credentials::GitHubAppCredentials;
use super::errors::{ContentError, GitHubAppError};
use super::models::{
    BranchResponse, GitTree, InstallationInfo, InstallationRepositoriesPage, PullRequestFile,
    PullRequestSummary, RepositoryInfo,
};
use super::{API_VERSION, RepositoryContentClient, USER_AGENT};
use crate::config::GitHubAppConfig;
use crate::domain::discovery::RepositoryName;

const JSON_ACCEPT: &str = "application/vnd.github+json";
const RAW_ACCEPT: &str = "application/vnd.github.raw+json";
const PER_PAGE: usize = 100;
/// GitHub stops listing pull request files after 3000 entries
const MAX_PAGES: u32 = 30;
const MAX_ERROR_BODY: usize = 512;

/// Content client backed by installation tokens from [`GitHubAppCredentials`]
pub struct GitHubAppClient {
    http: reqwest::Client,
    credentials: Arc<GitHubAppCredentials>,
    api_base: Url,
}

impl GitHubAppClient {
    pub fn from_config(config: &GitHubAppConfig) -> Result<Self, GitHubAppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GitHubAppError::Http {
                message: e.to_string(),
            })?;
        let credentials = Arc::new(GitHubAppCredentials::from_config(config, http.clone())?);
        Self::new(credentials, http, &config.api_base_url)
    }

    pub fn new(
        credentials: Arc<GitHubAppCredentials>,
        http: reqwest::Client,
        api_base_url: &str,
    ) -> Result<Self, GitHubAppError> {
        let api_base = Url::parse(api_base_url).map_err(|e| GitHubAppError::Http {
            message: format!("invalid GitHub API base URL '{}': {}", api_base_url, e),
        })?;
        if api_base.cannot_be_a_base() {
            return Err(GitHubAppError::Http {
                message: format!("GitHub API base URL '{}' cannot be a base", api_base_url),
            });
        }

        Ok(Self {
            http,
            credentials,
            api_base,
        })
    }

    pub fn credentials(&self) -> &Arc<GitHubAppCredentials> {
        &self.credentials
    }

    /// Build an API URL. Segments containing `/` (file paths, branch names) are split so
    /// that each component is percent-encoded on its own.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.api_base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty();
            for segment in segments {
                path.extend(segment.split('/').filter(|s| !s.is_empty()));
            }
        }
        url
    }

    fn repo_endpoint(&self, repo: &RepositoryName, rest: &[&str]) -> Url {
        let mut segments = vec!["repos", repo.owner.as_str(), repo.name.as_str()];
        segments.extend_from_slice(rest);
        self.endpoint(&segments)
    }

    async fn send_as_installation(
        &self,
        installation_id: i64,
        url: Url,
        accept: &str,
    ) -> Result<Response, ContentError> {
        let token = self.credentials.installation_token(installation_id).await?;
        let response = self
            .http
            .get(url.clone())
            .bearer_auth(token)
            .header(ACCEPT, accept)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            // Token revoked or the installation was suspended; force a fresh exchange next time
            self.credentials.invalidate(installation_id).await;
        }

        check_status(response, url.path()).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        installation_id: i64,
        url: Url,
    ) -> Result<T, ContentError> {
        let response = self
            .send_as_installation(installation_id, url, JSON_ACCEPT)
            .await?;
        Ok(response.json::<T>().await?)
    }

    /// Follow `page=` pagination over an endpoint returning a JSON array
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        installation_id: i64,
        base: Url,
        extra_query: &[(&str, &str)],
    ) -> Result<Vec<T>, ContentError> {
        let mut items = Vec::new();
        for page in 1..=MAX_PAGES {
            let mut url = base.clone();
            {
                let mut query = url.query_pairs_mut();
                for (key, value) in extra_query {
                    query.append_pair(key, value);
                }
                query
                    .append_pair("per_page", &PER_PAGE.to_string())
                    .append_pair("page", &page.to_string());
            }

            let batch: Vec<T> = self.get_json(installation_id, url).await?;
            let last = batch.len() < PER_PAGE;
            items.extend(batch);
            if last {
                return Ok(items);
            }
        }

        warn!(
            endpoint = %base.path(),
            pages = MAX_PAGES,
            "Pagination cap reached, results may be incomplete"
        );
        Ok(items)
    }
}

#[async_trait]
impl RepositoryContentClient for GitHubAppClient {
    #[instrument(skip(self), fields(repo = %repo))]
    async fn get_repository(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
    ) -> Result<RepositoryInfo, ContentError> {
        self.get_json(installation_id, self.repo_endpoint(repo, &[]))
            .await
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn get_tree(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        git_ref: &str,
    ) -> Result<GitTree, ContentError> {
        let mut url = self.repo_endpoint(repo, &["git", "trees", git_ref]);
        url.query_pairs_mut().append_pair("recursive", "1");

        let tree: GitTree = self.get_json(installation_id, url).await?;
        debug!(
            entries = tree.entries.len(),
            truncated = tree.truncated,
            "Fetched repository tree"
        );
        Ok(tree)
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn get_file_content(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, ContentError> {
        let mut url = self.repo_endpoint(repo, &["contents", path]);
        url.query_pairs_mut().append_pair("ref", git_ref);

        let response = self
            .send_as_installation(installation_id, url, RAW_ACCEPT)
            .await?;
        Ok(response.bytes().await?.to_vec())
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn list_pull_request_files(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        number: i64,
    ) -> Result<Vec<PullRequestFile>, ContentError> {
        let number = number.to_string();
        let url = self.repo_endpoint(repo, &["pulls", &number, "files"]);
        self.get_paginated(installation_id, url, &[]).await
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn list_open_pull_requests(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
    ) -> Result<Vec<PullRequestSummary>, ContentError> {
        let url = self.repo_endpoint(repo, &["pulls"]);
        self.get_paginated(installation_id, url, &[("state", "open")])
            .await
    }

    #[instrument(skip(self), fields(repo = %repo))]
    async fn get_branch_head_sha(
        &self,
        installation_id: i64,
        repo: &RepositoryName,
        branch: &str,
    ) -> Result<String, ContentError> {
        let url = self.repo_endpoint(repo, &["branches", branch]);
        let branch: BranchResponse = self.get_json(installation_id, url).await?;
        Ok(branch.commit.sha)
    }

    #[instrument(skip(self))]
    async fn list_installation_repositories(
        &self,
        installation_id: i64,
    ) -> Result<Vec<RepositoryInfo>, ContentError> {
        let base = self.endpoint(&["installation", "repositories"]);
        let mut repositories = Vec::new();

        for page in 1..=MAX_PAGES {
            let mut url = base.clone();
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string())
                .append_pair("page", &page.to_string());

            let batch: InstallationRepositoriesPage = self.get_json(installation_id, url).await?;
            let received = batch.repositories.len();
            repositories.extend(batch.repositories);

            if received < PER_PAGE || repositories.len() >= batch.total_count {
                break;
            }
        }

        Ok(repositories)
    }

    #[instrument(skip(self))]
    async fn get_installation_info(
        &self,
        installation_id: i64,
    ) -> Result<Option<InstallationInfo>, ContentError> {
        let assertion = self.credentials.mint_application_assertion()?;
        let id = installation_id.to_string();
        let url = self.endpoint(&["app", "installations", &id]);

        let response = self
            .http
            .get(url.clone())
            .bearer_auth(assertion)
            .header(ACCEPT, JSON_ACCEPT)
            .header(USER_AGENT_HEADER, USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .send()
            .await?;

        match check_status(response, url.path()).await {
            Ok(response) => Ok(Some(response.json().await?)),
            Err(ContentError::NotFound { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Map non-success responses onto [`ContentError`]
async fn check_status(response: Response, resource: &str) -> Result<Response, ContentError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let rate_limit = rate_limit_retry_after(status, response.headers());
    let body = response.text().await.unwrap_or_default();
    let message = truncate(&body, MAX_ERROR_BODY);

    Err(match status {
        StatusCode::NOT_FOUND => ContentError::NotFound {
            resource: resource.to_string(),
        },
        StatusCode::UNAUTHORIZED => ContentError::Unauthorized { message },
        _ => match rate_limit {
            Some(retry_after) => {
                warn!(resource, ?retry_after, "GitHub rate limit hit");
                ContentError::RateLimited {
                    retry_after,
                    message,
                }
            }
            None => ContentError::Upstream {
                status: status.as_u16(),
                message,
            },
        },
    })
}

/// `Some(retry_after)` when a 403/429 carries rate-limit signals
fn rate_limit_retry_after(status: StatusCode, headers: &HeaderMap) -> Option<Option<u64>> {
    if status != StatusCode::FORBIDDEN && status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }

    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let Some(seconds) = header("retry-after").and_then(|v| v.trim().parse::<u64>().ok()) {
        return Some(Some(seconds));
    }

    if header("x-ratelimit-remaining").is_some_and(|v| v.trim() == "0") {
        let reset_in = header("x-ratelimit-reset")
            .and_then(|v| v.trim().parse::<i64>().ok())
            .map(|reset| (reset - Utc::now().timestamp()).max(0) as u64);
        return Some(reset_in);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return Some(None);
    }

    None
}

fn truncate(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_rate_limit_detection() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            rate_limit_retry_after(StatusCode::FORBIDDEN, &headers),
            None,
            "plain 403 is a permission problem"
        );
        assert_eq!(
            rate_limit_retry_after(StatusCode::TOO_MANY_REQUESTS, &headers),
            Some(None)
        );

        headers.insert("retry-after", HeaderValue::from_static("30"));
        assert_eq!(
            rate_limit_retry_after(StatusCode::FORBIDDEN, &headers),
            Some(Some(30))
        );
        assert_eq!(rate_limit_retry_after(StatusCode::BAD_GATEWAY, &headers), None);

        let mut exhausted = HeaderMap::new();
        exhausted.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        assert_eq!(
            rate_limit_retry_after(StatusCode::FORBIDDEN, &exhausted),
            Some(None)
        );
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééé", 3), "é...");
    }
}
