//! Shared fixtures for rocketship-scanner integration tests

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use rocketship_core::config::ServerConfig;
use rocketship_core::domain::discovery::{
    GitHubAppInstallation, IReconciliationStore, NormalizedRef, OrganizationId, RepositoryName,
};
use rocketship_core::infrastructure::InMemoryReconciliationStore;
use rocketship_core::infrastructure::github::{
    ContentError, FileChangeStatus, GitTree, InstallationInfo, PullRequestFile,
    PullRequestSummary, RepositoryContentClient, RepositoryInfo, TreeEntry, TreeEntryKind,
};
use rocketship_core::infrastructure::parsers::SuiteYamlParser;
use rocketship_scanner::application::{
    BootstrapRepositoryUseCase, GetInstallationStatusUseCase,
    ListInstallationRepositoriesUseCase, ListScanAttemptsUseCase, ProcessWebhookUseCase,
    RegisterInstallationUseCase, Scanner,
};
use rocketship_scanner::domain::ScanInput;
use rocketship_scanner::presentation::{AppState, GitHubAppUseCases};

pub const OWNER: &str = "acme";
pub const REPO: &str = "shop";
pub const DEFAULT_BRANCH: &str = "main";
pub const INSTALLATION_ID: i64 = 4242;
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const INSTALL_URL: &str = "https://github.com/apps/rocketship/installations/new";
pub const MAX_SUITE_BYTES: usize = 64 * 1024;

pub fn repository() -> RepositoryName {
    RepositoryName {
        owner: OWNER.to_string(),
        name: REPO.to_string(),
    }
}

pub fn repo_url() -> String {
    repository().repo_url()
}

pub fn repository_info() -> RepositoryInfo {
    RepositoryInfo {
        id: 1001,
        name: REPO.to_string(),
        full_name: format!("{}/{}", OWNER, REPO),
        default_branch: DEFAULT_BRANCH.to_string(),
        private: true,
        html_url: Some(format!("https://github.com/{}/{}", OWNER, REPO)),
    }
}

/// Suite YAML with one single-step test per name
pub fn suite_yaml(name: &str, tests: &[&str]) -> String {
    let mut yaml = format!("name: {}\nversion: v1.0.0\ntests:\n", name);
    for test in tests {
        yaml.push_str(&format!(
            "  - name: {}\n    steps:\n      - name: call\n        plugin: http\n        config:\n          method: GET\n          url: https://example.com/health\n",
            test
        ));
    }
    yaml
}

pub fn pr_file(filename: &str, status: FileChangeStatus) -> PullRequestFile {
    PullRequestFile {
        filename: filename.to_string(),
        status,
        previous_filename: None,
    }
}

pub fn renamed(from: &str, to: &str) -> PullRequestFile {
    PullRequestFile {
        filename: to.to_string(),
        status: FileChangeStatus::Renamed,
        previous_filename: Some(from.to_string()),
    }
}

#[derive(Default)]
struct ContentState {
    repository: Option<RepositoryInfo>,
    /// git ref (branch or SHA) -> path -> content
    files: HashMap<String, BTreeMap<String, String>>,
    truncated: HashSet<String>,
    failing_trees: HashSet<String>,
    pr_files: HashMap<i64, Vec<PullRequestFile>>,
    open_prs: Vec<PullRequestSummary>,
    branch_heads: HashMap<String, String>,
    installations: HashMap<i64, InstallationInfo>,
    repositories: Vec<RepositoryInfo>,
    fail_repository_listing: bool,
    tree_delay: Option<Duration>,
}

/// In-memory GitHub content keyed by git ref
#[derive(Default)]
pub struct MockContentClient {
    state: Mutex<ContentState>,
}

impl MockContentClient {
    pub fn new() -> Self {
        let client = Self::default();
        {
            let mut state = client.state.try_lock().unwrap();
            state.repository = Some(repository_info());
            state.repositories = vec![repository_info()];
        }
        client
    }

    pub async fn put_file(&self, git_ref: &str, path: &str, content: impl Into<String>) {
        self.state
            .lock()
            .await
            .files
            .entry(git_ref.to_string())
            .or_default()
            .insert(path.to_string(), content.into());
    }

    pub async fn remove_file(&self, git_ref: &str, path: &str) {
        if let Some(files) = self.state.lock().await.files.get_mut(git_ref) {
            files.remove(path);
        }
    }

    pub async fn truncate_tree(&self, git_ref: &str) {
        self.state.lock().await.truncated.insert(git_ref.to_string());
    }

    pub async fn fail_tree(&self, git_ref: &str) {
        self.state
            .lock()
            .await
            .failing_trees
            .insert(git_ref.to_string());
    }

    pub async fn set_pr_files(&self, number: i64, files: Vec<PullRequestFile>) {
        self.state.lock().await.pr_files.insert(number, files);
    }

    pub async fn open_pull_request(&self, number: i64, head_ref: &str, head_sha: &str) {
        self.state.lock().await.open_prs.push(PullRequestSummary {
            number,
            head_ref: head_ref.to_string(),
            head_sha: head_sha.to_string(),
        });
    }

    pub async fn set_branch_head(&self, branch: &str, sha: &str) {
        self.state
            .lock()
            .await
            .branch_heads
            .insert(branch.to_string(), sha.to_string());
    }

    pub async fn add_installation(&self, id: i64, account_login: &str) {
        self.state.lock().await.installations.insert(
            id,
            InstallationInfo {
                id,
                account_login: account_login.to_string(),
                account_type: "Organization".to_string(),
            },
        );
    }

    pub async fn slow_tree(&self, delay: Duration) {
        self.state.lock().await.tree_delay = Some(delay);
    }

    pub async fn fail_repository_listing(&self) {
        self.state.lock().await.fail_repository_listing = true;
    }

    fn tree_for(files: &BTreeMap<String, String>) -> Vec<TreeEntry> {
        let mut dirs = BTreeSet::new();
        for path in files.keys() {
            let mut parent = path.as_str();
            while let Some((prefix, _)) = parent.rsplit_once('/') {
                dirs.insert(prefix.to_string());
                parent = prefix;
            }
        }

        let mut entries: Vec<TreeEntry> = dirs
            .into_iter()
            .map(|path| TreeEntry {
                sha: format!("tree-{}", path),
                path,
                kind: TreeEntryKind::Tree,
                size: None,
            })
            .collect();
        entries.extend(files.iter().map(|(path, content)| TreeEntry {
            path: path.clone(),
            kind: TreeEntryKind::Blob,
            sha: format!("blob-{}", path),
            size: Some(content.len() as u64),
        }));
        entries
    }
}

#[async_trait]
impl RepositoryContentClient for MockContentClient {
    async fn get_repository(
        &self,
        _installation_id: i64,
        repo: &RepositoryName,
    ) -> Result<RepositoryInfo, ContentError> {
        self.state
            .lock()
            .await
            .repository
            .clone()
            .ok_or_else(|| ContentError::NotFound {
                resource: repo.full_name(),
            })
    }

    async fn get_tree(
        &self,
        _installation_id: i64,
        _repo: &RepositoryName,
        git_ref: &str,
    ) -> Result<GitTree, ContentError> {
        let delay = self.state.lock().await.tree_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let state = self.state.lock().await;
        if state.failing_trees.contains(git_ref) {
            return Err(ContentError::Upstream {
                status: 500,
                message: "tree unavailable".to_string(),
            });
        }
        let files = state.files.get(git_ref).ok_or_else(|| ContentError::NotFound {
            resource: format!("tree {}", git_ref),
        })?;
        Ok(GitTree {
            sha: format!("tree-root-{}", git_ref),
            truncated: state.truncated.contains(git_ref),
            entries: Self::tree_for(files),
        })
    }

    async fn get_file_content(
        &self,
        _installation_id: i64,
        _repo: &RepositoryName,
        path: &str,
        git_ref: &str,
    ) -> Result<Vec<u8>, ContentError> {
        self.state
            .lock()
            .await
            .files
            .get(git_ref)
            .and_then(|files| files.get(path))
            .map(|content| content.as_bytes().to_vec())
            .ok_or_else(|| ContentError::NotFound {
                resource: format!("{}@{}", path, git_ref),
            })
    }

    async fn list_pull_request_files(
        &self,
        _installation_id: i64,
        _repo: &RepositoryName,
        number: i64,
    ) -> Result<Vec<PullRequestFile>, ContentError> {
        Ok(self
            .state
            .lock()
            .await
            .pr_files
            .get(&number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_open_pull_requests(
        &self,
        _installation_id: i64,
        _repo: &RepositoryName,
    ) -> Result<Vec<PullRequestSummary>, ContentError> {
        Ok(self.state.lock().await.open_prs.clone())
    }

    async fn get_branch_head_sha(
        &self,
        _installation_id: i64,
        _repo: &RepositoryName,
        branch: &str,
    ) -> Result<String, ContentError> {
        self.state
            .lock()
            .await
            .branch_heads
            .get(branch)
            .cloned()
            .ok_or_else(|| ContentError::NotFound {
                resource: format!("branch {}", branch),
            })
    }

    async fn list_installation_repositories(
        &self,
        _installation_id: i64,
    ) -> Result<Vec<RepositoryInfo>, ContentError> {
        let state = self.state.lock().await;
        if state.fail_repository_listing {
            return Err(ContentError::RateLimited {
                retry_after: Some(60),
                message: "API rate limit exceeded".to_string(),
            });
        }
        Ok(state.repositories.clone())
    }

    async fn get_installation_info(
        &self,
        installation_id: i64,
    ) -> Result<Option<InstallationInfo>, ContentError> {
        Ok(self
            .state
            .lock()
            .await
            .installations
            .get(&installation_id)
            .cloned())
    }
}

/// Store, content mock and scanner wired together
pub struct Harness {
    pub store: Arc<InMemoryReconciliationStore>,
    pub content: Arc<MockContentClient>,
    pub scanner: Arc<Scanner>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryReconciliationStore::new());
        let content = Arc::new(MockContentClient::new());
        let scanner = Arc::new(Scanner::new(
            store.clone(),
            content.clone(),
            SuiteYamlParser::new(MAX_SUITE_BYTES),
        ));
        Self {
            store,
            content,
            scanner,
        }
    }

    pub fn scan_input(&self, organization_id: OrganizationId, branch: &str) -> ScanInput {
        ScanInput {
            organization_id,
            installation_id: INSTALLATION_ID,
            repository: repository(),
            source_ref: NormalizedRef::branch(branch),
            head_sha: None,
            delivery_id: format!("delivery-{}", branch),
        }
    }

    /// Bind the test installation to an organization
    pub async fn install(&self, organization_id: OrganizationId) {
        self.store
            .upsert_installation(&GitHubAppInstallation {
                organization_id,
                installation_id: INSTALLATION_ID,
                account_login: OWNER.to_string(),
                account_type: "Organization".to_string(),
                installed_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    pub fn process_webhook(&self) -> ProcessWebhookUseCase {
        ProcessWebhookUseCase::new(self.store.clone(), Some(self.scanner.clone()))
    }

    pub fn bootstrap(&self) -> BootstrapRepositoryUseCase {
        BootstrapRepositoryUseCase::new(
            self.store.clone(),
            self.content.clone(),
            self.scanner.clone(),
        )
    }

    /// Full application state, optionally without the GitHub App or webhook secret
    pub fn app_state(&self, github_app: bool, webhook_secret: Option<&str>) -> AppState {
        let use_cases = github_app.then(|| GitHubAppUseCases {
            status: Arc::new(GetInstallationStatusUseCase::new(
                self.store.clone(),
                INSTALL_URL.to_string(),
            )),
            register: Arc::new(RegisterInstallationUseCase::new(
                self.store.clone(),
                self.content.clone(),
                INSTALL_URL.to_string(),
            )),
            list_repositories: Arc::new(ListInstallationRepositoriesUseCase::new(
                self.store.clone(),
                self.content.clone(),
            )),
            bootstrap: Arc::new(self.bootstrap()),
        });

        AppState {
            webhook_secret: webhook_secret.map(Arc::from),
            process_webhook: Arc::new(ProcessWebhookUseCase::new(
                self.store.clone(),
                github_app.then(|| self.scanner.clone()),
            )),
            github_app: use_cases,
            list_scan_attempts: Arc::new(ListScanAttemptsUseCase::new(self.store.clone())),
        }
    }
}

pub fn server_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        enable_docs: false,
        request_timeout_seconds: 30,
        scan_timeout_seconds: 120,
        allowed_origins: vec!["*".to_string()],
        shutdown_grace_seconds: 5,
    }
}
