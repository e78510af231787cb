//! Repository scanner
//!
//! Walks `.rocketship` directories of a repository at one ref and reconciles the
//! suites and tests found there with the store. A full scan lists the whole tree
//! and tombstones suites that disappeared; a delta scan only looks at the files a
//! pull request changed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use rocketship_core::domain::discovery::{
    DeactivationReason, IReconciliationStore, NewProject, OrganizationId, Project,
    ROCKETSHIP_DIR, StoreError, SuiteUpsert, TestUpsert, path_scope_for_dir,
};
use rocketship_core::infrastructure::github::{
    FileChangeStatus, GitTree, PullRequestFile, RepositoryContentClient,
};
use rocketship_core::infrastructure::parsers::{SuiteYamlParser, is_suite_file};

use crate::domain::{
    ScanError, ScanInput, ScanKind, ScanOutcome, ScanPhase, ScanProgress, ScanResult,
};

/// A change to apply to one suite file during a delta scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileChange {
    Upsert {
        path: String,
    },
    Deactivate {
        path: String,
        reason: DeactivationReason,
    },
}

/// Actionable pull request changes under one `.rocketship` directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryChanges {
    pub dir: String,
    pub changes: Vec<FileChange>,
}

pub struct Scanner {
    store: Arc<dyn IReconciliationStore>,
    content: Arc<dyn RepositoryContentClient>,
    parser: SuiteYamlParser,
}

impl Scanner {
    pub fn new(
        store: Arc<dyn IReconciliationStore>,
        content: Arc<dyn RepositoryContentClient>,
        parser: SuiteYamlParser,
    ) -> Self {
        Self {
            store,
            content,
            parser,
        }
    }

    /// Run a scan and write its scan attempt. Never fails; the outcome carries any error.
    pub async fn scan_and_record(&self, input: &ScanInput, kind: ScanKind) -> ScanOutcome {
        let outcome = self.scan(input, kind).await;
        self.record_attempt(input, &outcome).await;
        outcome
    }

    #[tracing::instrument(
        skip(self, input),
        fields(
            delivery_id = %input.delivery_id,
            organization_id = %input.organization_id,
            repo = %input.repository,
            source_ref = %input.source_ref,
        )
    )]
    pub async fn scan(&self, input: &ScanInput, kind: ScanKind) -> ScanOutcome {
        let mut progress = ScanProgress::new();
        let mut result = ScanResult::default();

        let run = match kind {
            ScanKind::Full => self.run_full(input, &mut progress, &mut result).await,
            ScanKind::Delta { pr_number } => {
                self.run_delta(input, pr_number, &mut progress, &mut result)
                    .await
            }
        };

        let (phase, failure) = match run {
            Ok(()) if result.has_errors() => (ScanPhase::PartiallyFailed, None),
            Ok(()) => (ScanPhase::Succeeded, None),
            Err(e) => (ScanPhase::Failed, Some(e.to_string())),
        };
        if let Err(e) = progress.advance(phase) {
            warn!(error = %e, "Scan finished from an unexpected phase");
        }

        match &failure {
            Some(error) => warn!(error = %error, from = %progress.phase(), "Scan failed"),
            None => info!(
                phase = %phase,
                suites_found = result.suites_found,
                tests_found = result.tests_found,
                errors = result.errors.len(),
                "Scan finished"
            ),
        }

        ScanOutcome {
            source_ref: input.source_ref.name.clone(),
            phase,
            result,
            failure,
            transitions: progress.transitions().to_vec(),
        }
    }

    /// Persist the outcome as a scan attempt; failures are logged only
    pub async fn record_attempt(&self, input: &ScanInput, outcome: &ScanOutcome) {
        if let Err(e) = self
            .store
            .insert_scan_attempt(&outcome.to_attempt(input))
            .await
        {
            warn!(
                delivery_id = %input.delivery_id,
                repo = %input.repository,
                source_ref = %input.source_ref,
                error = %e,
                "Failed to record scan attempt"
            );
        }
    }

    async fn run_full(
        &self,
        input: &ScanInput,
        progress: &mut ScanProgress,
        result: &mut ScanResult,
    ) -> Result<(), ScanError> {
        progress.advance(ScanPhase::Fetching)?;
        let repo_info = self
            .content
            .get_repository(input.installation_id, &input.repository)
            .await?;
        let tree = self
            .content
            .get_tree(input.installation_id, &input.repository, input.fetch_ref())
            .await?;
        if tree.truncated {
            warn!(
                entries = tree.entries.len(),
                "Repository tree truncated, missing suites will not be tombstoned"
            );
            result.truncated = true;
            result.record_error("tree truncated");
        }

        progress.advance(ScanPhase::Parsing)?;
        let dirs = discover_rocketship_dirs(&tree);
        debug!(directories = dirs.len(), "Discovered .rocketship directories");

        let mut scanned = Vec::with_capacity(dirs.len());
        for dir in dirs {
            let project = match self
                .upsert_project(input, &repo_info.default_branch, &dir)
                .await
            {
                Ok(project) => project,
                Err(e) => {
                    result.record_error(format!(
                        "failed to upsert project for dir {}: {}",
                        dir, e
                    ));
                    continue;
                }
            };

            let files = suite_files_in_dir(&tree, &dir);
            for path in &files {
                if let Err(e) = self.process_suite_file(input, &project, path, result).await {
                    result.record_error(format!("failed to process suite file {}: {}", path, e));
                }
            }
            scanned.push((project, dir, files));
        }

        progress.advance(ScanPhase::Reconciling)?;
        if result.truncated {
            return Ok(());
        }
        for (project, dir, files) in scanned {
            match self
                .store
                .deactivate_suites_missing_from_directory(
                    project.id,
                    &input.source_ref.name,
                    &dir,
                    &files,
                    DeactivationReason::MissingFromScan,
                )
                .await
            {
                Ok(0) => {}
                Ok(count) => info!(dir = %dir, count, "Deactivated suites missing from scan"),
                Err(e) => result.record_error(format!(
                    "failed to reconcile suites in dir {}: {}",
                    dir, e
                )),
            }
        }
        Ok(())
    }

    async fn run_delta(
        &self,
        input: &ScanInput,
        pr_number: i64,
        progress: &mut ScanProgress,
        result: &mut ScanResult,
    ) -> Result<(), ScanError> {
        progress.advance(ScanPhase::Fetching)?;
        let repo_info = self
            .content
            .get_repository(input.installation_id, &input.repository)
            .await?;
        let files = self
            .content
            .list_pull_request_files(input.installation_id, &input.repository, pr_number)
            .await?;

        progress.advance(ScanPhase::Parsing)?;
        let groups = group_changes(&files);
        debug!(
            pr_number,
            files = files.len(),
            directories = groups.len(),
            "Grouped pull request changes"
        );

        for group in groups {
            let project = match self
                .resolve_delta_project(input, &repo_info.default_branch, &group.dir)
                .await
            {
                Ok(project) => project,
                Err(e) => {
                    result.record_error(format!(
                        "failed to upsert project for dir {}: {}",
                        group.dir, e
                    ));
                    continue;
                }
            };

            for change in &group.changes {
                match change {
                    FileChange::Deactivate { path, reason } => {
                        match self
                            .store
                            .deactivate_suite_by_path(
                                project.id,
                                &input.source_ref.name,
                                path,
                                *reason,
                            )
                            .await
                        {
                            Ok(found) => debug!(path = %path, reason = %reason, found, "Deactivated suite"),
                            Err(e) => result.record_error(format!(
                                "failed to deactivate suite file {}: {}",
                                path, e
                            )),
                        }
                    }
                    FileChange::Upsert { path } => {
                        if let Err(e) =
                            self.process_suite_file(input, &project, path, result).await
                        {
                            result.record_error(format!(
                                "failed to process suite file {}: {}",
                                path, e
                            ));
                        }
                    }
                }
            }
        }

        progress.advance(ScanPhase::Reconciling)?;
        Ok(())
    }

    /// Prefer the active default-branch project for the same directory, so pull request
    /// suites land next to the ones already tracked
    async fn resolve_delta_project(
        &self,
        input: &ScanInput,
        default_branch: &str,
        dir: &str,
    ) -> Result<Project, StoreError> {
        let scope = path_scope_for_dir(dir);
        if let Some(project) = self
            .store
            .find_default_branch_project(input.organization_id, &input.repo_url(), &scope)
            .await?
        {
            debug!(dir = %dir, project_id = %project.id, "Reusing default branch project");
            return Ok(project);
        }
        self.upsert_project(input, default_branch, dir).await
    }

    async fn upsert_project(
        &self,
        input: &ScanInput,
        default_branch: &str,
        dir: &str,
    ) -> Result<Project, StoreError> {
        let name = project_name(&input.repository.name, dir);
        let source_ref = &input.source_ref.name;

        if let Some(existing) = self
            .find_project(input.organization_id, &name, source_ref)
            .await?
        {
            return Ok(existing);
        }

        let new_project = NewProject {
            organization_id: input.organization_id,
            name: name.clone(),
            repo_url: input.repo_url(),
            default_branch: default_branch.to_string(),
            path_scope: path_scope_for_dir(dir),
            source_ref: source_ref.clone(),
        };

        match self.store.create_project(&new_project).await {
            Ok(project) => {
                info!(project_id = %project.id, name = %project.name, "Created project");
                Ok(project)
            }
            Err(e) if e.is_conflict() => {
                debug!(name = %name, "Lost project creation race, loading winner");
                self.find_project(input.organization_id, &name, source_ref)
                    .await?
                    .ok_or(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn find_project(
        &self,
        organization_id: OrganizationId,
        name: &str,
        source_ref: &str,
    ) -> Result<Option<Project>, StoreError> {
        if !self
            .store
            .project_name_exists(organization_id, name, source_ref)
            .await?
        {
            return Ok(None);
        }
        Ok(self
            .store
            .list_projects(organization_id)
            .await?
            .into_iter()
            .find(|p| {
                p.name.eq_ignore_ascii_case(name) && p.source_ref.eq_ignore_ascii_case(source_ref)
            }))
    }

    async fn process_suite_file(
        &self,
        input: &ScanInput,
        project: &Project,
        path: &str,
        result: &mut ScanResult,
    ) -> Result<(), ScanError> {
        let content = self
            .content
            .get_file_content(
                input.installation_id,
                &input.repository,
                path,
                input.fetch_ref(),
            )
            .await?;
        let suite = self.parser.parse(&content)?;
        let source_ref = &input.source_ref.name;

        let stored = self
            .store
            .upsert_suite(&SuiteUpsert {
                project_id: project.id,
                name: suite.name.clone(),
                description: suite.description(),
                file_path: path.to_string(),
                source_ref: source_ref.clone(),
                test_count: count(suite.tests.len()),
                yaml_payload: String::from_utf8(content).ok(),
            })
            .await?;
        result.suites_found += 1;

        for test in &suite.tests {
            let upsert = TestUpsert {
                suite_id: stored.id,
                project_id: project.id,
                name: test.name.clone(),
                source_ref: source_ref.clone(),
                step_count: count(test.steps.len()),
            };
            match self.store.upsert_test(&upsert).await {
                Ok(_) => result.tests_found += 1,
                Err(e) => result.record_error(format!(
                    "failed to upsert test {} in {}: {}",
                    test.name, path, e
                )),
            }
        }

        let removed = self
            .store
            .deactivate_tests_missing_from_suite(
                stored.id,
                source_ref,
                &suite.test_names(),
                DeactivationReason::MissingFromSuiteYaml,
            )
            .await?;
        if removed > 0 {
            debug!(path = %path, removed, "Deactivated tests missing from suite");
        }
        Ok(())
    }
}

fn count(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}

fn is_rocketship_dir(path: &str) -> bool {
    path == ROCKETSHIP_DIR
        || path
            .strip_suffix(ROCKETSHIP_DIR)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

fn push_unique(dirs: &mut Vec<String>, dir: &str) {
    if !dirs.iter().any(|d| d == dir) {
        dirs.push(dir.to_string());
    }
}

/// `.rocketship` directories in the tree, in first-seen order
pub fn discover_rocketship_dirs(tree: &GitTree) -> Vec<String> {
    let mut dirs = Vec::new();
    for entry in &tree.entries {
        if entry.is_tree() && is_rocketship_dir(&entry.path) {
            push_unique(&mut dirs, &entry.path);
        } else if entry.is_blob()
            && let Some((parent, _)) = entry.path.rsplit_once('/')
            && is_rocketship_dir(parent)
        {
            push_unique(&mut dirs, parent);
        }
    }
    dirs
}

/// Suite files (`.yaml` / `.yml` blobs) directly under `dir`
pub fn suite_files_in_dir(tree: &GitTree, dir: &str) -> Vec<String> {
    tree.entries
        .iter()
        .filter(|entry| entry.is_blob())
        .filter(|entry| is_directly_under(&entry.path, dir) && is_suite_file(&entry.path))
        .map(|entry| entry.path.clone())
        .collect()
}

pub fn is_directly_under(path: &str, dir: &str) -> bool {
    path.strip_prefix(dir)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|name| !name.is_empty() && !name.contains('/'))
}

/// `.rocketship` directory a path belongs to: the prefix up to and including the
/// first `.rocketship` segment
pub fn rocketship_dir_of(path: &str) -> Option<String> {
    if path
        .strip_prefix(ROCKETSHIP_DIR)
        .is_some_and(|rest| rest.starts_with('/'))
    {
        return Some(ROCKETSHIP_DIR.to_string());
    }
    let marker = format!("/{}/", ROCKETSHIP_DIR);
    path.find(&marker)
        .map(|idx| path[..idx + marker.len() - 1].to_string())
}

/// Project name for a directory: the repository name at the root, otherwise the repository
/// name followed by the parent path with slashes turned into dashes
pub fn project_name(repo_name: &str, dir: &str) -> String {
    match dir
        .strip_suffix(ROCKETSHIP_DIR)
        .and_then(|prefix| prefix.strip_suffix('/'))
    {
        Some(parent) if !parent.is_empty() => format!("{}-{}", repo_name, parent.replace('/', "-")),
        _ => repo_name.to_string(),
    }
}

fn suite_in_rocketship_dir(path: &str) -> Option<String> {
    let dir = rocketship_dir_of(path)?;
    (is_directly_under(path, &dir) && is_suite_file(path)).then_some(dir)
}

fn add_change(groups: &mut Vec<DirectoryChanges>, dir: String, change: FileChange) {
    match groups.iter_mut().find(|group| group.dir == dir) {
        Some(group) => group.changes.push(change),
        None => groups.push(DirectoryChanges {
            dir,
            changes: vec![change],
        }),
    }
}

/// Group suite file changes of a pull request by `.rocketship` directory, keeping the
/// order in which directories first appear. Non-suite files are dropped.
pub fn group_changes(files: &[PullRequestFile]) -> Vec<DirectoryChanges> {
    let mut groups = Vec::new();

    for file in files {
        match file.status {
            FileChangeStatus::Removed => {
                if let Some(dir) = suite_in_rocketship_dir(&file.filename) {
                    add_change(
                        &mut groups,
                        dir,
                        FileChange::Deactivate {
                            path: file.filename.clone(),
                            reason: DeactivationReason::RemovedInPr,
                        },
                    );
                }
            }
            FileChangeStatus::Renamed => {
                if let Some(previous) = file.previous_filename.as_deref()
                    && let Some(dir) = suite_in_rocketship_dir(previous)
                {
                    add_change(
                        &mut groups,
                        dir,
                        FileChange::Deactivate {
                            path: previous.to_string(),
                            reason: DeactivationReason::RenamedInPr,
                        },
                    );
                }
                if let Some(dir) = suite_in_rocketship_dir(&file.filename) {
                    add_change(
                        &mut groups,
                        dir,
                        FileChange::Upsert {
                            path: file.filename.clone(),
                        },
                    );
                }
            }
            _ => {
                if let Some(dir) = suite_in_rocketship_dir(&file.filename) {
                    add_change(
                        &mut groups,
                        dir,
                        FileChange::Upsert {
                            path: file.filename.clone(),
                        },
                    );
                }
            }
        }
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use rocketship_core::infrastructure::github::{TreeEntry, TreeEntryKind};
    use rstest::rstest;

    fn entry(path: &str, kind: TreeEntryKind) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            kind,
            sha: "0".repeat(40),
            size: None,
        }
    }

    fn tree(entries: Vec<TreeEntry>) -> GitTree {
        GitTree {
            sha: "root".to_string(),
            truncated: false,
            entries,
        }
    }

    fn pr_file(filename: &str, status: FileChangeStatus, previous: Option<&str>) -> PullRequestFile {
        PullRequestFile {
            filename: filename.to_string(),
            status,
            previous_filename: previous.map(str::to_string),
        }
    }

    #[test]
    fn test_discovers_directories_from_trees_and_blob_parents() {
        let tree = tree(vec![
            entry(".rocketship", TreeEntryKind::Tree),
            entry(".rocketship/smoke.yaml", TreeEntryKind::Blob),
            entry("services/api/.rocketship/checkout.yml", TreeEntryKind::Blob),
            entry("services/api/.rocketship", TreeEntryKind::Tree),
            entry("docs/not.rocketship", TreeEntryKind::Tree),
            entry("apps/web/.rocketship/nested/deep.yaml", TreeEntryKind::Blob),
        ]);

        assert_eq!(
            discover_rocketship_dirs(&tree),
            vec![".rocketship", "services/api/.rocketship"]
        );
    }

    #[test]
    fn test_suite_files_are_direct_yaml_children_only() {
        let tree = tree(vec![
            entry(".rocketship", TreeEntryKind::Tree),
            entry(".rocketship/a.yaml", TreeEntryKind::Blob),
            entry(".rocketship/b.yml", TreeEntryKind::Blob),
            entry(".rocketship/README.md", TreeEntryKind::Blob),
            entry(".rocketship/nested/c.yaml", TreeEntryKind::Blob),
            entry(".rocketship/d.yaml", TreeEntryKind::Tree),
        ]);

        assert_eq!(
            suite_files_in_dir(&tree, ".rocketship"),
            vec![".rocketship/a.yaml", ".rocketship/b.yml"]
        );
    }

    #[rstest]
    #[case(".rocketship", "widgets")]
    #[case("api/.rocketship", "widgets-api")]
    #[case("services/payments/.rocketship", "widgets-services-payments")]
    fn test_project_name(#[case] dir: &str, #[case] expected: &str) {
        assert_eq!(project_name("widgets", dir), expected);
    }

    #[rstest]
    #[case(".rocketship/a.yaml", Some(".rocketship"))]
    #[case("svc/.rocketship/a.yaml", Some("svc/.rocketship"))]
    #[case("svc/.rocketship/nested/a.yaml", Some("svc/.rocketship"))]
    #[case("svc/.rocketshipx/a.yaml", None)]
    #[case("svc/rocketship/a.yaml", None)]
    #[case(".rocketship", None)]
    fn test_rocketship_dir_of(#[case] path: &str, #[case] expected: Option<&str>) {
        assert_eq!(rocketship_dir_of(path).as_deref(), expected);
    }

    #[test]
    fn test_group_changes_handles_removals_and_renames() {
        let files = vec![
            pr_file("api/.rocketship/new.yaml", FileChangeStatus::Added, None),
            pr_file("src/main.rs", FileChangeStatus::Modified, None),
            pr_file(".rocketship/gone.yaml", FileChangeStatus::Removed, None),
            pr_file(
                "api/.rocketship/renamed.yaml",
                FileChangeStatus::Renamed,
                Some(".rocketship/original.yaml"),
            ),
            pr_file("api/.rocketship/notes.md", FileChangeStatus::Modified, None),
            pr_file("api/.rocketship/sub/x.yaml", FileChangeStatus::Added, None),
        ];

        let groups = group_changes(&files);
        assert_eq!(
            groups,
            vec![
                DirectoryChanges {
                    dir: "api/.rocketship".to_string(),
                    changes: vec![
                        FileChange::Upsert {
                            path: "api/.rocketship/new.yaml".to_string()
                        },
                        FileChange::Upsert {
                            path: "api/.rocketship/renamed.yaml".to_string()
                        },
                    ],
                },
                DirectoryChanges {
                    dir: ".rocketship".to_string(),
                    changes: vec![
                        FileChange::Deactivate {
                            path: ".rocketship/gone.yaml".to_string(),
                            reason: DeactivationReason::RemovedInPr,
                        },
                        FileChange::Deactivate {
                            path: ".rocketship/original.yaml".to_string(),
                            reason: DeactivationReason::RenamedInPr,
                        },
                    ],
                },
            ]
        );
    }

    #[test]
    fn test_pull_request_without_suite_changes_has_no_groups() {
        let files = vec![
            pr_file("README.md", FileChangeStatus::Modified, None),
            pr_file(".rocketship/env.json", FileChangeStatus::Added, None),
        ];
        assert!(group_changes(&files).is_empty());
    }
}
