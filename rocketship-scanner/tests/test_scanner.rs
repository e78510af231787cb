//! Full scan behaviour against the in-memory store

mod common;

use common::*;
use rocketship_core::domain::discovery::{OrganizationId, Project, ScanAttemptStatus, Test};
use rocketship_scanner::domain::{ScanKind, ScanPhase};

const CHECKOUT: &str = ".rocketship/checkout.yaml";
const API_SMOKE: &str = "services/api/.rocketship/smoke.yml";

async fn seed_default_branch(harness: &Harness) {
    harness
        .content
        .put_file(
            DEFAULT_BRANCH,
            CHECKOUT,
            suite_yaml("Checkout", &["add item", "pay"]),
        )
        .await;
    harness
        .content
        .put_file(DEFAULT_BRANCH, API_SMOKE, suite_yaml("API smoke", &["ping"]))
        .await;
    harness
        .content
        .put_file(DEFAULT_BRANCH, "README.md", "# shop")
        .await;
    harness
        .content
        .put_file(DEFAULT_BRANCH, ".rocketship/fixtures/data.yaml", "ignored: true")
        .await;
}

#[tokio::test]
async fn test_full_scan_discovers_every_rocketship_directory() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;

    let input = harness.scan_input(org, DEFAULT_BRANCH);
    let outcome = harness.scanner.scan_and_record(&input, ScanKind::Full).await;

    assert_eq!(outcome.phase, ScanPhase::Succeeded);
    assert_eq!(outcome.result.suites_found, 2);
    assert_eq!(outcome.result.tests_found, 3);
    assert!(outcome.failure.is_none());

    let mut projects = harness.store.projects().await;
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    assert_eq!(projects.len(), 2);
    assert_eq!(projects[0].name, "shop");
    assert_eq!(projects[0].path_scope, vec![".rocketship/**".to_string()]);
    assert_eq!(projects[1].name, "shop-services-api");
    assert_eq!(
        projects[1].path_scope,
        vec!["services/api/.rocketship/**".to_string()]
    );
    for project in &projects {
        assert_eq!(project.repo_url, repo_url());
        assert_eq!(project.source_ref, DEFAULT_BRANCH);
        assert_eq!(project.default_branch, DEFAULT_BRANCH);
        assert!(project.is_active);
    }

    let attempts = harness.store.scan_attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, ScanAttemptStatus::Success);
    assert_eq!(attempts[0].suites_found, 2);
    assert_eq!(attempts[0].tests_found, 3);
    assert_eq!(attempts[0].repository_full_name, "acme/shop");
    assert!(attempts[0].error_message.is_none());
}

fn project_ids(projects: &[Project]) -> Vec<uuid::Uuid> {
    let mut ids: Vec<_> = projects.iter().map(|p| p.id).collect();
    ids.sort();
    ids
}

#[tokio::test]
async fn test_full_scan_is_idempotent() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;
    let input = harness.scan_input(org, DEFAULT_BRANCH);

    harness.scanner.scan(&input, ScanKind::Full).await;
    let projects = harness.store.projects().await;
    let suites = harness.store.suites().await;
    let tests = harness.store.tests().await;

    let second = harness.scanner.scan(&input, ScanKind::Full).await;
    assert_eq!(second.phase, ScanPhase::Succeeded);
    assert_eq!(second.result.suites_found, 2);

    assert_eq!(
        project_ids(&harness.store.projects().await),
        project_ids(&projects)
    );
    assert_eq!(harness.store.suites().await.len(), suites.len());
    assert_eq!(harness.store.tests().await.len(), tests.len());
    assert!(harness.store.suites().await.iter().all(|s| s.is_active));
}

#[tokio::test]
async fn test_suite_records_parsed_metadata() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;

    harness
        .scanner
        .scan(&harness.scan_input(org, DEFAULT_BRANCH), ScanKind::Full)
        .await;

    let suites = harness.store.suites().await;
    let checkout = suites.iter().find(|s| s.file_path == CHECKOUT).unwrap();
    assert_eq!(checkout.name, "Checkout");
    assert_eq!(checkout.test_count, 2);
    assert_eq!(checkout.source_ref, DEFAULT_BRANCH);
    assert!(
        checkout
            .yaml_payload
            .as_deref()
            .is_some_and(|yaml| yaml.contains("add item"))
    );

    let tests = harness.store.tests().await;
    let pay = tests.iter().find(|t| t.name == "pay").unwrap();
    assert_eq!(pay.suite_id, checkout.id);
    assert_eq!(pay.step_count, 1);
}

#[tokio::test]
async fn test_removed_test_is_tombstoned_and_restored() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;
    let input = harness.scan_input(org, DEFAULT_BRANCH);
    harness.scanner.scan(&input, ScanKind::Full).await;

    harness
        .content
        .put_file(DEFAULT_BRANCH, CHECKOUT, suite_yaml("Checkout", &["add item"]))
        .await;
    let outcome = harness.scanner.scan(&input, ScanKind::Full).await;
    assert_eq!(outcome.phase, ScanPhase::Succeeded);

    let pay = |tests: Vec<Test>| tests.into_iter().find(|t| t.name == "pay").unwrap();
    let removed = pay(harness.store.tests().await);
    assert!(!removed.is_active);
    assert_eq!(
        removed.deactivated_reason.as_deref(),
        Some("missing_from_suite_yaml")
    );
    assert!(removed.deactivated_at.is_some());

    harness
        .content
        .put_file(
            DEFAULT_BRANCH,
            CHECKOUT,
            suite_yaml("Checkout", &["add item", "pay"]),
        )
        .await;
    harness.scanner.scan(&input, ScanKind::Full).await;

    let restored = pay(harness.store.tests().await);
    assert_eq!(restored.id, removed.id);
    assert!(restored.is_active);
    assert!(restored.deactivated_reason.is_none());
}

#[tokio::test]
async fn test_deleted_suite_file_is_tombstoned_with_its_tests() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;
    let input = harness.scan_input(org, DEFAULT_BRANCH);
    harness.scanner.scan(&input, ScanKind::Full).await;

    harness.content.remove_file(DEFAULT_BRANCH, CHECKOUT).await;
    let outcome = harness.scanner.scan(&input, ScanKind::Full).await;
    assert_eq!(outcome.phase, ScanPhase::Succeeded);
    assert_eq!(outcome.result.suites_found, 1);

    let suites = harness.store.suites().await;
    let checkout = suites.iter().find(|s| s.file_path == CHECKOUT).unwrap();
    assert!(!checkout.is_active);
    assert_eq!(
        checkout.deactivated_reason.as_deref(),
        Some("missing_from_scan")
    );
    let api = suites.iter().find(|s| s.file_path == API_SMOKE).unwrap();
    assert!(api.is_active);

    let tests = harness.store.tests().await;
    assert!(
        tests
            .iter()
            .filter(|t| t.suite_id == checkout.id)
            .all(|t| !t.is_active)
    );
}

#[tokio::test]
async fn test_invalid_suite_yields_partial_failure() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;
    harness
        .content
        .put_file(
            DEFAULT_BRANCH,
            ".rocketship/broken.yaml",
            "name: Broken\nversion: v1.0.0\ntests: []\n",
        )
        .await;

    let input = harness.scan_input(org, DEFAULT_BRANCH);
    let outcome = harness.scanner.scan_and_record(&input, ScanKind::Full).await;

    assert_eq!(outcome.phase, ScanPhase::PartiallyFailed);
    assert_eq!(outcome.result.suites_found, 2);
    assert_eq!(outcome.result.tests_found, 3);
    assert_eq!(outcome.result.errors.len(), 1);
    assert!(
        outcome.result.errors[0].starts_with("failed to process suite file .rocketship/broken.yaml")
    );

    let attempts = harness.store.scan_attempts().await;
    assert_eq!(attempts[0].status, ScanAttemptStatus::Error);
    assert_eq!(attempts[0].suites_found, 2);
    assert!(
        attempts[0]
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("broken.yaml"))
    );
}

#[tokio::test]
async fn test_truncated_tree_skips_tombstoning() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;
    let input = harness.scan_input(org, DEFAULT_BRANCH);
    harness.scanner.scan(&input, ScanKind::Full).await;

    harness.content.remove_file(DEFAULT_BRANCH, CHECKOUT).await;
    harness.content.truncate_tree(DEFAULT_BRANCH).await;
    let outcome = harness.scanner.scan_and_record(&input, ScanKind::Full).await;

    assert!(outcome.result.truncated);
    assert_eq!(outcome.phase, ScanPhase::PartiallyFailed);
    assert!(outcome.result.errors.iter().any(|e| e == "tree truncated"));

    let suites = harness.store.suites().await;
    let checkout = suites.iter().find(|s| s.file_path == CHECKOUT).unwrap();
    assert!(checkout.is_active, "truncated scans must not tombstone");

    let attempts = harness.store.scan_attempts().await;
    assert_eq!(attempts.last().unwrap().status, ScanAttemptStatus::Error);
}

#[tokio::test]
async fn test_project_creation_race_reuses_winner() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    harness
        .content
        .put_file(DEFAULT_BRANCH, CHECKOUT, suite_yaml("Checkout", &["add item"]))
        .await;
    harness.store.lose_next_project_race().await;

    let outcome = harness
        .scanner
        .scan(&harness.scan_input(org, DEFAULT_BRANCH), ScanKind::Full)
        .await;

    assert_eq!(outcome.phase, ScanPhase::Succeeded);
    assert_eq!(outcome.result.suites_found, 1);
    let projects = harness.store.projects().await;
    assert_eq!(projects.len(), 1);
    assert_eq!(harness.store.suites().await[0].project_id, projects[0].id);
}

#[tokio::test]
async fn test_tree_failure_aborts_scan() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    seed_default_branch(&harness).await;
    harness.content.fail_tree(DEFAULT_BRANCH).await;

    let input = harness.scan_input(org, DEFAULT_BRANCH);
    let outcome = harness.scanner.scan_and_record(&input, ScanKind::Full).await;

    assert_eq!(outcome.phase, ScanPhase::Failed);
    assert!(outcome.failure.is_some());
    assert_eq!(outcome.result.suites_found, 0);
    assert!(harness.store.projects().await.is_empty());

    let transitions: Vec<_> = outcome.transitions.iter().map(|t| t.to).collect();
    assert_eq!(transitions, vec![ScanPhase::Fetching, ScanPhase::Failed]);

    let attempts = harness.store.scan_attempts().await;
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].status, ScanAttemptStatus::Error);
    assert!(attempts[0].error_message.is_some());
}

#[tokio::test]
async fn test_scan_fetches_files_at_head_sha() {
    let harness = Harness::new();
    let org = OrganizationId::generate();
    let sha = "1f2e3d4c5b6a79881f2e3d4c5b6a79881f2e3d4c";
    harness
        .content
        .put_file(sha, CHECKOUT, suite_yaml("Checkout", &["add item"]))
        .await;

    let mut input = harness.scan_input(org, DEFAULT_BRANCH);
    input.head_sha = Some(sha.to_string());
    let outcome = harness.scanner.scan_and_record(&input, ScanKind::Full).await;

    assert_eq!(outcome.phase, ScanPhase::Succeeded);
    let suites = harness.store.suites().await;
    assert_eq!(suites[0].source_ref, DEFAULT_BRANCH);
    let attempts = harness.store.scan_attempts().await;
    assert_eq!(attempts[0].head_sha.as_deref(), Some(sha));
}
