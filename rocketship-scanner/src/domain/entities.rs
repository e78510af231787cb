//! Scanner domain entities

use chrono::Utc;
use serde::{Deserialize, Serialize};

use rocketship_core::domain::discovery::{
    GitHubAppInstallation, NewScanAttempt, NormalizedRef, OrganizationId, RepositoryName, ScanAttemptStatus,
};

use super::value_objects::{ScanPhase, ScanTransition, ScanTransitionError};

/// Everything a scan needs to know about where to look
#[derive(Debug, Clone, PartialEq)]
pub struct ScanInput {
    pub organization_id: OrganizationId,
    pub installation_id: i64,
    pub repository: RepositoryName,
    pub source_ref: NormalizedRef,
    pub head_sha: Option<String>,
    pub delivery_id: String,
}

impl ScanInput {
    /// Ref used for content fetches: the head SHA when known, else the ref name
    pub fn fetch_ref(&self) -> &str {
        self.head_sha
            .as_deref()
            .filter(|sha| !sha.is_empty())
            .unwrap_or(&self.source_ref.name)
    }

    pub fn repo_url(&self) -> String {
        self.repository.repo_url()
    }
}

/// Counts and per-entity errors collected while a scan runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub suites_found: i32,
    pub tests_found: i32,
    pub errors: Vec<String>,
    /// The remote tree listing was cut short
    pub truncated: bool,
}

impl ScanResult {
    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn joined_errors(&self) -> Option<String> {
        self.has_errors().then(|| self.errors.join("; "))
    }
}

/// Phase tracker for one scan invocation
#[derive(Debug, Clone, PartialEq)]
pub struct ScanProgress {
    phase: ScanPhase,
    transitions: Vec<ScanTransition>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self {
            phase: ScanPhase::Started,
            transitions: Vec::new(),
        }
    }

    pub fn phase(&self) -> ScanPhase {
        self.phase
    }

    pub fn transitions(&self) -> &[ScanTransition] {
        &self.transitions
    }

    pub fn advance(&mut self, to: ScanPhase) -> Result<(), ScanTransitionError> {
        if !self.phase.can_transition_to(&to) {
            return Err(ScanTransitionError {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(ScanTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
        });
        self.phase = to;
        Ok(())
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}

/// Final state of a scan, ready to be recorded as a scan attempt
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOutcome {
    pub source_ref: String,
    pub phase: ScanPhase,
    pub result: ScanResult,
    /// Set when the scan aborted
    pub failure: Option<String>,
    pub transitions: Vec<ScanTransition>,
}

impl ScanOutcome {
    pub fn status(&self) -> ScanAttemptStatus {
        self.phase.attempt_status()
    }

    /// Message stored on the scan attempt: the abort reason, or every collected error
    pub fn error_message(&self) -> Option<String> {
        self.failure
            .clone()
            .or_else(|| self.result.joined_errors())
    }

    pub fn to_attempt(&self, input: &ScanInput) -> NewScanAttempt {
        NewScanAttempt {
            delivery_id: input.delivery_id.clone(),
            organization_id: input.organization_id,
            repository_full_name: input.repository.full_name(),
            source_ref: input.source_ref.name.clone(),
            head_sha: input.head_sha.clone().filter(|sha| !sha.is_empty()),
            status: self.status(),
            error_message: self.error_message(),
            suites_found: self.result.suites_found,
            tests_found: self.result.tests_found,
        }
    }
}

/// Result of one constituent scan of a bootstrap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapScan {
    pub source_ref: String,
    pub status: ScanAttemptStatus,
    pub suites_found: i32,
    pub tests_found: i32,
    pub error: Option<String>,
}

impl From<&ScanOutcome> for BootstrapScan {
    fn from(outcome: &ScanOutcome) -> Self {
        Self {
            source_ref: outcome.source_ref.clone(),
            status: outcome.status(),
            suites_found: outcome.result.suites_found,
            tests_found: outcome.result.tests_found,
            error: outcome.error_message(),
        }
    }
}

/// Aggregated result of connecting a repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootstrapReport {
    pub repo_full_name: String,
    pub default_branch: String,
    pub scans: Vec<BootstrapScan>,
}

/// Whether an organization has the GitHub App installed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallationStatus {
    pub installed: bool,
    pub install_url: String,
    pub account_login: Option<String>,
    pub account_type: Option<String>,
}

impl InstallationStatus {
    pub fn new(install_url: impl Into<String>, installation: Option<&GitHubAppInstallation>) -> Self {
        Self {
            installed: installation.is_some(),
            install_url: install_url.into(),
            account_login: installation.map(|i| i.account_login.clone()),
            account_type: installation.map(|i| i.account_type.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(head_sha: Option<&str>) -> ScanInput {
        ScanInput {
            organization_id: OrganizationId::generate(),
            installation_id: 1,
            repository: "acme/widgets".parse().unwrap(),
            source_ref: NormalizedRef::branch("main"),
            head_sha: head_sha.map(str::to_string),
            delivery_id: "d-1".to_string(),
        }
    }

    #[test]
    fn test_fetch_ref_prefers_head_sha() {
        assert_eq!(input(Some("abc123")).fetch_ref(), "abc123");
        assert_eq!(input(None).fetch_ref(), "main");
        assert_eq!(input(Some("")).fetch_ref(), "main");
    }

    #[test]
    fn test_progress_rejects_skipping_phases() {
        let mut progress = ScanProgress::new();
        let err = progress.advance(ScanPhase::Reconciling).unwrap_err();
        assert_eq!(err.from, ScanPhase::Started);
        assert_eq!(progress.phase(), ScanPhase::Started);

        progress.advance(ScanPhase::Fetching).unwrap();
        progress.advance(ScanPhase::Failed).unwrap();
        assert_eq!(progress.transitions().len(), 2);
        assert!(progress.advance(ScanPhase::Fetching).is_err());
    }

    #[test]
    fn test_partial_outcome_keeps_counts_and_joins_errors() {
        let outcome = ScanOutcome {
            source_ref: "main".to_string(),
            phase: ScanPhase::PartiallyFailed,
            result: ScanResult {
                suites_found: 2,
                tests_found: 5,
                errors: vec!["bad a.yaml".to_string(), "bad b.yaml".to_string()],
                truncated: false,
            },
            failure: None,
            transitions: Vec::new(),
        };

        let attempt = outcome.to_attempt(&input(Some("abc")));
        assert_eq!(attempt.status, ScanAttemptStatus::Error);
        assert_eq!(attempt.error_message.as_deref(), Some("bad a.yaml; bad b.yaml"));
        assert_eq!(attempt.suites_found, 2);
        assert_eq!(attempt.tests_found, 5);
        assert_eq!(attempt.repository_full_name, "acme/widgets");
        assert_eq!(attempt.head_sha.as_deref(), Some("abc"));
    }
}
