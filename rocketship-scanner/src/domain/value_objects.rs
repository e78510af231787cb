//! Scanner value objects

use serde::{Deserialize, Serialize};

use rocketship_core::domain::discovery::ScanAttemptStatus;

/// Phase of a single scan invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// Input accepted, nothing fetched yet
    Started,
    /// Repository metadata, tree or pull request files are being fetched
    Fetching,
    /// Suite files are being fetched, parsed and upserted
    Parsing,
    /// Directory-level tombstoning
    Reconciling,
    /// Every directory and file was processed
    Succeeded,
    /// Some directories or files failed; successful upserts are kept
    PartiallyFailed,
    /// The scan aborted
    Failed,
}

impl ScanPhase {
    /// Returns the set of valid target phases from the current phase.
    ///
    /// ```text
    /// Started ──► Fetching ──► Parsing ──► Reconciling ──► Succeeded
    ///    │           │            │             ├────────► PartiallyFailed
    ///    └───────────┴────────────┴─────────────┴────────► Failed
    /// ```
    pub fn valid_transitions(&self) -> &[ScanPhase] {
        match self {
            Self::Started => &[Self::Fetching, Self::Failed],
            Self::Fetching => &[Self::Parsing, Self::Failed],
            Self::Parsing => &[Self::Reconciling, Self::Failed],
            Self::Reconciling => &[Self::Succeeded, Self::PartiallyFailed, Self::Failed],
            Self::Succeeded | Self::PartiallyFailed | Self::Failed => &[],
        }
    }

    pub fn can_transition_to(&self, target: &ScanPhase) -> bool {
        self.valid_transitions().contains(target)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::PartiallyFailed | Self::Failed
        )
    }

    /// Status written to the scan attempt once the phase is terminal
    pub fn attempt_status(&self) -> ScanAttemptStatus {
        match self {
            Self::Succeeded => ScanAttemptStatus::Success,
            Self::PartiallyFailed | Self::Failed => ScanAttemptStatus::Error,
            Self::Started | Self::Fetching | Self::Parsing | Self::Reconciling => {
                ScanAttemptStatus::Skipped
            }
        }
    }
}

impl std::fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "Started"),
            Self::Fetching => write!(f, "Fetching"),
            Self::Parsing => write!(f, "Parsing"),
            Self::Reconciling => write!(f, "Reconciling"),
            Self::Succeeded => write!(f, "Succeeded"),
            Self::PartiallyFailed => write!(f, "PartiallyFailed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Recorded phase change of a scan (audit trail kept on the outcome)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanTransition {
    pub from: ScanPhase,
    pub to: ScanPhase,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Error returned when an invalid phase transition is attempted.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid scan transition from {from} to {to}")]
pub struct ScanTransitionError {
    pub from: ScanPhase,
    pub to: ScanPhase,
}

/// Which kind of scan to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKind {
    /// Walk the whole tree at the ref
    Full,
    /// Only the files a pull request reports as changed
    Delta { pr_number: i64 },
}
