//! GitHub webhook payloads
//!
//! Only the fields the classifier reads are modelled; everything else in the
//! payload is ignored.

use serde::Deserialize;

/// SHA GitHub sends as `after` when a branch is deleted
pub const NULL_SHA: &str = "0000000000000000000000000000000000000000";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct InstallationRef {
    #[serde(default)]
    pub id: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebhookRepository {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub default_branch: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebhookCommit {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub added: Vec<String>,
    #[serde(default)]
    pub removed: Vec<String>,
    #[serde(default)]
    pub modified: Vec<String>,
}

impl WebhookCommit {
    pub fn touched_paths(&self) -> impl Iterator<Item = &str> {
        self.added
            .iter()
            .chain(&self.modified)
            .chain(&self.removed)
            .map(String::as_str)
    }
}

/// `push` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PushEvent {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub head_commit: Option<WebhookCommit>,
    #[serde(default)]
    pub commits: Vec<WebhookCommit>,
    #[serde(default)]
    pub repository: Option<WebhookRepository>,
    #[serde(default)]
    pub installation: Option<InstallationRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullRequestRef {
    #[serde(rename = "ref", default)]
    pub git_ref: String,
    #[serde(default)]
    pub sha: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebhookPullRequest {
    #[serde(default)]
    pub number: i64,
    #[serde(default)]
    pub head: Option<PullRequestRef>,
    #[serde(default)]
    pub merged: Option<bool>,
}

impl WebhookPullRequest {
    /// GitHub sends `merged: null` on some actions
    pub fn is_merged(&self) -> bool {
        self.merged.unwrap_or(false)
    }

    /// Head branch name, if present and non-empty
    pub fn head_branch(&self) -> Option<&str> {
        self.head
            .as_ref()
            .map(|head| head.git_ref.as_str())
            .filter(|name| !name.is_empty())
    }

    pub fn head_sha(&self) -> Option<&str> {
        self.head
            .as_ref()
            .map(|head| head.sha.as_str())
            .filter(|sha| !sha.is_empty())
    }
}

/// `pull_request` event
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PullRequestEvent {
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub pull_request: Option<WebhookPullRequest>,
    #[serde(default)]
    pub repository: Option<WebhookRepository>,
    #[serde(default)]
    pub installation: Option<InstallationRef>,
}

impl PullRequestEvent {
    pub fn pr_number(&self) -> Option<i64> {
        self.pull_request
            .as_ref()
            .map(|pr| pr.number)
            .filter(|n| *n > 0)
            .or(self.number)
    }
}

/// Fields common to every event, used for auditing events we do not act on
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub repository: Option<WebhookRepository>,
    #[serde(default)]
    pub installation: Option<InstallationRef>,
}

/// A parsed webhook, keyed by the `X-GitHub-Event` header
#[derive(Debug, Clone, PartialEq)]
pub enum WebhookEvent {
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    Other {
        event: String,
        envelope: WebhookEnvelope,
    },
}

impl WebhookEvent {
    pub fn parse(event: &str, body: &[u8]) -> Result<Self, serde_json::Error> {
        Ok(match event {
            "push" => Self::Push(serde_json::from_slice(body)?),
            "pull_request" => Self::PullRequest(serde_json::from_slice(body)?),
            other => Self::Other {
                event: other.to_string(),
                envelope: serde_json::from_slice(body)?,
            },
        })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Push(_) => "push",
            Self::PullRequest(_) => "pull_request",
            Self::Other { event, .. } => event,
        }
    }

    pub fn repository(&self) -> Option<&WebhookRepository> {
        match self {
            Self::Push(e) => e.repository.as_ref(),
            Self::PullRequest(e) => e.repository.as_ref(),
            Self::Other { envelope, .. } => envelope.repository.as_ref(),
        }
        .filter(|repo| !repo.full_name.is_empty())
    }

    pub fn installation_id(&self) -> Option<i64> {
        match self {
            Self::Push(e) => e.installation.as_ref(),
            Self::PullRequest(e) => e.installation.as_ref(),
            Self::Other { envelope, .. } => envelope.installation.as_ref(),
        }
        .map(|installation| installation.id)
        .filter(|id| *id != 0)
    }

    /// Raw ref, recorded on the delivery for pushes only
    pub fn git_ref(&self) -> Option<&str> {
        match self {
            Self::Push(e) if !e.git_ref.is_empty() => Some(&e.git_ref),
            _ => None,
        }
    }

    /// Action, recorded on the delivery for pull requests only
    pub fn action(&self) -> Option<&str> {
        match self {
            Self::PullRequest(e) if !e.action.is_empty() => Some(&e.action),
            _ => None,
        }
    }
}
