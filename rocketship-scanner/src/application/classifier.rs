//! Webhook classification
//!
//! Pure functions turning a parsed webhook into a plan: which lifecycle change to
//! apply, whether to refresh default-branch head metadata, and which scan to run.

use chrono::{DateTime, Utc};

use rocketship_core::domain::discovery::{
    DeactivationReason, DefaultBranchHead, NormalizedRef, ROCKETSHIP_DIR,
};

use crate::domain::webhook::{NULL_SHA, PullRequestEvent, PushEvent, WebhookEvent};

/// Scan to run for an event
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Ignore {
        reason: String,
    },
    FullScan {
        source_ref: NormalizedRef,
        head_sha: Option<String>,
    },
    DeltaScan {
        source_ref: NormalizedRef,
        head_sha: Option<String>,
        pr_number: i64,
    },
}

impl Decision {
    fn ignore(reason: impl Into<String>) -> Self {
        Self::Ignore {
            reason: reason.into(),
        }
    }

    pub fn is_scan(&self) -> bool {
        !matches!(self, Self::Ignore { .. })
    }
}

/// Pull request lifecycle change keyed by the head branch
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleAction {
    Deactivate {
        source_ref: String,
        reason: DeactivationReason,
    },
    Reactivate {
        source_ref: String,
    },
}

/// New head metadata for every project tracking the default branch
#[derive(Debug, Clone, PartialEq)]
pub struct HeadUpdate {
    pub default_branch: String,
    pub head: DefaultBranchHead,
}

/// Everything to do for one webhook, in the order it should be applied
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPlan {
    pub lifecycle: Option<LifecycleAction>,
    pub head_update: Option<HeadUpdate>,
    pub decision: Decision,
}

pub fn plan(event: &WebhookEvent, now: DateTime<Utc>) -> WebhookPlan {
    match event {
        WebhookEvent::Push(push) => WebhookPlan {
            lifecycle: None,
            head_update: head_update(push, now),
            decision: classify_push(push),
        },
        WebhookEvent::PullRequest(pr) => WebhookPlan {
            lifecycle: lifecycle_action(pr),
            head_update: None,
            decision: classify_pull_request(pr),
        },
        WebhookEvent::Other { event, .. } => WebhookPlan {
            lifecycle: None,
            head_update: None,
            decision: Decision::ignore(format!("unhandled event {}", event)),
        },
    }
}

pub fn classify_push(push: &PushEvent) -> Decision {
    let Some(default_branch) = default_branch(push) else {
        return Decision::ignore("repository default branch unknown");
    };

    let source_ref = NormalizedRef::normalize(&push.git_ref);
    if !source_ref.is_branch() {
        return Decision::ignore(format!("ref {} is not a branch", push.git_ref));
    }
    if source_ref.name != default_branch {
        return Decision::ignore(format!(
            "push to {} is not the default branch {}",
            source_ref.name, default_branch
        ));
    }
    if !touches_rocketship(push) {
        return Decision::ignore("push does not touch .rocketship");
    }

    Decision::FullScan {
        source_ref,
        head_sha: push_head_sha(push),
    }
}

/// Head metadata refresh for a default-branch push, regardless of what it touched
pub fn head_update(push: &PushEvent, now: DateTime<Utc>) -> Option<HeadUpdate> {
    let default_branch = default_branch(push)?;
    let source_ref = NormalizedRef::normalize(&push.git_ref);
    if !source_ref.is_branch() || source_ref.name != default_branch {
        return None;
    }

    let sha = push_head_sha(push)?;
    let message = push
        .head_commit
        .as_ref()
        .map(|commit| first_line(&commit.message))
        .unwrap_or_default();

    Some(HeadUpdate {
        default_branch: default_branch.to_string(),
        head: DefaultBranchHead {
            sha,
            message,
            at: now,
        },
    })
}

pub fn classify_pull_request(event: &PullRequestEvent) -> Decision {
    if !matches!(event.action.as_str(), "opened" | "reopened" | "synchronize") {
        return Decision::ignore(format!("pull_request action {}", event.action));
    }

    let Some(pr) = event.pull_request.as_ref() else {
        return Decision::ignore("pull_request payload missing");
    };
    let Some(head) = pr.head_branch() else {
        return Decision::ignore("pull request head ref missing");
    };
    let Some(pr_number) = event.pr_number() else {
        return Decision::ignore("pull request number missing");
    };

    Decision::DeltaScan {
        source_ref: NormalizedRef::branch(head),
        head_sha: pr.head_sha().map(str::to_string),
        pr_number,
    }
}

pub fn lifecycle_action(event: &PullRequestEvent) -> Option<LifecycleAction> {
    let pr = event.pull_request.as_ref()?;
    let head = pr.head_branch()?.to_string();

    match event.action.as_str() {
        "closed" => Some(LifecycleAction::Deactivate {
            source_ref: head,
            reason: if pr.is_merged() {
                DeactivationReason::Merged
            } else {
                DeactivationReason::Closed
            },
        }),
        "reopened" => Some(LifecycleAction::Reactivate { source_ref: head }),
        _ => None,
    }
}

/// Whether the head commit or any listed commit adds, modifies or removes a path
/// containing `.rocketship`
pub fn touches_rocketship(push: &PushEvent) -> bool {
    push.head_commit
        .iter()
        .chain(&push.commits)
        .flat_map(|commit| commit.touched_paths())
        .any(|path| path.contains(ROCKETSHIP_DIR))
}

/// `after`, falling back to the head commit id; the null SHA counts as absent
pub fn push_head_sha(push: &PushEvent) -> Option<String> {
    let usable = |sha: &str| !sha.trim().is_empty() && sha != NULL_SHA;

    push.after
        .as_deref()
        .filter(|sha| usable(sha))
        .or_else(|| {
            push.head_commit
                .as_ref()
                .map(|commit| commit.id.as_str())
                .filter(|sha| usable(sha))
        })
        .map(|sha| sha.trim().to_string())
}

pub fn first_line(message: &str) -> String {
    message.lines().next().unwrap_or_default().trim().to_string()
}

fn default_branch(push: &PushEvent) -> Option<&str> {
    push.repository
        .as_ref()
        .map(|repo| repo.default_branch.as_str())
        .filter(|branch| !branch.is_empty())
}
