//! Rule evaluators
//!
//! Each evaluator owns the checks of one concern area. A check inspects one
//! typed payload and yields zero or one [`Alert`]; "no alert" is the normal
//! outcome for events that do not match, errors are reserved for processing
//! failures.

pub mod repository;
pub mod security;
pub mod team;
pub mod token;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::alert::Alert;
use crate::error::{AlertError, Result};
use crate::webhook::{EventKind, WebhookEvent};

pub use repository::RepositoryEvaluator;
pub use security::SecurityEvaluator;
pub use team::TeamEvaluator;
pub use token::TokenEvaluator;

/// Placeholder used in alert texts for identifiers missing from the payload.
pub(crate) const UNKNOWN: &str = "desconocido";

/// Every capability an evaluator exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Check {
    DeletedBranch,
    BranchProtectionRemoval,
    BypassPushRuleset,
    MembershipChanges,
    PrivateRepositoryRemoved,
    PushUser,
    GeneratePullRequest,
    ChangesFolderConfig,
    ForcePush,
    PersonalAccessTokenRequests,
}

impl Check {
    pub const ALL: [Check; 10] = [
        Check::DeletedBranch,
        Check::BranchProtectionRemoval,
        Check::BypassPushRuleset,
        Check::MembershipChanges,
        Check::PrivateRepositoryRemoved,
        Check::PushUser,
        Check::GeneratePullRequest,
        Check::ChangesFolderConfig,
        Check::ForcePush,
        Check::PersonalAccessTokenRequests,
    ];

    /// Route segment under `/webhooks/`.
    pub fn slug(&self) -> &'static str {
        match self {
            Check::DeletedBranch => "delete-important-branch",
            Check::BranchProtectionRemoval => "delete-protection-branch",
            Check::BypassPushRuleset => "bypass-push-ruleset",
            Check::MembershipChanges => "membership-change",
            Check::PrivateRepositoryRemoved => "repository-removed",
            Check::PushUser => "validate-changes-push-user",
            Check::GeneratePullRequest => "generate-pull-request",
            Check::ChangesFolderConfig => "validate-changes-folder",
            Check::ForcePush => "force-push",
            Check::PersonalAccessTokenRequests => "personal-access-token-request",
        }
    }

    /// The only event type this check can evaluate.
    pub fn event_kind(&self) -> EventKind {
        match self {
            Check::DeletedBranch => EventKind::Delete,
            Check::BranchProtectionRemoval => EventKind::BranchProtectionRule,
            Check::BypassPushRuleset => EventKind::BypassRequestPushRuleset,
            Check::MembershipChanges => EventKind::Membership,
            Check::PrivateRepositoryRemoved => EventKind::Repository,
            Check::PushUser
            | Check::GeneratePullRequest
            | Check::ChangesFolderConfig
            | Check::ForcePush => EventKind::Push,
            Check::PersonalAccessTokenRequests => EventKind::PersonalAccessTokenRequest,
        }
    }

    /// Whether the check calls the GitHub API and so may be slow.
    pub fn needs_github(&self) -> bool {
        matches!(
            self,
            Check::PushUser | Check::GeneratePullRequest | Check::ForcePush
        )
    }

    /// Checks run for a delivery on the generic `/webhook` route.
    pub fn defaults_for(kind: EventKind) -> &'static [Check] {
        match kind {
            EventKind::Delete => &[Check::DeletedBranch],
            EventKind::BranchProtectionRule => &[Check::BranchProtectionRemoval],
            EventKind::BypassRequestPushRuleset => &[Check::BypassPushRuleset],
            EventKind::Membership => &[Check::MembershipChanges],
            EventKind::Repository => &[Check::PrivateRepositoryRemoved],
            EventKind::Push => &[
                Check::PushUser,
                Check::ChangesFolderConfig,
                Check::ForcePush,
                Check::GeneratePullRequest,
            ],
            EventKind::PersonalAccessTokenRequest => &[Check::PersonalAccessTokenRequests],
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.slug())
    }
}

impl FromStr for Check {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        Check::ALL
            .into_iter()
            .find(|check| check.slug() == s)
            .ok_or_else(|| AlertError::UnsupportedEvent(format!("no check named '{}'", s)))
    }
}

#[async_trait]
pub trait Evaluator: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(&self, check: Check, event: &WebhookEvent) -> Result<Option<Alert>>;
}

/// Error for a check handed an event of the wrong shape.
pub(crate) fn mismatch(evaluator: &str, check: Check, event: &WebhookEvent) -> AlertError {
    AlertError::Validation(format!(
        "{} evaluator cannot run '{}' on a '{}' event",
        evaluator,
        check,
        event.kind()
    ))
}

/// `refs/heads/main` -> `main`; other refs are returned untouched.
pub fn branch_name(git_ref: &str) -> &str {
    git_ref.strip_prefix("refs/heads/").unwrap_or(git_ref)
}
