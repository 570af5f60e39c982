//! Typed GitHub webhook payloads
//!
//! Only the fields the evaluators read are modelled. Every field is optional:
//! GitHub omits keys freely between event versions and a missing key must never
//! fail deserialization on its own.

use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

use crate::error::{AlertError, Result};

/// Event types the service knows how to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Delete,
    BranchProtectionRule,
    BypassRequestPushRuleset,
    Membership,
    Repository,
    Push,
    PersonalAccessTokenRequest,
}

impl EventKind {
    pub const ALL: [EventKind; 7] = [
        EventKind::Delete,
        EventKind::BranchProtectionRule,
        EventKind::BypassRequestPushRuleset,
        EventKind::Membership,
        EventKind::Repository,
        EventKind::Push,
        EventKind::PersonalAccessTokenRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Delete => "delete",
            EventKind::BranchProtectionRule => "branch_protection_rule",
            EventKind::BypassRequestPushRuleset => "bypass_request_push_ruleset",
            EventKind::Membership => "membership",
            EventKind::Repository => "repository",
            EventKind::Push => "push",
            EventKind::PersonalAccessTokenRequest => "personal_access_token_request",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| AlertError::UnsupportedEvent(s.to_string()))
    }
}

/// A user as it appears in the different payload positions (`sender`,
/// `pusher`, commit `author`, ...). Which fields are filled depends on the position.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Identity {
    pub login: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub name: Option<String>,
    pub full_name: Option<String>,
    pub html_url: Option<String>,
    pub private: Option<bool>,
    pub owner: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Organization {
    pub login: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Commit {
    pub id: Option<String>,
    pub message: Option<String>,
    pub url: Option<String>,
    pub author: Option<Identity>,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub modified: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeletePayload {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub ref_type: Option<String>,
    pub repository: Option<Repository>,
    pub sender: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProtectionRule {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BranchProtectionRulePayload {
    pub action: Option<String>,
    pub rule: Option<ProtectionRule>,
    pub repository: Option<Repository>,
    pub sender: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BypassTarget {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BypassRequest {
    pub actor: Option<Identity>,
    pub target: Option<BypassTarget>,
    pub state: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct BypassPushRulesetPayload {
    pub action: Option<String>,
    pub bypass_request: Option<BypassRequest>,
    pub repository: Option<Repository>,
    pub sender: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Team {
    pub name: Option<String>,
    pub html_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MembershipPayload {
    pub action: Option<String>,
    pub member: Option<Identity>,
    pub team: Option<Team>,
    pub organization: Option<Organization>,
    pub sender: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RepositoryPayload {
    pub action: Option<String>,
    pub repository: Option<Repository>,
    pub organization: Option<Organization>,
    pub sender: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PushPayload {
    #[serde(rename = "ref")]
    pub git_ref: Option<String>,
    pub before: Option<String>,
    pub after: Option<String>,
    pub compare: Option<String>,
    pub commits: Vec<Commit>,
    pub head_commit: Option<Commit>,
    pub repository: Option<Repository>,
    pub organization: Option<Organization>,
    pub pusher: Option<Identity>,
    pub sender: Option<Identity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TokenRequest {
    pub owner: Option<Identity>,
    pub scopes: Option<Vec<String>>,
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonalAccessTokenRequestPayload {
    pub action: Option<String>,
    pub personal_access_token_request: Option<TokenRequest>,
    pub organization: Option<Organization>,
    pub sender: Option<Identity>,
}

/// One parsed delivery.
#[derive(Debug, Clone)]
pub enum WebhookEvent {
    Delete(DeletePayload),
    BranchProtectionRule(BranchProtectionRulePayload),
    BypassRequestPushRuleset(BypassPushRulesetPayload),
    Membership(MembershipPayload),
    Repository(RepositoryPayload),
    Push(PushPayload),
    PersonalAccessTokenRequest(PersonalAccessTokenRequestPayload),
}

impl WebhookEvent {
    /// Parse a raw delivery body as the payload of `kind`.
    pub fn from_slice(kind: EventKind, body: &[u8]) -> Result<Self> {
        let event = match kind {
            EventKind::Delete => WebhookEvent::Delete(serde_json::from_slice(body)?),
            EventKind::BranchProtectionRule => {
                WebhookEvent::BranchProtectionRule(serde_json::from_slice(body)?)
            }
            EventKind::BypassRequestPushRuleset => {
                WebhookEvent::BypassRequestPushRuleset(serde_json::from_slice(body)?)
            }
            EventKind::Membership => WebhookEvent::Membership(serde_json::from_slice(body)?),
            EventKind::Repository => WebhookEvent::Repository(serde_json::from_slice(body)?),
            EventKind::Push => WebhookEvent::Push(serde_json::from_slice(body)?),
            EventKind::PersonalAccessTokenRequest => {
                WebhookEvent::PersonalAccessTokenRequest(serde_json::from_slice(body)?)
            }
        };
        Ok(event)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            WebhookEvent::Delete(_) => EventKind::Delete,
            WebhookEvent::BranchProtectionRule(_) => EventKind::BranchProtectionRule,
            WebhookEvent::BypassRequestPushRuleset(_) => EventKind::BypassRequestPushRuleset,
            WebhookEvent::Membership(_) => EventKind::Membership,
            WebhookEvent::Repository(_) => EventKind::Repository,
            WebhookEvent::Push(_) => EventKind::Push,
            WebhookEvent::PersonalAccessTokenRequest(_) => EventKind::PersonalAccessTokenRequest,
        }
    }

    /// `owner/name` of the repository the event belongs to, if any.
    pub fn repository_name(&self) -> Option<&str> {
        let repo = match self {
            WebhookEvent::Delete(p) => p.repository.as_ref(),
            WebhookEvent::BranchProtectionRule(p) => p.repository.as_ref(),
            WebhookEvent::BypassRequestPushRuleset(p) => p.repository.as_ref(),
            WebhookEvent::Repository(p) => p.repository.as_ref(),
            WebhookEvent::Push(p) => p.repository.as_ref(),
            WebhookEvent::Membership(_) | WebhookEvent::PersonalAccessTokenRequest(_) => None,
        };
        repo.and_then(|r| r.full_name.as_deref())
    }
}
