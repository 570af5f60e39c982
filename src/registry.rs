//! Maps event types to the evaluator that handles them
//!
//! All evaluators are built once at startup and shared behind `Arc`, so every
//! event type owned by the same concern area resolves to the same instance.

use std::sync::Arc;

use crate::error::Result;
use crate::evaluators::{
    Evaluator, RepositoryEvaluator, SecurityEvaluator, TeamEvaluator, TokenEvaluator,
};
use crate::github::GitHubService;
use crate::webhook::EventKind;

pub struct Registry {
    security: Arc<SecurityEvaluator>,
    team: Arc<TeamEvaluator>,
    repository: Arc<RepositoryEvaluator>,
    token: Arc<TokenEvaluator>,
}

impl Registry {
    pub fn new(github: Arc<dyn GitHubService>, owner: impl Into<String>) -> Self {
        Self {
            security: Arc::new(SecurityEvaluator::new()),
            team: Arc::new(TeamEvaluator::new()),
            repository: Arc::new(RepositoryEvaluator::new(github, owner)),
            token: Arc::new(TokenEvaluator::new()),
        }
    }

    pub fn resolve(&self, kind: EventKind) -> Arc<dyn Evaluator> {
        match kind {
            EventKind::Delete
            | EventKind::BranchProtectionRule
            | EventKind::BypassRequestPushRuleset => self.security.clone(),
            EventKind::Membership => self.team.clone(),
            EventKind::Repository | EventKind::Push => self.repository.clone(),
            EventKind::PersonalAccessTokenRequest => self.token.clone(),
        }
    }

    /// Resolve straight from the `X-GitHub-Event` header value.
    pub fn resolve_event(&self, event_type: &str) -> Result<Arc<dyn Evaluator>> {
        Ok(self.resolve(event_type.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AlertError;
    use crate::test_utils::FakeGitHub;

    fn registry() -> Registry {
        Registry::new(Arc::new(FakeGitHub::new()), "acme")
    }

    #[test]
    fn unknown_event_is_unsupported() {
        let registry = registry();
        assert!(matches!(
            registry.resolve_event("unknown_event"),
            Err(AlertError::UnsupportedEvent(_))
        ));
        assert!(registry.resolve_event("ping").is_err());
    }

    #[test]
    fn security_events_share_one_instance() {
        let registry = registry();
        let delete = registry.resolve_event("delete").unwrap();
        let rule = registry.resolve_event("branch_protection_rule").unwrap();
        let bypass = registry.resolve_event("bypass_request_push_ruleset").unwrap();

        assert_eq!(delete.name(), "security");
        assert!(Arc::ptr_eq(&delete, &rule));
        assert!(Arc::ptr_eq(&delete, &bypass));
    }

    #[test]
    fn remaining_events_map_to_their_evaluators() {
        let registry = registry();
        assert_eq!(registry.resolve(EventKind::Membership).name(), "team");
        assert_eq!(registry.resolve(EventKind::Repository).name(), "repository");
        assert_eq!(registry.resolve(EventKind::Push).name(), "repository");
        assert_eq!(
            registry.resolve(EventKind::PersonalAccessTokenRequest).name(),
            "token"
        );
        assert!(Arc::ptr_eq(
            &registry.resolve(EventKind::Push),
            &registry.resolve(EventKind::Repository)
        ));
    }
}
