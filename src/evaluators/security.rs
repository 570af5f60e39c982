//! Branch and ref protection rules

use async_trait::async_trait;

use super::{Check, Evaluator, UNKNOWN, branch_name, mismatch};
use crate::alert::{Alert, Category};
use crate::error::Result;
use crate::webhook::{
    BranchProtectionRulePayload, BypassPushRulesetPayload, DeletePayload, WebhookEvent,
};

/// Branches whose deletion or loss of protection is always reported.
pub const IMPORTANT_BRANCHES: [&str; 3] = ["main", "develop", "quality"];

#[derive(Debug)]
pub struct SecurityEvaluator {
    important_branches: &'static [&'static str],
}

impl Default for SecurityEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityEvaluator {
    pub fn new() -> Self {
        Self {
            important_branches: &IMPORTANT_BRANCHES,
        }
    }

    fn is_important(&self, branch: &str) -> bool {
        self.important_branches.contains(&branch)
    }

    pub fn validate_deleted_branch(&self, payload: &DeletePayload) -> Option<Alert> {
        if payload.ref_type.as_deref() != Some("branch") {
            return None;
        }

        let branch = payload.git_ref.as_deref()?;
        if !self.is_important(branch) {
            return None;
        }

        let repo = payload.repository.as_ref();
        let repository = repo.and_then(|r| r.full_name.as_deref());

        Some(
            Alert::new(
                "delete",
                Category::High,
                "Webhook recibido y procesado correctamente, se crea alerta de rama importante eliminada",
                format!(
                    "Alerta: Se eliminó la rama protegida {} en el repo {}",
                    branch,
                    repository.unwrap_or(UNKNOWN)
                ),
            )
            .with_repository(repository)
            .with_branch(Some(branch))
            .with_actor(payload.sender.as_ref().and_then(|s| s.login.as_deref()))
            .with_source_url(repo.and_then(|r| r.html_url.as_deref())),
        )
    }

    pub fn validate_branch_protection_removal(
        &self,
        payload: &BranchProtectionRulePayload,
    ) -> Option<Alert> {
        if payload.action.as_deref() != Some("deleted") {
            return None;
        }

        let branch = payload.rule.as_ref().and_then(|r| r.name.as_deref())?;
        if !self.is_important(branch) {
            return None;
        }

        let repo = payload.repository.as_ref();
        let repository = repo.and_then(|r| r.full_name.as_deref());

        Some(
            Alert::new(
                "branch_protection_rule",
                Category::Medium,
                "Protección de rama eliminada",
                format!(
                    "Se eliminó la protección de la rama \"{}\" en el repositorio {}.",
                    branch,
                    repository.unwrap_or(UNKNOWN)
                ),
            )
            .with_repository(repository)
            .with_branch(Some(branch))
            .with_actor(payload.sender.as_ref().and_then(|s| s.login.as_deref()))
            .with_source_url(repo.and_then(|r| r.html_url.as_deref())),
        )
    }

    pub fn monitor_bypass_push_ruleset(&self, payload: &BypassPushRulesetPayload) -> Alert {
        let request = payload.bypass_request.as_ref();
        let actor = request
            .and_then(|r| r.actor.as_ref())
            .and_then(|a| a.login.as_deref());
        let branch = request
            .and_then(|r| r.target.as_ref())
            .and_then(|t| t.git_ref.as_deref())
            .map(branch_name);
        let state = request.and_then(|r| r.state.as_deref());
        let repository = payload
            .repository
            .as_ref()
            .and_then(|r| r.full_name.as_deref());

        Alert::new(
            "bypass_request_push_ruleset",
            Category::Medium,
            "Solicitud de bypass detectada",
            format!(
                "Solicitud de bypass ({}) en la rama \"{}\" del repositorio {} por el usuario {}. Estado: {}",
                payload.action.as_deref().unwrap_or(UNKNOWN),
                branch.unwrap_or(UNKNOWN),
                repository.unwrap_or(UNKNOWN),
                actor.unwrap_or(UNKNOWN),
                state.unwrap_or(UNKNOWN)
            ),
        )
        .with_repository(repository)
        .with_branch(branch)
        .with_actor(actor)
        .with_source_url(request.and_then(|r| r.html_url.as_deref()))
    }
}

#[async_trait]
impl Evaluator for SecurityEvaluator {
    fn name(&self) -> &'static str {
        "security"
    }

    async fn run(&self, check: Check, event: &WebhookEvent) -> Result<Option<Alert>> {
        match (check, event) {
            (Check::DeletedBranch, WebhookEvent::Delete(p)) => Ok(self.validate_deleted_branch(p)),
            (Check::BranchProtectionRemoval, WebhookEvent::BranchProtectionRule(p)) => {
                Ok(self.validate_branch_protection_removal(p))
            }
            (Check::BypassPushRuleset, WebhookEvent::BypassRequestPushRuleset(p)) => {
                Ok(Some(self.monitor_bypass_push_ruleset(p)))
            }
            _ => Err(mismatch(self.name(), check, event)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn delete(ref_type: &str, git_ref: &str) -> DeletePayload {
        serde_json::from_value(json!({
            "ref": git_ref,
            "ref_type": ref_type,
            "repository": {"full_name": "org/repo", "html_url": "https://github.com/org/repo"},
            "sender": {"login": "mallory"}
        }))
        .unwrap()
    }

    #[test]
    fn deleting_an_important_branch_is_high() {
        let evaluator = SecurityEvaluator::new();
        for branch in IMPORTANT_BRANCHES {
            let alert = evaluator
                .validate_deleted_branch(&delete("branch", branch))
                .expect("important branch should alert");
            assert_eq!(alert.category, Category::High);
            assert_eq!(alert.branch.as_deref(), Some(branch));
            assert_eq!(alert.repository.as_deref(), Some("org/repo"));
            assert_eq!(alert.actor.as_deref(), Some("mallory"));
            assert!(alert.alert.contains(branch));
        }
    }

    #[test]
    fn tags_and_other_branches_are_ignored() {
        let evaluator = SecurityEvaluator::new();
        assert!(evaluator.validate_deleted_branch(&delete("tag", "main")).is_none());
        assert!(
            evaluator
                .validate_deleted_branch(&delete("branch", "feature/login"))
                .is_none()
        );
        assert!(
            evaluator
                .validate_deleted_branch(&DeletePayload::default())
                .is_none()
        );
    }

    #[test]
    fn protection_removal_requires_deleted_action_on_important_branch() {
        let evaluator = SecurityEvaluator::new();
        let payload = |action: &str, name: &str| -> BranchProtectionRulePayload {
            serde_json::from_value(json!({
                "action": action,
                "rule": {"name": name},
                "repository": {"full_name": "org/repo"}
            }))
            .unwrap()
        };

        let alert = evaluator
            .validate_branch_protection_removal(&payload("deleted", "develop"))
            .unwrap();
        assert_eq!(alert.category, Category::Medium);
        assert_eq!(alert.branch.as_deref(), Some("develop"));

        assert!(
            evaluator
                .validate_branch_protection_removal(&payload("edited", "main"))
                .is_none()
        );
        assert!(
            evaluator
                .validate_branch_protection_removal(&payload("created", "main"))
                .is_none()
        );
        assert!(
            evaluator
                .validate_branch_protection_removal(&payload("deleted", "feature"))
                .is_none()
        );
    }

    #[test]
    fn bypass_request_always_alerts_with_stripped_branch() {
        let evaluator = SecurityEvaluator::new();
        let payload: BypassPushRulesetPayload = serde_json::from_value(json!({
            "action": "created",
            "bypass_request": {
                "actor": {"login": "octocat"},
                "target": {"ref": "refs/heads/main"},
                "state": "pending"
            },
            "repository": {"full_name": "org/repo"}
        }))
        .unwrap();

        let alert = evaluator.monitor_bypass_push_ruleset(&payload);
        assert_eq!(alert.category, Category::Medium);
        assert_eq!(alert.branch.as_deref(), Some("main"));
        assert_eq!(alert.actor.as_deref(), Some("octocat"));
        assert!(alert.alert.contains("Estado: pending"));

        let empty = evaluator.monitor_bypass_push_ruleset(&BypassPushRulesetPayload::default());
        assert_eq!(empty.event, "bypass_request_push_ruleset");
        assert!(empty.branch.is_none());
    }

    #[tokio::test]
    async fn run_rejects_mismatched_events() {
        let evaluator = SecurityEvaluator::new();
        let event = WebhookEvent::Delete(delete("branch", "main"));
        assert!(evaluator.run(Check::DeletedBranch, &event).await.unwrap().is_some());
        assert!(evaluator.run(Check::BypassPushRuleset, &event).await.is_err());
    }
}
