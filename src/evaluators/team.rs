//! Team membership changes

use async_trait::async_trait;

use super::{Check, Evaluator, UNKNOWN, mismatch};
use crate::alert::{Alert, Category};
use crate::error::Result;
use crate::webhook::{MembershipPayload, WebhookEvent};

#[derive(Debug, Default)]
pub struct TeamEvaluator;

impl TeamEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn monitor_membership_changes(&self, payload: &MembershipPayload) -> Option<Alert> {
        let action = payload.action.as_deref()?;
        let verb = match action {
            "added" => "agregado al",
            "removed" => "eliminado del",
            _ => return None,
        };

        let member = payload.member.as_ref().and_then(|m| m.login.as_deref());
        let team = payload.team.as_ref().and_then(|t| t.name.as_deref());
        let organization = payload
            .organization
            .as_ref()
            .and_then(|o| o.login.as_deref());
        let sender = payload.sender.as_ref().and_then(|s| s.login.as_deref());

        Some(
            Alert::new(
                "membership",
                Category::Low,
                format!("Cambio en membresía detectado: {}", action),
                format!(
                    "El usuario {} fue {} equipo {} en la organización {} por {}.",
                    member.unwrap_or(UNKNOWN),
                    verb,
                    team.unwrap_or(UNKNOWN),
                    organization.unwrap_or(UNKNOWN),
                    sender.unwrap_or(UNKNOWN)
                ),
            )
            .with_actor(sender)
            .with_source_url(payload.team.as_ref().and_then(|t| t.html_url.as_deref())),
        )
    }
}

#[async_trait]
impl Evaluator for TeamEvaluator {
    fn name(&self) -> &'static str {
        "team"
    }

    async fn run(&self, check: Check, event: &WebhookEvent) -> Result<Option<Alert>> {
        match (check, event) {
            (Check::MembershipChanges, WebhookEvent::Membership(p)) => {
                Ok(self.monitor_membership_changes(p))
            }
            _ => Err(mismatch(self.name(), check, event)),
        }
    }
}
