//! Fine-grained personal access token requests

use async_trait::async_trait;

use super::{Check, Evaluator, mismatch};
use crate::alert::{Alert, Category};
use crate::error::Result;
use crate::webhook::{PersonalAccessTokenRequestPayload, WebhookEvent};

#[derive(Debug, Default)]
pub struct TokenEvaluator;

impl TokenEvaluator {
    pub fn new() -> Self {
        Self
    }

    /// Always alerts. Unknown actions keep an empty narrative.
    pub fn monitor_personal_access_token_requests(
        &self,
        payload: &PersonalAccessTokenRequestPayload,
    ) -> Alert {
        let action = payload.action.as_deref().unwrap_or_default();
        let request = payload.personal_access_token_request.as_ref();

        let org = payload
            .organization
            .as_ref()
            .and_then(|o| o.login.as_deref())
            .filter(|o| !o.is_empty())
            .unwrap_or("organización desconocida");
        let user = request
            .and_then(|r| r.owner.as_ref())
            .and_then(|o| o.login.as_deref())
            .filter(|u| !u.is_empty());
        let scopes = request
            .and_then(|r| r.scopes.as_ref())
            .filter(|s| !s.is_empty())
            .map(|s| s.join(", "))
            .unwrap_or_else(|| "sin scopes".to_string());
        let state = request
            .and_then(|r| r.state.as_deref())
            .unwrap_or("unknown");
        let user_label = user.unwrap_or("desconocido");

        let narrative = match action {
            "created" => format!(
                "El usuario {} solicitó un token de acceso personal (PAT) para la organización {} con scopes: {}. Estado: {}",
                user_label, org, scopes, state
            ),
            "approved" => format!(
                "La solicitud de PAT para {} en {} fue APROBADA. Scopes: {}",
                user_label, org, scopes
            ),
            "denied" => format!(
                "La solicitud de PAT para {} en {} fue RECHAZADA.",
                user_label, org
            ),
            _ => String::new(),
        };

        Alert::new(
            "personal_access_token_request",
            Category::Notify,
            format!("Evento PAT detectado: {}", action),
            narrative,
        )
        .with_actor(user)
    }
}

#[async_trait]
impl Evaluator for TokenEvaluator {
    fn name(&self) -> &'static str {
        "token"
    }

    async fn run(&self, check: Check, event: &WebhookEvent) -> Result<Option<Alert>> {
        match (check, event) {
            (Check::PersonalAccessTokenRequests, WebhookEvent::PersonalAccessTokenRequest(p)) => {
                Ok(Some(self.monitor_personal_access_token_requests(p)))
            }
            _ => Err(mismatch(self.name(), check, event)),
        }
    }
}
