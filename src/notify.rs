//! Alert delivery to the chat channel
//!
//! Delivery is best-effort: [`Notifier::deliver`] never returns an error, failures
//! are logged and dropped.

use async_trait::async_trait;
use chrono::{DateTime, Local};
use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::alert::Alert;
use crate::error::{AlertError, Result};

const GITHUB_LOGO: &str = "https://github.githubassets.com/images/modules/logos_page/GitHub-Mark.png";
const ALERT_ICON: &str = "https://raw.githubusercontent.com/microsoft/fluentui-system-icons/main/assets/Alert/SVG/ic_fluent_alert_48_regular.svg";
const WEBHOOK_DOCS: &str = "https://docs.github.com/en/webhooks";
const TEAMS_SERVICE: &str = "Teams webhook";

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, alert: &Alert);
}

/// Posts alerts as Office 365 connector cards to a Teams incoming webhook.
pub struct TeamsNotifier {
    webhook_url: String,
    client: reqwest::Client,
}

impl TeamsNotifier {
    pub fn new(webhook_url: impl Into<String>) -> Self {
        Self {
            webhook_url: webhook_url.into(),
            client: reqwest::Client::new(),
        }
    }

    async fn send(&self, alert: &Alert) -> Result<()> {
        let card = render_card(alert, Local::now());
        let response = self
            .client
            .post(&self.webhook_url)
            .json(&card)
            .send()
            .await
            .map_err(|e| AlertError::Upstream {
                service: TEAMS_SERVICE,
                message: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AlertError::Upstream {
                service: TEAMS_SERVICE,
                message: format!("delivery returned {}", status),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Notifier for TeamsNotifier {
    fn name(&self) -> &'static str {
        "teams"
    }

    async fn deliver(&self, alert: &Alert) {
        match self.send(alert).await {
            Ok(()) => info!(event = %alert.event, "Alert delivered to Teams"),
            Err(e) => error!(event = %alert.event, error = %e, "Failed to deliver alert"),
        }
    }
}

/// Used when no channel is configured: alerts only reach the logs.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) {
        warn!(
            event = %alert.event,
            category = alert.category.as_str(),
            repository = alert.repository.as_deref().unwrap_or("N/A"),
            "{}: {}",
            alert.message,
            alert.alert
        );
    }
}

/// Builds the MessageCard body for an alert.
pub fn render_card(alert: &Alert, now: DateTime<Local>) -> Value {
    let date = now.format("%d/%m/%Y, %H:%M:%S").to_string();

    let mut actions = Vec::new();
    if let Some(url) = &alert.source_url {
        actions.push(json!({
            "@type": "OpenUri",
            "name": "🔗 Ver en GitHub",
            "targets": [{ "os": "default", "uri": url }]
        }));
    }
    actions.push(json!({
        "@type": "OpenUri",
        "name": "📚 Documentación",
        "targets": [{ "os": "default", "uri": WEBHOOK_DOCS }]
    }));

    json!({
        "@type": "MessageCard",
        "@context": "http://schema.org/extensions",
        "summary": format!("Alerta de Webhook: {}", alert.message),
        "themeColor": alert.category.theme_color(),
        "sections": [
            {
                "activityTitle": alert.message,
                "activitySubtitle": date,
                "activityImage": GITHUB_LOGO,
                "markdown": true
            },
            {
                "activityImage": ALERT_ICON,
                "facts": [
                    { "name": "Severidad", "value": alert.category.badge() },
                    { "name": "Tipo de evento", "value": alert.event },
                    { "name": "Repositorio", "value": alert.repository.as_deref().unwrap_or("N/A") },
                    { "name": "Rama", "value": alert.branch.as_deref().unwrap_or("N/A") },
                    { "name": "Actor", "value": alert.actor.as_deref().unwrap_or("N/A") },
                    { "name": "Fecha", "value": date }
                ],
                "text": alert.alert
            }
        ],
        "potentialAction": actions
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::Category;
    use chrono::TimeZone;

    #[test]
    fn card_carries_alert_context() {
        let alert = Alert::new("delete", Category::High, "Rama eliminada", "detalle")
            .with_repository(Some("org/repo"))
            .with_branch(Some("main"));
        let now = Local.with_ymd_and_hms(2024, 3, 1, 10, 30, 0).unwrap();

        let card = render_card(&alert, now);
        assert_eq!(card["themeColor"], "D13438");
        assert_eq!(card["summary"], "Alerta de Webhook: Rama eliminada");
        assert_eq!(card["sections"][0]["activitySubtitle"], "01/03/2024, 10:30:00");

        let facts = card["sections"][1]["facts"].as_array().unwrap();
        assert_eq!(facts[0]["value"], "ALTA");
        assert_eq!(facts[2]["value"], "org/repo");
        assert_eq!(facts[3]["value"], "main");
        assert_eq!(facts[4]["value"], "N/A");
        assert_eq!(card["sections"][1]["text"], "detalle");
    }

    #[test]
    fn source_url_adds_an_open_action() {
        let alert = Alert::new("push", Category::Success, "PR", "creado")
            .with_source_url(Some("https://github.com/org/repo/pull/1"));
        let card = render_card(&alert, Local::now());

        let actions = card["potentialAction"].as_array().unwrap();
        assert_eq!(actions.len(), 2);
        assert_eq!(
            actions[0]["targets"][0]["uri"],
            "https://github.com/org/repo/pull/1"
        );
    }

    #[tokio::test]
    async fn unreachable_channel_is_swallowed() {
        let notifier = TeamsNotifier::new("http://127.0.0.1:9/unreachable");
        let alert = Alert::new("membership", Category::Low, "m", "a");
        notifier.deliver(&alert).await;
        assert!(notifier.send(&alert).await.is_err());
    }

    #[tokio::test]
    async fn connection_failure_names_the_teams_webhook() {
        let notifier = TeamsNotifier::new("http://127.0.0.1:9/unreachable");
        let alert = Alert::new("delete", Category::High, "m", "a");
        match notifier.send(&alert).await {
            Err(AlertError::Upstream { service, .. }) => assert_eq!(service, "Teams webhook"),
            other => panic!("expected an upstream error, got {:?}", other),
        }
    }
}
