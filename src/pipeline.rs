//! Classify -> evaluate -> emit for a single delivery

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alert::Alert;
use crate::error::Result;
use crate::evaluators::Check;
use crate::notify::Notifier;
use crate::registry::Registry;
use crate::webhook::{EventKind, WebhookEvent};

pub struct Pipeline {
    registry: Registry,
    notifier: Arc<dyn Notifier>,
    generate_pull_requests: bool,
}

impl Pipeline {
    pub fn new(
        registry: Registry,
        notifier: Arc<dyn Notifier>,
        generate_pull_requests: bool,
    ) -> Self {
        Self {
            registry,
            notifier,
            generate_pull_requests,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Checks run on the generic webhook route for `kind`.
    pub fn checks_for(&self, kind: EventKind) -> Vec<Check> {
        Check::defaults_for(kind)
            .iter()
            .copied()
            .filter(|check| self.generate_pull_requests || *check != Check::GeneratePullRequest)
            .collect()
    }

    pub async fn evaluate(&self, check: Check, event: &WebhookEvent) -> Result<Option<Alert>> {
        let evaluator = self.registry.resolve(event.kind());
        evaluator.run(check, event).await
    }

    /// Runs every check, delivering each alert. A failing check is logged and
    /// does not stop the remaining ones.
    pub async fn process(
        &self,
        delivery: &str,
        event: &WebhookEvent,
        checks: &[Check],
    ) -> Vec<Alert> {
        let mut alerts = Vec::new();
        for &check in checks {
            match self.evaluate(check, event).await {
                Ok(Some(alert)) => {
                    info!(
                        delivery,
                        check = %check,
                        category = alert.category.as_str(),
                        "Check raised an alert"
                    );
                    self.notifier.deliver(&alert).await;
                    alerts.push(alert);
                }
                Ok(None) => debug!(delivery, check = %check, "No alert"),
                Err(e) => error!(delivery, check = %check, error = %e, "Check failed"),
            }
        }
        if alerts.is_empty() {
            debug!(delivery, event = %event.kind(), "Delivery produced no alerts");
        }
        alerts
    }

    /// Evaluates in the background; the caller does not wait for the result.
    pub fn spawn(
        self: &Arc<Self>,
        delivery: String,
        event: WebhookEvent,
        checks: Vec<Check>,
    ) -> JoinHandle<()> {
        let pipeline = Arc::clone(self);
        tokio::spawn(async move {
            let alerts = pipeline.process(&delivery, &event, &checks).await;
            info!(
                delivery = %delivery,
                event = %event.kind(),
                alerts = alerts.len(),
                "Delivery evaluated"
            );
        })
    }

    /// Hands an already evaluated alert to the notifier in the background.
    pub fn spawn_delivery(&self, alert: Alert) -> JoinHandle<()> {
        let notifier = Arc::clone(&self.notifier);
        tokio::spawn(async move {
            if alert.alert.is_empty() {
                warn!(event = %alert.event, "Delivering alert with empty narrative");
            }
            notifier.deliver(&alert).await;
        })
    }
}
