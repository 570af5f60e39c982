//! Delivery intake for the generic route and the per-check routes

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State as AxumState},
    http::HeaderMap,
};
use serde_json::{Value, json};
use tracing::{debug, info};
use uuid::Uuid;

use crate::SharedState;
use crate::api::{ApiError, HEADER_DELIVERY, HEADER_EVENT, success};
use crate::error::AlertError;
use crate::evaluators::Check;
use crate::webhook::{EventKind, WebhookEvent};

const RECEIVED: &str = "Webhook recibido";

fn header<'a>(headers: &'a HeaderMap, name: &'static str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn delivery_id(headers: &HeaderMap) -> String {
    header(headers, HEADER_DELIVERY)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::now_v7().to_string())
}

fn event_kind(headers: &HeaderMap) -> Result<EventKind, ApiError> {
    let event_type = header(headers, HEADER_EVENT).ok_or(ApiError::MissingHeader(HEADER_EVENT))?;
    Ok(event_type.parse()?)
}

/// Acknowledges immediately and runs the default checks for the event in the
/// background.
pub async fn handle_webhook(
    AxumState(state): AxumState<SharedState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let kind = event_kind(&headers)?;
    let evaluator = state.pipeline.registry().resolve(kind);
    let event = WebhookEvent::from_slice(kind, &body)?;
    let delivery = delivery_id(&headers);

    let checks = state.pipeline.checks_for(kind);
    let slugs: Vec<&str> = checks.iter().map(Check::slug).collect();
    info!(
        delivery = %delivery,
        event = %kind,
        evaluator = evaluator.name(),
        repository = event.repository_name().unwrap_or("-"),
        "Delivery accepted"
    );

    state.pipeline.spawn(delivery.clone(), event, checks);

    Ok(success(json!({
        "message": RECEIVED,
        "event": kind.as_str(),
        "delivery": delivery,
        "checks": slugs,
    })))
}

/// Runs one named check. Checks that stay local are answered with their
/// result; checks that call GitHub are deferred like the generic route.
pub async fn handle_check(
    AxumState(state): AxumState<SharedState>,
    Path(slug): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let check: Check = slug.parse().map_err(|_| ApiError::UnknownCheck(slug.clone()))?;
    let kind = event_kind(&headers)?;
    if kind != check.event_kind() {
        return Err(AlertError::UnsupportedEvent(format!(
            "{} only accepts '{}' events, received '{}'",
            check,
            check.event_kind(),
            kind
        ))
        .into());
    }

    let event = WebhookEvent::from_slice(kind, &body)?;
    let delivery = delivery_id(&headers);

    if check.needs_github() {
        debug!(delivery = %delivery, check = %check, "Deferring check");
        state.pipeline.spawn(delivery.clone(), event, vec![check]);
        return Ok(success(json!({
            "message": RECEIVED,
            "event": kind.as_str(),
            "delivery": delivery,
            "checks": [check.slug()],
        })));
    }

    let alert = state.pipeline.evaluate(check, &event).await?;
    match &alert {
        Some(alert) => {
            info!(
                delivery = %delivery,
                check = %check,
                category = alert.category.as_str(),
                "Check raised an alert"
            );
            state.pipeline.spawn_delivery(alert.clone());
        }
        None => debug!(delivery = %delivery, check = %check, "No alert"),
    }

    Ok(success(json!({
        "event": kind.as_str(),
        "delivery": delivery,
        "alert": alert,
    })))
}
