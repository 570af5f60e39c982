//! Service status and the organization roles report

use axum::{
    Json,
    extract::Query,
    extract::State as AxumState,
    response::IntoResponse,
};
use serde_json::{Value, json};
use std::collections::HashMap;
use tracing::info;

use crate::SharedState;
use crate::api::{ApiError, success};
use crate::evaluators::Check;
use crate::report::build_roles_report;

/// Root endpoint
/// Supports ?format=json for detailed JSON response
pub async fn root(
    AxumState(state): AxumState<SharedState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    if params.get("format").map(|s| s.as_str()) == Some("json") {
        Json(status_body(&state)).into_response()
    } else {
        "github_alert_hooks - healthy".into_response()
    }
}

pub async fn health(AxumState(state): AxumState<SharedState>) -> Json<Value> {
    Json(status_body(&state))
}

fn status_body(state: &SharedState) -> Value {
    json!({
        "name": "github_alert_hooks",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "healthy",
        "owner": state.config.github.owner,
        "started_at": state.started_at.to_rfc3339(),
        "uptime_seconds": state.start_time.elapsed().as_secs(),
        "checks": Check::ALL.iter().map(Check::slug).collect::<Vec<_>>(),
        "notifier": state.config.teams_webhook_url().map_or("log", |_| "teams"),
    })
}

/// Approvers on `main` across the organization plus every member's role.
pub async fn get_roles(AxumState(state): AxumState<SharedState>) -> Result<Json<Value>, ApiError> {
    let users = build_roles_report(state.github.as_ref()).await?;
    info!("Serving roles report with {} entries", users.len());
    Ok(success(json!({
        "message": "Roles y usuarios obtenidos correctamente",
        "users": users,
    })))
}
