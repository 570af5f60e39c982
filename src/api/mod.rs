//! HTTP surface: webhook intake, health and the roles report

pub mod handlers;
pub mod middleware;
pub mod webhook;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::SharedState;
use crate::error::AlertError;

pub use handlers::{get_roles, health, root};
pub use middleware::{MAX_BODY_BYTES, allow_github_sources, verify_delivery};
pub use webhook::{handle_check, handle_webhook};

/// Header name for GitHub event type.
pub const HEADER_EVENT: &str = "x-github-event";
/// Header name for GitHub delivery ID.
pub const HEADER_DELIVERY: &str = "x-github-delivery";
/// Header name for GitHub signature.
pub const HEADER_SIGNATURE: &str = "x-hub-signature-256";

/// Errors surfaced to the webhook sender before the delivery is acknowledged.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("source address {0} is not allowed")]
    ForbiddenSource(String),

    #[error("content type must be 'application/json', received '{0}'")]
    InvalidContentType(String),

    #[error("could not read request body: {0}")]
    InvalidBody(String),

    #[error("no check named '{0}'")]
    UnknownCheck(String),

    #[error(transparent)]
    Alert(#[from] AlertError),
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::MissingHeader(HEADER_SIGNATURE) | ApiError::InvalidSignature => {
                (StatusCode::UNAUTHORIZED, "INVALID_SIGNATURE")
            }
            ApiError::MissingHeader(_) => (StatusCode::BAD_REQUEST, "MISSING_HEADER"),
            ApiError::ForbiddenSource(_) => (StatusCode::UNAUTHORIZED, "FORBIDDEN_SOURCE"),
            ApiError::InvalidContentType(_) => (StatusCode::BAD_REQUEST, "INVALID_CONTENT_TYPE"),
            ApiError::InvalidBody(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::UnknownCheck(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            ApiError::Alert(e) => {
                let status = match e {
                    AlertError::UnsupportedEvent(_) => StatusCode::BAD_REQUEST,
                    AlertError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                    AlertError::Upstream { .. } => StatusCode::BAD_GATEWAY,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (status, e.code())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        (
            status,
            Json(json!({
                "success": false,
                "error": { "code": code, "message": self.to_string() }
            })),
        )
            .into_response()
    }
}

/// Wraps `data` in the success envelope.
pub fn success<T: Serialize>(data: T) -> Json<Value> {
    Json(json!({ "success": true, "data": data }))
}

pub fn build_router(state: SharedState) -> Router {
    let webhooks = Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/webhooks/{check}", post(handle_check))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn_with_state(state.clone(), verify_delivery))
        .layer(from_fn_with_state(state.clone(), allow_github_sources));

    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/api/roles", get(get_roles))
        .merge(webhooks)
        .with_state(state)
}
