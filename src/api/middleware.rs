//! Gatekeeping for webhook routes.
//!
//! Runs outermost first: source address, signature, the `ping` short-circuit,
//! then content type. Only deliveries that pass all four reach a handler.

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, Request, State as AxumState},
    http::header::CONTENT_TYPE,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::net::SocketAddr;
use tracing::{debug, error, info, warn};

use crate::SharedState;
use crate::api::{ApiError, HEADER_EVENT, HEADER_SIGNATURE};
use crate::utils::verify_github_signature;

/// GitHub caps webhook payloads at 25 MB.
pub const MAX_BODY_BYTES: usize = 25 * 1024 * 1024;

const PING_EVENT: &str = "ping";

/// Rejects deliveries whose peer address is outside the allow-list.
pub async fn allow_github_sources(
    AxumState(state): AxumState<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip());

    match peer {
        Some(ip) if state.allow_list.is_allowed(ip) => Ok(next.run(request).await),
        Some(ip) => {
            warn!("Rejected delivery from disallowed address {}", ip);
            Err(ApiError::ForbiddenSource(ip.to_string()))
        }
        None => {
            error!("Peer address unavailable; is the server using connect info?");
            Err(ApiError::ForbiddenSource("unknown".to_string()))
        }
    }
}

/// Buffers the body once to verify `X-Hub-Signature-256`, then hands a
/// rebuilt request downstream.
pub async fn verify_delivery(
    AxumState(state): AxumState<SharedState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| ApiError::InvalidBody(e.to_string()))?;

    let signature = parts
        .headers
        .get(HEADER_SIGNATURE)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::MissingHeader(HEADER_SIGNATURE))?;
    if !verify_github_signature(&state.webhook_secret, &bytes, signature) {
        error!("Signature verification failed for {}", parts.uri.path());
        return Err(ApiError::InvalidSignature);
    }

    let event = parts.headers.get(HEADER_EVENT).and_then(|v| v.to_str().ok());
    if event == Some(PING_EVENT) {
        let zen = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| v.get("zen").cloned());
        info!("Answered ping from GitHub");
        return Ok(Json(json!({ "message": "pong", "zen": zen })).into_response());
    }

    let content_type = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if !content_type.starts_with("application/json") {
        warn!("Unsupported content type '{}'", content_type);
        return Err(ApiError::InvalidContentType(content_type.to_string()));
    }

    debug!("Delivery verified ({} bytes)", bytes.len());
    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}
