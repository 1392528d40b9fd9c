// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook ingress and health handlers.

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Serialize;

use momopay_core::{HealthStatus, MomopayError};
use momopay_pipeline::InboundSmsPayload;

use crate::error::ApiError;
use crate::server::GatewayState;

/// Response body for POST /sms/webhook.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub sms_id: String,
    /// True when this delivery was already stored.
    pub duplicate: bool,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub storage: String,
    pub parser: String,
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// POST /sms/webhook
///
/// Acknowledges with 202 once the SMS is durable. Parsing and matching
/// happen after the response. A storage failure answers 503 so the relay
/// redelivers.
pub async fn post_webhook(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(mut payload): Json<InboundSmsPayload>,
) -> Response {
    // Transport headers win; body fields are a fallback for older relays.
    if let Some(modem_id) = header(&headers, "x-modem-id") {
        payload.modem_id = Some(modem_id);
    }
    if let Some(sim_slot) = header(&headers, "x-sim-slot") {
        payload.sim_slot = Some(sim_slot);
    }

    match state.services.ingress.accept(payload, Utc::now()).await {
        Ok(inserted) => (
            StatusCode::ACCEPTED,
            Json(WebhookResponse {
                sms_id: inserted.sms_id,
                duplicate: !inserted.created,
            }),
        )
            .into_response(),
        Err(err @ MomopayError::Validation(_)) => ApiError(err).into_response(),
        Err(err) => {
            tracing::error!(error = %err, "webhook could not persist sms");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(crate::error::ErrorResponse {
                    error: err.code(),
                    message: "sms not stored; retry delivery".to_string(),
                }),
            )
                .into_response()
        }
    }
}

fn describe(status: &Result<HealthStatus, MomopayError>) -> (u8, String) {
    match status {
        Ok(HealthStatus::Healthy) => (0, "healthy".to_string()),
        Ok(HealthStatus::Degraded(reason)) => (1, format!("degraded: {reason}")),
        Ok(HealthStatus::Unhealthy(reason)) => (2, format!("unhealthy: {reason}")),
        Err(e) => (2, format!("unhealthy: {e}")),
    }
}

/// GET /health
///
/// Unauthenticated. 503 when storage is unusable.
pub async fn get_health(State(state): State<GatewayState>) -> Response {
    let (storage_level, storage) = describe(&state.services.storage.health_check().await);
    let (parser_level, parser) = describe(&state.services.parser.health_check().await);

    let (code, status) = match storage_level.max(parser_level.min(1)) {
        0 => (StatusCode::OK, "ok"),
        1 => (StatusCode::OK, "degraded"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };
    let body = HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
        storage,
        parser,
    };
    (code, Json(body)).into_response()
}
