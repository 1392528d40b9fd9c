// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::time::Duration;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use momopay_config::model::ServerConfig;
use momopay_core::MomopayError;
use momopay_pipeline::Services;

use crate::admin;
use crate::auth::{AuthConfig, auth_middleware};
use crate::handlers;

/// Health state for the unauthenticated health endpoint.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub services: Services,
    /// Guards `/sms/webhook`.
    pub webhook_auth: AuthConfig,
    /// Guards `/admin/*`.
    pub admin_auth: AuthConfig,
    pub health: HealthState,
}

impl GatewayState {
    pub fn new(services: Services, config: &ServerConfig) -> Self {
        Self {
            services,
            webhook_auth: AuthConfig::new("webhook", config.webhook_token.clone()),
            admin_auth: AuthConfig::new("admin", config.admin_token.clone()),
            health: HealthState {
                start_time: std::time::Instant::now(),
            },
        }
    }
}

/// Builds the full route table.
///
/// - GET /health (public)
/// - POST /sms/webhook (webhook token)
/// - /admin/sms/... and /admin/payments/... (admin token)
pub fn router(state: GatewayState, request_timeout: Duration) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let webhook_routes = Router::new()
        .route("/sms/webhook", post(handlers::post_webhook))
        .route_layer(axum_middleware::from_fn_with_state(
            state.webhook_auth.clone(),
            auth_middleware,
        ))
        .with_state(state.clone());

    let admin_routes = Router::new()
        .route("/admin/sms/queue", get(admin::get_queue))
        .route("/admin/sms/inbound", get(admin::get_inbound))
        .route("/admin/sms/manual", get(admin::get_manual))
        .route("/admin/sms/manual/attach", post(admin::post_attach))
        .route("/admin/sms/manual/{sms_id}/retry", post(admin::post_retry))
        .route("/admin/sms/manual/{sms_id}/dismiss", post(admin::post_dismiss))
        .route(
            "/admin/sms/parser/prompts",
            get(admin::get_prompts).post(admin::post_prompt),
        )
        .route("/admin/sms/parser/prompts/active", get(admin::get_active_prompt))
        .route(
            "/admin/sms/parser/prompts/{id}/activate",
            post(admin::post_activate_prompt),
        )
        .route("/admin/sms/parser/test", post(admin::post_prompt_test))
        .route("/admin/payments/manual", get(admin::get_manual_intents))
        .route("/admin/payments/intents", post(admin::post_intent))
        .route("/admin/payments/intents/{id}/fail", post(admin::post_fail_intent))
        .route(
            "/admin/payments/intents/{id}/dismiss",
            post(admin::post_dismiss_intent),
        )
        .route_layer(axum_middleware::from_fn_with_state(
            state.admin_auth.clone(),
            auth_middleware,
        ))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(webhook_routes)
        .merge(admin_routes)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
}

/// Serves the gateway until `cancel` fires, then drains in-flight requests.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), MomopayError> {
    let app = router(state, config.request_timeout());

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MomopayError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| MomopayError::Internal(format!("gateway server error: {e}")))?;

    tracing::info!("gateway stopped");
    Ok(())
}
