// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator endpoints under `/admin`.
//!
//! The acting operator is taken from `X-Operator-Id` and recorded in the
//! audit log for every state-changing call.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use chrono::Utc;
use serde::Deserialize;

use momopay_core::types::{
    DismissResolution, InboundSms, IntentStatus, ParserPrompt, PaymentIntent, RetryJob,
};
use momopay_pipeline::{
    CreateIntentRequest, InboundItem, PromptTestResult, QueueStatus, ReviewItem,
};

use crate::error::ApiError;
use crate::server::GatewayState;

/// Recorded when a caller does not identify itself.
const ANONYMOUS_OPERATOR: &str = "admin";

type ApiResult<T> = Result<Json<T>, ApiError>;

fn operator_id(headers: &HeaderMap) -> String {
    headers
        .get("x-operator-id")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(ANONYMOUS_OPERATOR)
        .to_string()
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachRequest {
    pub sms_id: String,
    #[serde(alias = "intentId")]
    pub payment_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DismissRequest {
    pub resolution: DismissResolution,
    #[serde(default)]
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePromptRequest {
    pub label: String,
    pub body: String,
    #[serde(default)]
    pub version: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTestRequest {
    pub text: String,
    #[serde(default)]
    pub prompt_id: Option<String>,
    #[serde(default)]
    pub prompt_body: Option<String>,
}

// --- SMS review ---

/// GET /admin/sms/queue
pub async fn get_queue(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<QueueStatus> {
    Ok(Json(state.services.review.queue_status(query.limit).await?))
}

/// GET /admin/sms/manual
pub async fn get_manual(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<ReviewItem>> {
    Ok(Json(state.services.review.list(query.limit, Utc::now()).await?))
}

/// GET /admin/sms/inbound
pub async fn get_inbound(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<InboundItem>> {
    Ok(Json(state.services.review.inbound(query.limit).await?))
}

/// POST /admin/sms/manual/attach
pub async fn post_attach(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<AttachRequest>,
) -> ApiResult<PaymentIntent> {
    let intent = state
        .services
        .review
        .attach(&body.sms_id, &body.payment_id, &operator_id(&headers), Utc::now())
        .await?;
    Ok(Json(intent))
}

/// POST /admin/sms/manual/{sms_id}/retry
pub async fn post_retry(
    State(state): State<GatewayState>,
    Path(sms_id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<RetryJob> {
    let job = state
        .services
        .review
        .retry(&sms_id, &operator_id(&headers), Utc::now())
        .await?;
    Ok(Json(job))
}

/// POST /admin/sms/manual/{sms_id}/dismiss
pub async fn post_dismiss(
    State(state): State<GatewayState>,
    Path(sms_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DismissRequest>,
) -> ApiResult<InboundSms> {
    let sms = state
        .services
        .review
        .dismiss(
            &sms_id,
            body.resolution,
            body.note.as_deref(),
            &operator_id(&headers),
            Utc::now(),
        )
        .await?;
    Ok(Json(sms))
}

// --- Parser prompts ---

/// GET /admin/sms/parser/prompts
pub async fn get_prompts(State(state): State<GatewayState>) -> ApiResult<Vec<ParserPrompt>> {
    Ok(Json(state.services.prompts.list().await?))
}

/// POST /admin/sms/parser/prompts
pub async fn post_prompt(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(body): Json<CreatePromptRequest>,
) -> ApiResult<ParserPrompt> {
    let prompt = state
        .services
        .prompts
        .create(&body.label, &body.body, body.version, &operator_id(&headers), Utc::now())
        .await?;
    Ok(Json(prompt))
}

/// GET /admin/sms/parser/prompts/active
pub async fn get_active_prompt(
    State(state): State<GatewayState>,
) -> ApiResult<Option<ParserPrompt>> {
    Ok(Json(state.services.prompts.active().await?))
}

/// POST /admin/sms/parser/prompts/{id}/activate
pub async fn post_activate_prompt(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<ParserPrompt> {
    let prompt = state
        .services
        .prompts
        .activate(&id, &operator_id(&headers), Utc::now())
        .await?;
    Ok(Json(prompt))
}

/// POST /admin/sms/parser/test
pub async fn post_prompt_test(
    State(state): State<GatewayState>,
    Json(body): Json<PromptTestRequest>,
) -> ApiResult<PromptTestResult> {
    let result = state
        .services
        .prompts
        .test(&body.text, body.prompt_id.as_deref(), body.prompt_body.as_deref())
        .await?;
    Ok(Json(result))
}

// --- Payment intents ---

/// GET /admin/payments/manual
pub async fn get_manual_intents(
    State(state): State<GatewayState>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Vec<PaymentIntent>> {
    let intents = state
        .services
        .intents
        .list_by_status(IntentStatus::ManualReview, query.limit)
        .await?;
    Ok(Json(intents))
}

/// POST /admin/payments/intents
pub async fn post_intent(
    State(state): State<GatewayState>,
    Json(body): Json<CreateIntentRequest>,
) -> ApiResult<PaymentIntent> {
    Ok(Json(state.services.intents.create(body, Utc::now()).await?))
}

/// POST /admin/payments/intents/{id}/fail
pub async fn post_fail_intent(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
) -> ApiResult<PaymentIntent> {
    Ok(Json(state.services.intents.fail(&id, Utc::now()).await?))
}

/// POST /admin/payments/intents/{id}/dismiss
pub async fn post_dismiss_intent(
    State(state): State<GatewayState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> ApiResult<PaymentIntent> {
    let intent = state
        .services
        .intents
        .dismiss(&id, &operator_id(&headers), Utc::now())
        .await?;
    Ok(Json(intent))
}
