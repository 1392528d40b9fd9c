// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Route-level tests driving the full router over a temp database.

use std::time::Duration;

use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode};
use serde_json::{Value, json};
use tower::ServiceExt;

use momopay_core::types::{IntentStatus, SmsStatus};
use momopay_gateway::{GatewayState, router};
use momopay_pipeline::ProcessOutcome;
use momopay_test_utils::TestHarness;

const WEBHOOK: &str = "Bearer test-webhook-token";
const ADMIN: &str = "Bearer test-admin-token";
const PAYMENT: &str =
    "You have received 15000 RWF from 0781234556. TxId: ABC123. Balance 40000 RWF";

fn app(harness: &TestHarness) -> Router {
    let state = GatewayState::new(harness.services.clone(), &harness.config.server);
    router(state, Duration::from_secs(5))
}

async fn call(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-operator-id", "ops-1");
    if let Some(token) = token {
        builder = builder.header("authorization", token);
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn harness() -> TestHarness {
    TestHarness::builder().build().await.unwrap()
}

#[tokio::test]
async fn webhook_accepts_and_deduplicates() {
    let h = harness().await;
    let app = app(&h);
    let body = json!({
        "text": PAYMENT,
        "from": "0781234556",
        "receivedAt": "2026-03-01T08:30:00Z"
    });

    let (status, first) = call(&app, "POST", "/sms/webhook", Some(WEBHOOK), Some(body.clone())).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(first["duplicate"], false);

    let (status, second) = call(&app, "POST", "/sms/webhook", Some(WEBHOOK), Some(body)).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["smsId"], first["smsId"]);

    // Only the first delivery is queued for processing.
    assert_eq!(h.drain().await.unwrap().len(), 1);
}

#[tokio::test]
async fn webhook_transport_headers_override_body_fields() {
    let h = harness().await;
    let body = json!({
        "text": PAYMENT,
        "modemId": "body-modem",
        "simSlot": "2"
    });
    let request = Request::builder()
        .method("POST")
        .uri("/sms/webhook")
        .header("authorization", WEBHOOK)
        .header("content-type", "application/json")
        .header("x-modem-id", "modem-7")
        .header("x-sim-slot", "1")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app(&h).oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let accepted: Value = serde_json::from_slice(&bytes).unwrap();

    let sms_id = accepted["smsId"].as_str().unwrap();
    let stored = h.services.storage.get_inbound_sms(sms_id).await.unwrap().unwrap();
    assert_eq!(stored.modem_id.as_deref(), Some("modem-7"));
    assert_eq!(stored.sim_slot.as_deref(), Some("1"));

    // Without headers the body values are kept.
    let fallback = json!({ "text": "Received 500 RWF. TxId: Z9", "modemId": "body-modem" });
    let (_, accepted) = call(&app(&h), "POST", "/sms/webhook", Some(WEBHOOK), Some(fallback)).await;
    let stored = h
        .services
        .storage
        .get_inbound_sms(accepted["smsId"].as_str().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.modem_id.as_deref(), Some("body-modem"));
}

#[tokio::test]
async fn webhook_rejects_missing_or_wrong_token() {
    let h = harness().await;
    let app = app(&h);
    let body = json!({ "text": PAYMENT });

    let (status, _) = call(&app, "POST", "/sms/webhook", None, Some(body.clone())).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, "POST", "/sms/webhook", Some(ADMIN), Some(body)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn webhook_rejects_empty_text() {
    let h = harness().await;
    let (status, body) = call(
        &app(&h),
        "POST",
        "/sms/webhook",
        Some(WEBHOOK),
        Some(json!({ "text": "   " })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn surface_without_token_fails_closed() {
    let h = TestHarness::builder()
        .with_tokens(Some("test-webhook-token"), None)
        .build()
        .await
        .unwrap();
    let (status, _) = call(&app(&h), "GET", "/admin/sms/queue", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_routes_require_admin_token() {
    let h = harness().await;
    let app = app(&h);
    let (status, _) = call(&app, "GET", "/admin/sms/manual", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = call(&app, "GET", "/admin/sms/manual", Some(WEBHOOK), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, body) = call(&app, "GET", "/admin/sms/manual", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn health_is_public() {
    let h = harness().await;
    let (status, body) = call(&app(&h), "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["storage"], "healthy");
    assert!(body["uptimeSecs"].is_u64());
}

/// Two equal candidates leave the SMS for an operator.
async fn ambiguous_sms(h: &TestHarness) -> (String, String, String) {
    let a = h.intent(15_000, "order-1").await.unwrap();
    let b = h.intent(15_000, "order-2").await.unwrap();
    let sms_id = h.deliver(PAYMENT, "0781234556").await.unwrap();
    let outcomes = h.drain().await.unwrap();
    assert!(matches!(outcomes[0].1, ProcessOutcome::ManualReview { .. }));
    (sms_id, a.id, b.id)
}

#[tokio::test]
async fn manual_attach_confirms_and_then_conflicts() {
    let h = harness().await;
    let app = app(&h);
    let (sms_id, intent_a, intent_b) = ambiguous_sms(&h).await;

    let (status, manual) = call(&app, "GET", "/admin/sms/manual", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(manual[0]["sms"]["id"], sms_id.as_str());
    assert_eq!(manual[0]["candidates"].as_array().unwrap().len(), 2);

    let (status, intent) = call(
        &app,
        "POST",
        "/admin/sms/manual/attach",
        Some(ADMIN),
        Some(json!({ "smsId": sms_id, "paymentId": intent_a })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["status"], "confirmed");
    assert_eq!(intent["confirmedSmsId"], sms_id.as_str());

    let (status, body) = call(
        &app,
        "POST",
        "/admin/sms/manual/attach",
        Some(ADMIN),
        Some(json!({ "smsId": sms_id, "paymentId": intent_b })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "already_resolved");

    let audit = h.services.storage.list_audit("inbound_sms", &sms_id).await.unwrap();
    assert!(audit.iter().any(|r| r.entry.action == "sms.manual_attach" && r.entry.actor_id == "ops-1"));
}

#[tokio::test]
async fn attach_unknown_ids_is_not_found() {
    let h = harness().await;
    let app = app(&h);
    let (sms_id, _, _) = ambiguous_sms(&h).await;

    let (status, body) = call(
        &app,
        "POST",
        "/admin/sms/manual/attach",
        Some(ADMIN),
        Some(json!({ "smsId": "missing", "paymentId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, _) = call(
        &app,
        "POST",
        "/admin/sms/manual/attach",
        Some(ADMIN),
        Some(json!({ "smsId": sms_id, "intentId": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn dismiss_records_resolution() {
    let h = harness().await;
    let app = app(&h);
    let (sms_id, _, _) = ambiguous_sms(&h).await;

    let (status, sms) = call(
        &app,
        "POST",
        &format!("/admin/sms/manual/{sms_id}/dismiss"),
        Some(ADMIN),
        Some(json!({ "resolution": "duplicate", "note": "seen twice" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(sms["status"], "dismissed");
    assert_eq!(sms["resolution"], "duplicate");

    let stored = h.services.storage.get_inbound_sms(&sms_id).await.unwrap().unwrap();
    assert_eq!(stored.status, SmsStatus::Dismissed);

    let (status, _) = call(
        &app,
        "POST",
        &format!("/admin/sms/manual/{sms_id}/dismiss"),
        Some(ADMIN),
        Some(json!({ "resolution": "invalid" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn manual_retry_schedules_a_job() {
    let h = harness().await;
    let app = app(&h);
    let (sms_id, _, _) = ambiguous_sms(&h).await;

    let (status, job) = call(
        &app,
        "POST",
        &format!("/admin/sms/manual/{sms_id}/retry"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["smsId"], sms_id.as_str());

    let (status, queue) = call(&app, "GET", "/admin/sms/queue", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(queue["depth"], 1);
}

#[tokio::test]
async fn prompt_lifecycle() {
    let h = harness().await;
    let app = app(&h);

    let (status, active) = call(&app, "GET", "/admin/sms/parser/prompts/active", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(active, Value::Null);

    let (status, prompt) = call(
        &app,
        "POST",
        "/admin/sms/parser/prompts",
        Some(ADMIN),
        Some(json!({ "label": "mtn-v2", "body": "Extract the amount and TxId." })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(prompt["isActive"], false);
    let id = prompt["id"].as_str().unwrap().to_string();

    let (status, activated) = call(
        &app,
        "POST",
        &format!("/admin/sms/parser/prompts/{id}/activate"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(activated["isActive"], true);

    let (_, active) = call(&app, "GET", "/admin/sms/parser/prompts/active", Some(ADMIN), None).await;
    assert_eq!(active["id"], id.as_str());

    let (status, _) = call(
        &app,
        "POST",
        "/admin/sms/parser/prompts/missing/activate",
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn prompt_test_is_a_dry_run() {
    let h = harness().await;
    let (status, result) = call(
        &app(&h),
        "POST",
        "/admin/sms/parser/test",
        Some(ADMIN),
        Some(json!({ "text": PAYMENT })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(result["parsed"]["amountMinor"], 15000);
    assert_eq!(result["parsed"]["reference"], "ABC123");
    assert!(h.services.review.inbound(None).await.unwrap().is_empty());
}

#[tokio::test]
async fn intents_create_fail_and_list() {
    let h = harness().await;
    let app = app(&h);

    let (status, intent) = call(
        &app,
        "POST",
        "/admin/payments/intents",
        Some(ADMIN),
        Some(json!({ "expectedAmountMinor": 5000, "kind": "shop", "ownerReference": "cart-9" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(intent["status"], "pending");
    assert_eq!(intent["currency"], "RWF");
    let id = intent["id"].as_str().unwrap().to_string();

    let (status, failed) = call(
        &app,
        "POST",
        &format!("/admin/payments/intents/{id}/fail"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(failed["status"], "failed");

    let (status, body) = call(
        &app,
        "POST",
        &format!("/admin/payments/intents/{id}/dismiss"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "intent_not_pending");

    let (status, bad) = call(
        &app,
        "POST",
        "/admin/payments/intents",
        Some(ADMIN),
        Some(json!({ "expectedAmountMinor": 0, "kind": "shop", "ownerReference": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(bad["error"], "invalid_request");

    let (status, manual) = call(&app, "GET", "/admin/payments/manual", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(manual, json!([]));

    let stored = h.services.intents.get(&id).await.unwrap();
    assert_eq!(stored.status, IntentStatus::Failed);
}
