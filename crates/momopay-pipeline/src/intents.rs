// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment intents as the upstream flows create and close them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use momopay_core::types::{AuditEntry, IntentKind, IntentStatus, NewPaymentIntent, PaymentIntent};
use momopay_core::{MomopayError, StorageAdapter};

use crate::review::clamp_limit;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateIntentRequest {
    #[serde(alias = "expectedAmount")]
    pub expected_amount_minor: i64,
    #[serde(default)]
    pub currency: Option<String>,
    pub kind: IntentKind,
    pub owner_reference: String,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

pub struct IntentService {
    storage: Arc<dyn StorageAdapter>,
    home_currency: String,
}

impl IntentService {
    pub fn new(storage: Arc<dyn StorageAdapter>, home_currency: impl Into<String>) -> Self {
        Self {
            storage,
            home_currency: home_currency.into(),
        }
    }

    pub async fn create(
        &self,
        request: CreateIntentRequest,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError> {
        if request.expected_amount_minor <= 0 {
            return Err(MomopayError::Validation(
                "expectedAmountMinor must be positive".into(),
            ));
        }
        if request.owner_reference.trim().is_empty() {
            return Err(MomopayError::Validation(
                "ownerReference must not be empty".into(),
            ));
        }
        if request.expires_at.is_some_and(|at| at <= now) {
            return Err(MomopayError::Validation("expiresAt is in the past".into()));
        }
        let currency = request
            .currency
            .unwrap_or_else(|| self.home_currency.clone())
            .to_ascii_uppercase();

        let intent = self
            .storage
            .insert_payment_intent(
                &NewPaymentIntent {
                    expected_amount_minor: request.expected_amount_minor,
                    currency,
                    kind: request.kind,
                    owner_reference: request.owner_reference.trim().to_string(),
                    expires_at: request.expires_at,
                },
                now,
            )
            .await?;
        info!(
            intent_id = %intent.id,
            kind = %intent.kind,
            amount_minor = intent.expected_amount_minor,
            "payment intent created"
        );
        Ok(intent)
    }

    pub async fn get(&self, id: &str) -> Result<PaymentIntent, MomopayError> {
        self.storage
            .get_payment_intent(id)
            .await?
            .ok_or_else(|| not_found(id))
    }

    /// Upstream gives up on a pending intent (checkout abandoned, timed out).
    pub async fn fail(&self, id: &str, now: DateTime<Utc>) -> Result<PaymentIntent, MomopayError> {
        self.guarded(id, &[IntentStatus::Pending], IntentStatus::Failed, now)
            .await
    }

    /// Operator closes a flagged intent without attaching an SMS.
    pub async fn dismiss(
        &self,
        id: &str,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError> {
        let intent = self
            .guarded(id, &[IntentStatus::ManualReview], IntentStatus::Dismissed, now)
            .await?;
        self.storage
            .record_audit(
                &AuditEntry {
                    action: "intent.dismiss".into(),
                    entity_type: "payment_intent".into(),
                    entity_id: id.to_string(),
                    actor_id: operator_id.to_string(),
                    before: Some(json!({ "status": IntentStatus::ManualReview })),
                    after: Some(json!({ "status": IntentStatus::Dismissed })),
                },
                now,
            )
            .await?;
        Ok(intent)
    }

    pub async fn list_by_status(
        &self,
        status: IntentStatus,
        limit: Option<u32>,
    ) -> Result<Vec<PaymentIntent>, MomopayError> {
        self.storage
            .list_intents_by_status(status, clamp_limit(limit))
            .await
    }

    async fn guarded(
        &self,
        id: &str,
        from: &[IntentStatus],
        to: IntentStatus,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError> {
        let changed = self
            .storage
            .conditional_transition_intent(id, from, to, None, now)
            .await?;
        let intent = self.get(id).await?;
        if !changed {
            return Err(MomopayError::IntentNotPending {
                intent_id: id.to_string(),
                status: intent.status.to_string(),
            });
        }
        Ok(intent)
    }
}

fn not_found(id: &str) -> MomopayError {
    MomopayError::NotFound {
        entity: "payment_intent",
        id: id.to_string(),
    }
}
