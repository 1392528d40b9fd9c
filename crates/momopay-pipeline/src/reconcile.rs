// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Commits a match: automatic confirmations, operator attachments, and
//! dismissals.
//!
//! Every write here is a conditional claim executed by storage. Two SMS
//! racing for one intent cannot both win; the loser is sent to manual review.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, warn};

use momopay_core::types::{
    AuditEntry, ClaimOutcome, DismissResolution, InboundSms, IntentClaim, IntentStatus,
    MatchCandidate, ParsedPayment, PaymentIntent, ReconciliationEvent, SmsStatus,
};
use momopay_core::{MomopayError, StorageAdapter};

use crate::events::EventBus;

/// Reason recorded when an automatic claim loses to a concurrent one.
pub const LOST_RACE_REASON: &str = "intent no longer pending";

/// Intent states an operator may attach an SMS to.
const ATTACHABLE_INTENT: &[IntentStatus] = &[IntentStatus::Pending, IntentStatus::ManualReview];

/// SMS states an operator may dismiss.
const DISMISSABLE_SMS: &[SmsStatus] = &[
    SmsStatus::Received,
    SmsStatus::Error,
    SmsStatus::ManualReview,
];

/// Result of an automatic reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Confirmed { intent_id: String },
    /// The intent was claimed first by something else; the SMS went to review.
    LostRace { intent_id: String },
    /// The SMS had already left a processable state.
    AlreadyResolved { status: Option<SmsStatus> },
}

pub struct ReconciliationEngine {
    storage: Arc<dyn StorageAdapter>,
    events: EventBus,
}

impl ReconciliationEngine {
    pub fn new(storage: Arc<dyn StorageAdapter>, events: EventBus) -> Self {
        Self { storage, events }
    }

    /// Confirms `candidate`'s intent for the parsed SMS.
    pub async fn reconcile(
        &self,
        parsed: &ParsedPayment,
        candidate: &MatchCandidate,
        now: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, MomopayError> {
        let claim = IntentClaim {
            intent_id: candidate.intent_id.clone(),
            sms_id: parsed.sms_id.clone(),
            parsed_payment_id: Some(parsed.id.clone()),
            intent_from: vec![IntentStatus::Pending],
            sms_from: SmsStatus::PROCESSABLE.to_vec(),
            audit: None,
        };

        match self.storage.claim_intent(&claim, now).await? {
            ClaimOutcome::Claimed => {
                info!(
                    sms_id = %parsed.sms_id,
                    intent_id = %candidate.intent_id,
                    score = candidate.score,
                    "auto-matched payment"
                );
                self.events.publish(ReconciliationEvent::Confirmed {
                    sms_id: parsed.sms_id.clone(),
                    intent_id: candidate.intent_id.clone(),
                    amount_minor: Some(parsed.fields.amount_minor),
                    currency: parsed.fields.currency.clone(),
                    operator_id: None,
                });
                Ok(ReconcileOutcome::Confirmed {
                    intent_id: candidate.intent_id.clone(),
                })
            }
            ClaimOutcome::IntentNotClaimable { status } => {
                warn!(
                    sms_id = %parsed.sms_id,
                    intent_id = %candidate.intent_id,
                    intent_status = ?status,
                    "lost claim on intent"
                );
                let moved = self
                    .storage
                    .transition_sms(
                        &parsed.sms_id,
                        SmsStatus::PROCESSABLE,
                        SmsStatus::ManualReview,
                        Some(LOST_RACE_REASON),
                        now,
                    )
                    .await?;
                if moved {
                    self.events.publish(ReconciliationEvent::ManualReview {
                        sms_id: parsed.sms_id.clone(),
                        reason: LOST_RACE_REASON.to_string(),
                    });
                }
                Ok(ReconcileOutcome::LostRace {
                    intent_id: candidate.intent_id.clone(),
                })
            }
            ClaimOutcome::SmsNotClaimable { status } => {
                Ok(ReconcileOutcome::AlreadyResolved { status })
            }
        }
    }

    /// Operator attaches an SMS to an intent, bypassing the matcher.
    ///
    /// Returns the confirmed intent.
    pub async fn manual_attach(
        &self,
        sms_id: &str,
        intent_id: &str,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError> {
        let sms = self.require_sms(sms_id).await?;
        let intent = self
            .storage
            .get_payment_intent(intent_id)
            .await?
            .ok_or_else(|| MomopayError::NotFound {
                entity: "payment_intent",
                id: intent_id.to_string(),
            })?;

        if !SmsStatus::REVIEWABLE.contains(&sms.status) {
            return Err(already_resolved(sms_id, Some(sms.status)));
        }
        if !ATTACHABLE_INTENT.contains(&intent.status) {
            return Err(intent_not_pending(intent_id, Some(intent.status)));
        }

        let parsed = self.storage.latest_parsed_payment(sms_id).await?;
        let audit = AuditEntry {
            action: "sms.manual_attach".to_string(),
            entity_type: "inbound_sms".to_string(),
            entity_id: sms_id.to_string(),
            actor_id: operator_id.to_string(),
            before: Some(json!({
                "smsStatus": sms.status,
                "intentId": intent.id,
                "intentStatus": intent.status,
            })),
            after: Some(json!({
                "smsStatus": SmsStatus::Parsed,
                "intentId": intent.id,
                "intentStatus": IntentStatus::Confirmed,
            })),
        };
        let claim = IntentClaim {
            intent_id: intent_id.to_string(),
            sms_id: sms_id.to_string(),
            parsed_payment_id: parsed.as_ref().map(|p| p.id.clone()),
            intent_from: ATTACHABLE_INTENT.to_vec(),
            sms_from: SmsStatus::REVIEWABLE.to_vec(),
            audit: Some(audit),
        };

        match self.storage.claim_intent(&claim, now).await? {
            ClaimOutcome::Claimed => {}
            ClaimOutcome::IntentNotClaimable { status } => {
                return Err(intent_not_pending(intent_id, status));
            }
            ClaimOutcome::SmsNotClaimable { status } => {
                return Err(already_resolved(sms_id, status));
            }
        }

        info!(
            sms_id,
            intent_id,
            operator_id,
            "operator attached sms to intent"
        );
        self.events.publish(ReconciliationEvent::Confirmed {
            sms_id: sms_id.to_string(),
            intent_id: intent_id.to_string(),
            amount_minor: parsed.as_ref().map(|p| p.fields.amount_minor),
            currency: intent.currency.clone(),
            operator_id: Some(operator_id.to_string()),
        });

        self.storage
            .get_payment_intent(intent_id)
            .await?
            .ok_or_else(|| MomopayError::Internal(format!("intent {intent_id} vanished after claim")))
    }

    /// Operator dismisses an SMS that pays for nothing.
    pub async fn dismiss(
        &self,
        sms_id: &str,
        resolution: DismissResolution,
        note: Option<&str>,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundSms, MomopayError> {
        let sms = self.require_sms(sms_id).await?;
        if !DISMISSABLE_SMS.contains(&sms.status) {
            return Err(already_resolved(sms_id, Some(sms.status)));
        }

        let audit = AuditEntry {
            action: "sms.dismiss".to_string(),
            entity_type: "inbound_sms".to_string(),
            entity_id: sms_id.to_string(),
            actor_id: operator_id.to_string(),
            before: Some(json!({ "status": sms.status })),
            after: Some(json!({
                "status": SmsStatus::Dismissed,
                "resolution": resolution,
                "note": note,
            })),
        };
        let changed = self
            .storage
            .dismiss_sms(sms_id, DISMISSABLE_SMS, resolution, note, &audit, now)
            .await?;
        let current = self.require_sms(sms_id).await?;
        if !changed {
            return Err(already_resolved(sms_id, Some(current.status)));
        }

        info!(sms_id, operator_id, resolution = %resolution, "operator dismissed sms");
        self.events.publish(ReconciliationEvent::Dismissed {
            sms_id: sms_id.to_string(),
            resolution,
        });
        Ok(current)
    }

    async fn require_sms(&self, sms_id: &str) -> Result<InboundSms, MomopayError> {
        self.storage
            .get_inbound_sms(sms_id)
            .await?
            .ok_or_else(|| MomopayError::NotFound {
                entity: "sms",
                id: sms_id.to_string(),
            })
    }
}

fn already_resolved(sms_id: &str, status: Option<SmsStatus>) -> MomopayError {
    MomopayError::AlreadyResolved {
        sms_id: sms_id.to_string(),
        status: status.map_or_else(|| "unknown".to_string(), |s| s.to_string()),
    }
}

fn intent_not_pending(intent_id: &str, status: Option<IntentStatus>) -> MomopayError {
    match status {
        None => MomopayError::NotFound {
            entity: "payment_intent",
            id: intent_id.to_string(),
        },
        Some(s) => MomopayError::IntentNotPending {
            intent_id: intent_id.to_string(),
            status: s.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{harness, parsed_fields, seed_intent, seed_sms};

    fn candidate(intent_id: &str, sms_id: &str) -> MatchCandidate {
        MatchCandidate {
            intent_id: intent_id.into(),
            sms_id: sms_id.into(),
            score: 0.9,
            amount_delta: 0,
            reference_similarity: 0.0,
            within_tolerance_window: true,
        }
    }

    #[tokio::test]
    async fn reconcile_confirms_and_publishes() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let mut rx = h.events.subscribe();
        let now = Utc::now();

        let sms_id = seed_sms(&h, "k1", "received 15000 RWF").await;
        let intent = seed_intent(&h, 15_000).await;
        let parsed = h
            .storage
            .insert_parsed_payment(&sms_id, 1, &parsed_fields(15_000), now)
            .await
            .unwrap();

        let outcome = engine
            .reconcile(&parsed, &candidate(&intent.id, &sms_id), now)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ReconcileOutcome::Confirmed {
                intent_id: intent.id.clone()
            }
        );

        let sms = h.storage.get_inbound_sms(&sms_id).await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::Parsed);
        assert_eq!(sms.intent_id.as_deref(), Some(intent.id.as_str()));
        assert!(matches!(
            rx.recv().await.unwrap(),
            ReconciliationEvent::Confirmed { operator_id: None, .. }
        ));
    }

    #[tokio::test]
    async fn second_sms_for_same_intent_goes_to_review() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let now = Utc::now();
        let intent = seed_intent(&h, 15_000).await;

        let first = seed_sms(&h, "k1", "first").await;
        let second = seed_sms(&h, "k2", "second").await;
        let p1 = h
            .storage
            .insert_parsed_payment(&first, 1, &parsed_fields(15_000), now)
            .await
            .unwrap();
        let p2 = h
            .storage
            .insert_parsed_payment(&second, 1, &parsed_fields(15_000), now)
            .await
            .unwrap();

        let c1 = candidate(&intent.id, &first);
        let c2 = candidate(&intent.id, &second);
        let (a, b) = tokio::join!(
            engine.reconcile(&p1, &c1, now),
            engine.reconcile(&p2, &c2, now),
        );
        let outcomes = [a.unwrap(), b.unwrap()];
        let confirmed = outcomes
            .iter()
            .filter(|o| matches!(o, ReconcileOutcome::Confirmed { .. }))
            .count();
        let lost = outcomes
            .iter()
            .filter(|o| matches!(o, ReconcileOutcome::LostRace { .. }))
            .count();
        assert_eq!((confirmed, lost), (1, 1));

        let review = h
            .storage
            .list_sms_by_status(&[SmsStatus::ManualReview], 10)
            .await
            .unwrap();
        assert_eq!(review.len(), 1);
        assert_eq!(review[0].failure_reason.as_deref(), Some(LOST_RACE_REASON));
    }

    #[tokio::test]
    async fn manual_attach_confirms_and_audits() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let now = Utc::now();
        let sms_id = seed_sms(&h, "k1", "odd format").await;
        h.storage
            .transition_sms(&sms_id, &[SmsStatus::Received], SmsStatus::ManualReview, Some("no candidates"), now)
            .await
            .unwrap();
        let intent = seed_intent(&h, 20_000).await;

        let confirmed = engine
            .manual_attach(&sms_id, &intent.id, "op-7", now)
            .await
            .unwrap();
        assert_eq!(confirmed.status, IntentStatus::Confirmed);
        assert_eq!(confirmed.confirmed_sms_id.as_deref(), Some(sms_id.as_str()));

        let audit = h.storage.list_audit("inbound_sms", &sms_id).await.unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].entry.action, "sms.manual_attach");
        assert_eq!(audit[0].entry.actor_id, "op-7");
    }

    #[tokio::test]
    async fn manual_attach_rejects_parsed_sms() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let now = Utc::now();
        let sms_id = seed_sms(&h, "k1", "x").await;
        h.storage
            .transition_sms(&sms_id, &[SmsStatus::Received], SmsStatus::Parsed, None, now)
            .await
            .unwrap();
        let intent = seed_intent(&h, 20_000).await;

        let err = engine
            .manual_attach(&sms_id, &intent.id, "op", now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "already_resolved");
        let untouched = h.storage.get_payment_intent(&intent.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, IntentStatus::Pending);
    }

    #[tokio::test]
    async fn manual_attach_rejects_confirmed_intent() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let now = Utc::now();
        let sms_id = seed_sms(&h, "k1", "x").await;
        h.storage
            .transition_sms(&sms_id, &[SmsStatus::Received], SmsStatus::ManualReview, None, now)
            .await
            .unwrap();
        let intent = seed_intent(&h, 20_000).await;
        h.storage
            .conditional_transition_intent(&intent.id, &[IntentStatus::Pending], IntentStatus::Failed, None, now)
            .await
            .unwrap();

        let err = engine
            .manual_attach(&sms_id, &intent.id, "op", now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "intent_not_pending");
    }

    #[tokio::test]
    async fn manual_attach_unknown_ids_are_not_found() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let now = Utc::now();
        let err = engine.manual_attach("nope", "nope", "op", now).await.unwrap_err();
        assert!(matches!(err, MomopayError::NotFound { entity: "sms", .. }));

        let sms_id = seed_sms(&h, "k1", "x").await;
        let err = engine.manual_attach(&sms_id, "nope", "op", now).await.unwrap_err();
        assert!(matches!(err, MomopayError::NotFound { entity: "payment_intent", .. }));
    }

    #[tokio::test]
    async fn dismiss_is_terminal() {
        let h = harness().await;
        let engine = ReconciliationEngine::new(h.storage.clone(), h.events.clone());
        let now = Utc::now();
        let sms_id = seed_sms(&h, "k1", "promo message").await;

        let sms = engine
            .dismiss(&sms_id, DismissResolution::Invalid, Some("promo"), "op", now)
            .await
            .unwrap();
        assert_eq!(sms.status, SmsStatus::Dismissed);
        assert_eq!(sms.resolution, Some(DismissResolution::Invalid));

        let err = engine
            .dismiss(&sms_id, DismissResolution::Duplicate, None, "op", now)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "already_resolved");
        assert_eq!(h.storage.list_audit("inbound_sms", &sms_id).await.unwrap().len(), 1);
    }
}
