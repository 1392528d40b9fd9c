// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One SMS from `received` to a terminal or review state.
//!
//! The stages run in order: parse, confidence gate, persist the parse,
//! candidate search, decide, commit. Every exit leaves the SMS in a state the
//! retry sweeper or an operator can pick up.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};

use momopay_core::types::{
    InboundSms, IntentStatus, ParseFailure, ParseFailureKind, ParsedPayment, ReconciliationEvent,
    RetryOutcome, SmsStatus,
};
use momopay_core::{MomopayError, PaymentParser, StorageAdapter};

use crate::events::EventBus;
use crate::matcher::{CandidateMatcher, MatchDecision, MatchInput};
use crate::reconcile::{ReconcileOutcome, ReconciliationEngine};
use crate::retry::RetryQueue;

pub const NO_CANDIDATES_REASON: &str = "no candidates";
pub const AMBIGUOUS_REASON: &str = "ambiguous candidates";
pub const BELOW_THRESHOLD_REASON: &str = "best candidate below auto-match threshold";

/// Where one pass left the SMS.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The SMS was not in a processable state; nothing was done.
    Skipped { status: SmsStatus },
    Confirmed { intent_id: String },
    ManualReview { reason: String },
    RetryScheduled { attempt: u32, next_attempt_at: DateTime<Utc> },
    /// The failure used up the last attempt; the SMS is in manual review.
    RetryExhausted { reason: String },
    /// The intent was claimed concurrently; the SMS is in manual review.
    LostRace { intent_id: String },
}

pub struct Pipeline {
    storage: Arc<dyn StorageAdapter>,
    parser: Arc<dyn PaymentParser>,
    matcher: CandidateMatcher,
    engine: Arc<ReconciliationEngine>,
    retry: Arc<RetryQueue>,
    events: EventBus,
    min_confidence: f64,
}

impl Pipeline {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        parser: Arc<dyn PaymentParser>,
        matcher: CandidateMatcher,
        engine: Arc<ReconciliationEngine>,
        retry: Arc<RetryQueue>,
        events: EventBus,
        min_confidence: f64,
    ) -> Self {
        Self {
            storage,
            parser,
            matcher,
            engine,
            retry,
            events,
            min_confidence,
        }
    }

    pub fn matcher(&self) -> &CandidateMatcher {
        &self.matcher
    }

    /// Runs one SMS through the pipeline.
    ///
    /// Parse failures are not errors: they schedule a retry. `Err` is
    /// reserved for storage failures, which leave the SMS where it was.
    #[instrument(skip(self, now), fields(sms_id = %sms_id))]
    pub async fn process_sms(
        &self,
        sms_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, MomopayError> {
        let sms = self
            .storage
            .get_inbound_sms(sms_id)
            .await?
            .ok_or_else(|| MomopayError::NotFound {
                entity: "sms",
                id: sms_id.to_string(),
            })?;
        if !SmsStatus::PROCESSABLE.contains(&sms.status) {
            debug!(status = %sms.status, "sms not processable; skipping");
            return Ok(ProcessOutcome::Skipped { status: sms.status });
        }

        let prompt = self.storage.active_prompt().await?.map(|p| p.spec());
        let fields = match self.parser.parse(&sms.raw_text, prompt.as_ref()).await {
            Ok(fields) if fields.confidence < self.min_confidence => {
                let failure = ParseFailure::new(
                    ParseFailureKind::LowConfidence,
                    format!(
                        "confidence {:.2} below {:.2}",
                        fields.confidence, self.min_confidence
                    ),
                );
                return self.fail(&sms, &failure, now).await;
            }
            Ok(fields) => fields,
            Err(failure) => return self.fail(&sms, &failure, now).await,
        };

        let attempt = self
            .storage
            .latest_parsed_payment(sms_id)
            .await?
            .map_or(1, |p| p.attempt + 1);
        let parsed = self
            .storage
            .insert_parsed_payment(sms_id, attempt, &fields, now)
            .await?;
        debug!(
            attempt,
            amount_minor = parsed.fields.amount_minor,
            currency = %parsed.fields.currency,
            confidence = parsed.fields.confidence,
            parser_version = %parsed.fields.parser_version,
            "sms parsed"
        );

        self.match_and_commit(&sms, &parsed, now).await
    }

    async fn match_and_commit(
        &self,
        sms: &InboundSms,
        parsed: &ParsedPayment,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, MomopayError> {
        let input = MatchInput {
            sms_id: &sms.id,
            amount_minor: parsed.fields.amount_minor,
            currency: &parsed.fields.currency,
            reference: &parsed.fields.reference,
            text: &sms.raw_text,
            received_at: sms.received_at,
        };
        let candidates = self
            .matcher
            .find_candidates(self.storage.as_ref(), &input, now)
            .await?;

        match self.matcher.decide(&candidates) {
            MatchDecision::Auto(candidate) => {
                match self.engine.reconcile(parsed, &candidate, now).await? {
                    ReconcileOutcome::Confirmed { intent_id } => {
                        Ok(ProcessOutcome::Confirmed { intent_id })
                    }
                    ReconcileOutcome::LostRace { intent_id } => {
                        Ok(ProcessOutcome::LostRace { intent_id })
                    }
                    ReconcileOutcome::AlreadyResolved { status } => Ok(ProcessOutcome::Skipped {
                        status: status.unwrap_or(sms.status),
                    }),
                }
            }
            MatchDecision::NoCandidates if self.matcher.config().retry_unmatched => {
                self.schedule_retry(&sms.id, NO_CANDIDATES_REASON, now).await
            }
            MatchDecision::NoCandidates => self.to_review(&sms.id, NO_CANDIDATES_REASON, now).await,
            MatchDecision::Ambiguous { top, runner_up } => {
                debug!(
                    top = %top.intent_id,
                    top_score = top.score,
                    runner_up = %runner_up.intent_id,
                    runner_up_score = runner_up.score,
                    "ambiguous candidates"
                );
                self.to_review(&sms.id, AMBIGUOUS_REASON, now).await
            }
            MatchDecision::BelowThreshold(candidate) => {
                let flagged = self
                    .storage
                    .conditional_transition_intent(
                        &candidate.intent_id,
                        &[IntentStatus::Pending],
                        IntentStatus::ManualReview,
                        Some(&sms.id),
                        now,
                    )
                    .await?;
                if flagged {
                    self.events.publish(ReconciliationEvent::IntentFlagged {
                        intent_id: candidate.intent_id.clone(),
                        sms_id: sms.id.clone(),
                        score: candidate.score,
                    });
                }
                self.to_review(&sms.id, BELOW_THRESHOLD_REASON, now).await
            }
        }
    }

    async fn fail(
        &self,
        sms: &InboundSms,
        failure: &ParseFailure,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, MomopayError> {
        debug!(kind = %failure.kind, "parse failed");
        self.schedule_retry(&sms.id, &failure.to_string(), now).await
    }

    async fn schedule_retry(
        &self,
        sms_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, MomopayError> {
        match self.retry.enqueue(sms_id, reason, now).await? {
            RetryOutcome::Scheduled {
                attempts_made,
                next_attempt_at,
            } => Ok(ProcessOutcome::RetryScheduled {
                attempt: attempts_made,
                next_attempt_at,
            }),
            RetryOutcome::Exhausted { .. } => Ok(ProcessOutcome::RetryExhausted {
                reason: reason.to_string(),
            }),
        }
    }

    async fn to_review(
        &self,
        sms_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessOutcome, MomopayError> {
        let moved = self
            .storage
            .transition_sms(
                sms_id,
                SmsStatus::PROCESSABLE,
                SmsStatus::ManualReview,
                Some(reason),
                now,
            )
            .await?;
        if !moved {
            let status = self
                .storage
                .get_inbound_sms(sms_id)
                .await?
                .map_or(SmsStatus::ManualReview, |s| s.status);
            return Ok(ProcessOutcome::Skipped { status });
        }
        info!(reason, "sms routed to manual review");
        self.events.publish(ReconciliationEvent::ManualReview {
            sms_id: sms_id.to_string(),
            reason: reason.to_string(),
        });
        Ok(ProcessOutcome::ManualReview {
            reason: reason.to_string(),
        })
    }
}
