// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator view of SMS the pipeline could not settle on its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use momopay_core::types::{
    DismissResolution, InboundSms, MatchCandidate, ParsedPayment, PaymentIntent, RetryJob,
    SmsStatus,
};
use momopay_core::{MomopayError, StorageAdapter};

use crate::matcher::{CandidateMatcher, MatchInput};
use crate::reconcile::ReconciliationEngine;
use crate::retry::{QueueStatus, RetryQueue};

pub const DEFAULT_LIST_LIMIT: u32 = 50;
pub const MAX_LIST_LIMIT: u32 = 200;

pub fn clamp_limit(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT)
}

/// One SMS awaiting an operator, with what the pipeline knows about it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewItem {
    pub sms: InboundSms,
    pub parsed: Option<ParsedPayment>,
    pub candidates: Vec<MatchCandidate>,
    pub retry_job: Option<RetryJob>,
}

/// An SMS and its latest parse.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundItem {
    pub sms: InboundSms,
    pub parsed: Option<ParsedPayment>,
}

pub struct ManualReviewService {
    storage: Arc<dyn StorageAdapter>,
    matcher: CandidateMatcher,
    engine: Arc<ReconciliationEngine>,
    retry: Arc<RetryQueue>,
}

impl ManualReviewService {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        matcher: CandidateMatcher,
        engine: Arc<ReconciliationEngine>,
        retry: Arc<RetryQueue>,
    ) -> Self {
        Self {
            storage,
            matcher,
            engine,
            retry,
        }
    }

    /// SMS in `manual_review` or `error`, newest first, each with its
    /// current top candidates.
    pub async fn list(
        &self,
        limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReviewItem>, MomopayError> {
        let rows = self
            .storage
            .list_sms_by_status(SmsStatus::REVIEWABLE, clamp_limit(limit))
            .await?;
        let mut items = Vec::with_capacity(rows.len());
        for sms in rows {
            let parsed = self.storage.latest_parsed_payment(&sms.id).await?;
            let candidates = match &parsed {
                Some(p) => {
                    let input = MatchInput {
                        sms_id: &sms.id,
                        amount_minor: p.fields.amount_minor,
                        currency: &p.fields.currency,
                        reference: &p.fields.reference,
                        text: &sms.raw_text,
                        received_at: sms.received_at,
                    };
                    self.matcher
                        .find_candidates(self.storage.as_ref(), &input, now)
                        .await?
                }
                None => Vec::new(),
            };
            let retry_job = self.storage.get_retry_job(&sms.id).await?;
            items.push(ReviewItem {
                sms,
                parsed,
                candidates,
                retry_job,
            });
        }
        Ok(items)
    }

    pub async fn attach(
        &self,
        sms_id: &str,
        intent_id: &str,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError> {
        self.engine
            .manual_attach(sms_id, intent_id, operator_id, now)
            .await
    }

    pub async fn dismiss(
        &self,
        sms_id: &str,
        resolution: DismissResolution,
        note: Option<&str>,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<InboundSms, MomopayError> {
        self.engine
            .dismiss(sms_id, resolution, note, operator_id, now)
            .await
    }

    pub async fn retry(
        &self,
        sms_id: &str,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RetryJob, MomopayError> {
        self.retry.requeue_now(sms_id, operator_id, now).await
    }

    pub async fn queue_status(&self, limit: Option<u32>) -> Result<QueueStatus, MomopayError> {
        self.retry.status(clamp_limit(limit)).await
    }

    /// Recent deliveries of any status.
    pub async fn inbound(&self, limit: Option<u32>) -> Result<Vec<InboundItem>, MomopayError> {
        let rows = self.storage.list_inbound_sms(clamp_limit(limit)).await?;
        let mut items = Vec::with_capacity(rows.len());
        for sms in rows {
            let parsed = self.storage.latest_parsed_payment(&sms.id).await?;
            items.push(InboundItem { sms, parsed });
        }
        Ok(items)
    }
}
