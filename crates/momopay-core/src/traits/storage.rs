// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::backoff::RetryPolicy;
use crate::error::MomopayError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AuditEntry, AuditRecord, ClaimOutcome, DismissResolution, InboundSms, IntentClaim,
    IntentStatus, NewInboundSms, NewPaymentIntent, ParsedFields, ParsedPayment, ParserPrompt,
    PaymentIntent, RetryJob, RetryOutcome, SmsInsert, SmsStatus,
};

/// Adapter for the reconciliation store.
///
/// Every state change that guards against a race is a conditional write
/// executed by the backend, never a read followed by a write in the caller.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection pool, etc.).
    async fn initialize(&self) -> Result<(), MomopayError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), MomopayError>;

    // --- Inbound SMS ---

    /// Inserts an SMS unless one with the same dedup key exists.
    async fn insert_inbound_sms(
        &self,
        sms: &NewInboundSms,
        now: DateTime<Utc>,
    ) -> Result<SmsInsert, MomopayError>;

    async fn get_inbound_sms(&self, id: &str) -> Result<Option<InboundSms>, MomopayError>;

    /// Most recent SMS first.
    async fn list_inbound_sms(&self, limit: u32) -> Result<Vec<InboundSms>, MomopayError>;

    async fn list_sms_by_status(
        &self,
        statuses: &[SmsStatus],
        limit: u32,
    ) -> Result<Vec<InboundSms>, MomopayError>;

    /// SMS still in `received` whose last update is older than `older_than`.
    async fn list_stale_received(
        &self,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<InboundSms>, MomopayError>;

    /// Moves an SMS to `to` only if it is currently in one of `from`.
    ///
    /// Any target other than `error` also removes the SMS's retry job.
    /// Returns whether a row changed.
    async fn transition_sms(
        &self,
        id: &str,
        from: &[SmsStatus],
        to: SmsStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, MomopayError>;

    /// Terminal dismissal, conditional on `from`.
    async fn dismiss_sms(
        &self,
        id: &str,
        from: &[SmsStatus],
        resolution: DismissResolution,
        note: Option<&str>,
        audit: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<bool, MomopayError>;

    // --- Parsed payments ---

    async fn insert_parsed_payment(
        &self,
        sms_id: &str,
        attempt: u32,
        fields: &ParsedFields,
        now: DateTime<Utc>,
    ) -> Result<ParsedPayment, MomopayError>;

    async fn latest_parsed_payment(
        &self,
        sms_id: &str,
    ) -> Result<Option<ParsedPayment>, MomopayError>;

    // --- Payment intents ---

    async fn insert_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError>;

    async fn get_payment_intent(&self, id: &str) -> Result<Option<PaymentIntent>, MomopayError>;

    /// Pending intents with `min <= expected_amount <= max` in `currency`,
    /// created at or after `since` and not expired at `now`.
    async fn find_pending_by_amount_range(
        &self,
        currency: &str,
        min: i64,
        max: i64,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentIntent>, MomopayError>;

    async fn list_intents_by_status(
        &self,
        status: IntentStatus,
        limit: u32,
    ) -> Result<Vec<PaymentIntent>, MomopayError>;

    /// Atomic compare-and-set on an intent's status.
    ///
    /// `suggested_sms_id` is recorded alongside when present.
    async fn conditional_transition_intent(
        &self,
        id: &str,
        from: &[IntentStatus],
        to: IntentStatus,
        suggested_sms_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, MomopayError>;

    /// Confirms an intent for an SMS in one transaction.
    ///
    /// The SMS row is touched only if the intent update changed exactly one row.
    async fn claim_intent(
        &self,
        claim: &IntentClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MomopayError>;

    // --- Retry queue ---

    /// Increments the SMS's attempt counter and reschedules it, or removes the
    /// job and forces the SMS to `manual_review` once the policy is exhausted.
    async fn record_retry_failure(
        &self,
        sms_id: &str,
        reason: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetryOutcome, MomopayError>;

    /// Claims up to `limit` due jobs, pushing their `next_attempt_at` to
    /// `now + lease` so another sweeper does not pick them up concurrently.
    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        lease: std::time::Duration,
    ) -> Result<Vec<RetryJob>, MomopayError>;

    async fn get_retry_job(&self, sms_id: &str) -> Result<Option<RetryJob>, MomopayError>;

    /// Soonest-due first.
    async fn list_retry_jobs(&self, limit: u32) -> Result<Vec<RetryJob>, MomopayError>;

    async fn count_retry_jobs(&self) -> Result<u64, MomopayError>;

    /// Moves a reviewable SMS back to `error` and makes its job due at `now`
    /// with a fresh attempt counter. `None` if the SMS was not in `from`.
    async fn requeue_sms(
        &self,
        sms_id: &str,
        from: &[SmsStatus],
        max_attempts: u32,
        audit: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<Option<RetryJob>, MomopayError>;

    // --- Parser prompts ---

    async fn list_prompts(&self) -> Result<Vec<ParserPrompt>, MomopayError>;

    async fn get_prompt(&self, id: &str) -> Result<Option<ParserPrompt>, MomopayError>;

    async fn active_prompt(&self) -> Result<Option<ParserPrompt>, MomopayError>;

    /// `version` defaults to one above the highest existing version.
    async fn insert_prompt(
        &self,
        label: &str,
        body: &str,
        version: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ParserPrompt, MomopayError>;

    /// Deactivates every prompt and activates `id` in one transaction.
    ///
    /// Returns the previously active prompt and the newly active one, or
    /// `None` if `id` does not exist.
    async fn activate_prompt(
        &self,
        id: &str,
    ) -> Result<Option<(Option<ParserPrompt>, ParserPrompt)>, MomopayError>;

    // --- Audit ---

    async fn record_audit(
        &self,
        entry: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<(), MomopayError>;

    async fn list_audit(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, MomopayError>;
}
