// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::OnceCell;
use tracing::debug;

use momopay_config::model::StorageConfig;
use momopay_core::types::{
    AuditEntry, AuditRecord, ClaimOutcome, DismissResolution, InboundSms, IntentClaim,
    IntentStatus, NewInboundSms, NewPaymentIntent, ParsedFields, ParsedPayment, ParserPrompt,
    PaymentIntent, RetryJob, RetryOutcome, SmsInsert, SmsStatus,
};
use momopay_core::{
    AdapterType, HealthStatus, MomopayError, PluginAdapter, RetryPolicy, StorageAdapter,
};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// Wraps a [`Database`] handle and delegates all query operations to the
/// typed query modules. The database is lazily initialized on the first
/// call to [`StorageAdapter::initialize`].
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    /// The database connection is not opened until [`StorageAdapter::initialize`] is called.
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, MomopayError> {
        self.db.get().ok_or_else(|| MomopayError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, MomopayError> {
        let db = self.db()?;
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MomopayError> {
        if let Some(db) = self.db.get() {
            db.checkpoint().await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), MomopayError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| MomopayError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), MomopayError> {
        self.db()?.checkpoint().await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Inbound SMS ---

    async fn insert_inbound_sms(
        &self,
        sms: &NewInboundSms,
        now: DateTime<Utc>,
    ) -> Result<SmsInsert, MomopayError> {
        queries::inbound_sms::insert(self.db()?, sms, now).await
    }

    async fn get_inbound_sms(&self, id: &str) -> Result<Option<InboundSms>, MomopayError> {
        queries::inbound_sms::get(self.db()?, id).await
    }

    async fn list_inbound_sms(&self, limit: u32) -> Result<Vec<InboundSms>, MomopayError> {
        queries::inbound_sms::list_recent(self.db()?, limit).await
    }

    async fn list_sms_by_status(
        &self,
        statuses: &[SmsStatus],
        limit: u32,
    ) -> Result<Vec<InboundSms>, MomopayError> {
        queries::inbound_sms::list_by_status(self.db()?, statuses, limit).await
    }

    async fn list_stale_received(
        &self,
        older_than: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<InboundSms>, MomopayError> {
        queries::inbound_sms::list_stale_received(self.db()?, older_than, limit).await
    }

    async fn transition_sms(
        &self,
        id: &str,
        from: &[SmsStatus],
        to: SmsStatus,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, MomopayError> {
        queries::inbound_sms::transition(self.db()?, id, from, to, reason, now).await
    }

    async fn dismiss_sms(
        &self,
        id: &str,
        from: &[SmsStatus],
        resolution: DismissResolution,
        note: Option<&str>,
        audit: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<bool, MomopayError> {
        queries::inbound_sms::dismiss(self.db()?, id, from, resolution, note, audit, now).await
    }

    // --- Parsed payments ---

    async fn insert_parsed_payment(
        &self,
        sms_id: &str,
        attempt: u32,
        fields: &ParsedFields,
        now: DateTime<Utc>,
    ) -> Result<ParsedPayment, MomopayError> {
        queries::parsed_payments::insert(self.db()?, sms_id, attempt, fields, now).await
    }

    async fn latest_parsed_payment(
        &self,
        sms_id: &str,
    ) -> Result<Option<ParsedPayment>, MomopayError> {
        queries::parsed_payments::latest_for_sms(self.db()?, sms_id).await
    }

    // --- Payment intents ---

    async fn insert_payment_intent(
        &self,
        intent: &NewPaymentIntent,
        now: DateTime<Utc>,
    ) -> Result<PaymentIntent, MomopayError> {
        queries::payment_intents::insert(self.db()?, intent, now).await
    }

    async fn get_payment_intent(&self, id: &str) -> Result<Option<PaymentIntent>, MomopayError> {
        queries::payment_intents::get(self.db()?, id).await
    }

    async fn find_pending_by_amount_range(
        &self,
        currency: &str,
        min: i64,
        max: i64,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PaymentIntent>, MomopayError> {
        queries::payment_intents::find_pending_by_amount_range(
            self.db()?,
            currency,
            min,
            max,
            since,
            now,
        )
        .await
    }

    async fn list_intents_by_status(
        &self,
        status: IntentStatus,
        limit: u32,
    ) -> Result<Vec<PaymentIntent>, MomopayError> {
        queries::payment_intents::list_by_status(self.db()?, status, limit).await
    }

    async fn conditional_transition_intent(
        &self,
        id: &str,
        from: &[IntentStatus],
        to: IntentStatus,
        suggested_sms_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool, MomopayError> {
        queries::payment_intents::conditional_transition(
            self.db()?,
            id,
            from,
            to,
            suggested_sms_id,
            now,
        )
        .await
    }

    async fn claim_intent(
        &self,
        claim: &IntentClaim,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, MomopayError> {
        queries::payment_intents::claim(self.db()?, claim, now).await
    }

    // --- Retry queue ---

    async fn record_retry_failure(
        &self,
        sms_id: &str,
        reason: &str,
        policy: &RetryPolicy,
        now: DateTime<Utc>,
    ) -> Result<RetryOutcome, MomopayError> {
        queries::retry_jobs::record_failure(self.db()?, sms_id, reason, policy, now).await
    }

    async fn claim_due_jobs(
        &self,
        now: DateTime<Utc>,
        limit: u32,
        lease: std::time::Duration,
    ) -> Result<Vec<RetryJob>, MomopayError> {
        queries::retry_jobs::claim_due(self.db()?, now, limit, lease).await
    }

    async fn get_retry_job(&self, sms_id: &str) -> Result<Option<RetryJob>, MomopayError> {
        queries::retry_jobs::get(self.db()?, sms_id).await
    }

    async fn list_retry_jobs(&self, limit: u32) -> Result<Vec<RetryJob>, MomopayError> {
        queries::retry_jobs::list(self.db()?, limit).await
    }

    async fn count_retry_jobs(&self) -> Result<u64, MomopayError> {
        queries::retry_jobs::count(self.db()?).await
    }

    async fn requeue_sms(
        &self,
        sms_id: &str,
        from: &[SmsStatus],
        max_attempts: u32,
        audit: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<Option<RetryJob>, MomopayError> {
        queries::retry_jobs::requeue(self.db()?, sms_id, from, max_attempts, audit, now).await
    }

    // --- Parser prompts ---

    async fn list_prompts(&self) -> Result<Vec<ParserPrompt>, MomopayError> {
        queries::prompts::list(self.db()?).await
    }

    async fn get_prompt(&self, id: &str) -> Result<Option<ParserPrompt>, MomopayError> {
        queries::prompts::get(self.db()?, id).await
    }

    async fn active_prompt(&self) -> Result<Option<ParserPrompt>, MomopayError> {
        queries::prompts::active(self.db()?).await
    }

    async fn insert_prompt(
        &self,
        label: &str,
        body: &str,
        version: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<ParserPrompt, MomopayError> {
        queries::prompts::insert(self.db()?, label, body, version, now).await
    }

    async fn activate_prompt(
        &self,
        id: &str,
    ) -> Result<Option<(Option<ParserPrompt>, ParserPrompt)>, MomopayError> {
        queries::prompts::activate(self.db()?, id).await
    }

    // --- Audit ---

    async fn record_audit(
        &self,
        entry: &AuditEntry,
        now: DateTime<Utc>,
    ) -> Result<(), MomopayError> {
        queries::audit::record(self.db()?, entry, now).await
    }

    async fn list_audit(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> Result<Vec<AuditRecord>, MomopayError> {
        queries::audit::list_for_entity(self.db()?, entity_type, entity_id).await
    }
}
