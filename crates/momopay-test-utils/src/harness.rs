// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete service graph with a temp SQLite
//! database. Webhook deliveries queue work the same way they do in
//! production; [`TestHarness::drain`] runs that work inline so tests stay
//! deterministic without a background worker.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};

use momopay_config::MomopayConfig;
use momopay_config::model::{MatcherConfig, RetryConfig, StorageConfig};
use momopay_core::types::{IntentKind, NewPaymentIntent, PaymentIntent};
use momopay_core::{MomopayError, PaymentParser, StorageAdapter};
use momopay_parser::PatternParser;
use momopay_pipeline::{InboundSmsPayload, ProcessOutcome, Services};
use momopay_storage::SqliteStorage;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: MomopayConfig,
    parser: Option<Arc<dyn PaymentParser>>,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = MomopayConfig::default();
        config.server.webhook_token = Some("test-webhook-token".into());
        config.server.admin_token = Some("test-admin-token".into());
        Self {
            config,
            parser: None,
        }
    }

    pub fn with_matcher(mut self, matcher: MatcherConfig) -> Self {
        self.config.matcher = matcher;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Override the webhook and admin bearer tokens. `None` disables a surface.
    pub fn with_tokens(mut self, webhook: Option<&str>, admin: Option<&str>) -> Self {
        self.config.server.webhook_token = webhook.map(str::to_string);
        self.config.server.admin_token = admin.map(str::to_string);
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.config.parser.min_confidence = min_confidence;
        self
    }

    /// Use a custom parser instead of the pattern parser.
    pub fn with_parser(mut self, parser: Arc<dyn PaymentParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(mut self) -> Result<TestHarness, MomopayError> {
        let temp_dir = tempfile::TempDir::new().map_err(MomopayError::storage)?;
        self.config.storage = StorageConfig {
            database_path: temp_dir
                .path()
                .join("test.db")
                .to_string_lossy()
                .into_owned(),
            wal_mode: true,
        };

        let storage = SqliteStorage::new(self.config.storage.clone());
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let parser = match self.parser {
            Some(parser) => parser,
            None => Arc::new(PatternParser::from_config(&self.config.parser)),
        };
        let (services, work_rx) = Services::build(&self.config, storage, parser);

        Ok(TestHarness {
            services,
            config: self.config,
            work_rx: Mutex::new(work_rx),
            _temp_dir: temp_dir,
        })
    }
}

/// Complete test environment for integration testing.
pub struct TestHarness {
    pub services: Services,
    pub config: MomopayConfig,
    work_rx: Mutex<mpsc::Receiver<String>>,
    // Keeps the database directory alive for the harness lifetime.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Accept an SMS through ingress as the webhook would.
    pub async fn deliver(&self, text: &str, from: &str) -> Result<String, MomopayError> {
        let payload = InboundSmsPayload {
            text: text.to_string(),
            from: Some(from.to_string()),
            ..Default::default()
        };
        let inserted = self.services.ingress.accept(payload, Utc::now()).await?;
        Ok(inserted.sms_id)
    }

    /// Process every queued SMS id inline, returning each outcome in order.
    pub async fn drain(&self) -> Result<Vec<(String, ProcessOutcome)>, MomopayError> {
        self.drain_at(Utc::now()).await
    }

    pub async fn drain_at(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<(String, ProcessOutcome)>, MomopayError> {
        let mut rx = self.work_rx.lock().await;
        let mut outcomes = Vec::new();
        while let Ok(sms_id) = rx.try_recv() {
            let outcome = self.services.pipeline.process_sms(&sms_id, now).await?;
            outcomes.push((sms_id, outcome));
        }
        Ok(outcomes)
    }

    /// Create a pending intent in the home currency.
    pub async fn intent(
        &self,
        amount_minor: i64,
        owner_reference: &str,
    ) -> Result<PaymentIntent, MomopayError> {
        self.services
            .storage
            .insert_payment_intent(
                &NewPaymentIntent {
                    expected_amount_minor: amount_minor,
                    currency: self.config.parser.home_currency.clone(),
                    kind: IntentKind::Ticket,
                    owner_reference: owner_reference.to_string(),
                    expires_at: None,
                },
                Utc::now(),
            )
            .await
    }
}
