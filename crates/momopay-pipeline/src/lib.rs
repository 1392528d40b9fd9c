// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Reconciliation pipeline for the Momopay service.
//!
//! Ingress persists masked SMS and hands their ids to a bounded worker. The
//! worker parses, matches against pending payment intents, and either
//! confirms an intent, schedules a durable retry, or routes the SMS to
//! manual review. Operator actions and prompt management live alongside.

pub mod events;
pub mod ingress;
pub mod intents;
pub mod matcher;
pub mod pipeline;
pub mod prompts;
pub mod reconcile;
pub mod retry;
pub mod review;
pub mod service;
pub mod worker;

pub use events::{EventBus, spawn_log_subscriber};
pub use ingress::{InboundSmsPayload, IngressService, dedup_key};
pub use intents::{CreateIntentRequest, IntentService};
pub use matcher::{CandidateMatcher, MatchDecision, MatchInput};
pub use pipeline::{Pipeline, ProcessOutcome};
pub use prompts::{PromptService, PromptTestResult};
pub use reconcile::{ReconcileOutcome, ReconciliationEngine};
pub use retry::{QueueStatus, RetryQueue, RetrySweeper, SweepReport, policy_from_config};
pub use review::{InboundItem, ManualReviewService, ReviewItem, clamp_limit};
pub use service::Services;
pub use worker::run_worker;

#[cfg(test)]
pub(crate) mod test_support {
    use std::ops::Deref;
    use std::sync::Arc;

    use chrono::Utc;
    use momopay_config::MomopayConfig;
    use momopay_config::model::{MatcherConfig, StorageConfig};
    use momopay_core::types::{IntentKind, NewInboundSms, NewPaymentIntent, ParsedFields, PaymentIntent};
    use momopay_core::StorageAdapter;
    use momopay_parser::PatternParser;
    use momopay_storage::SqliteStorage;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    use crate::service::Services;

    pub(crate) struct Harness {
        services: Services,
        _rx: mpsc::Receiver<String>,
        _dir: TempDir,
    }

    impl Deref for Harness {
        type Target = Services;

        fn deref(&self) -> &Services {
            &self.services
        }
    }

    pub(crate) async fn harness() -> Harness {
        harness_with(MatcherConfig::default(), 0.6).await
    }

    pub(crate) async fn harness_with(matcher: MatcherConfig, min_confidence: f64) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MomopayConfig::default();
        config.matcher = matcher;
        config.parser.min_confidence = min_confidence;
        config.storage = StorageConfig {
            database_path: dir.path().join("pipeline.db").to_string_lossy().into_owned(),
            wal_mode: true,
        };

        let storage = SqliteStorage::new(config.storage.clone());
        storage.initialize().await.unwrap();
        let parser = Arc::new(PatternParser::from_config(&config.parser));
        let (services, rx) = Services::build(&config, Arc::new(storage), parser);
        Harness {
            services,
            _rx: rx,
            _dir: dir,
        }
    }

    pub(crate) async fn seed_sms(h: &Harness, dedup_key: &str, text: &str) -> String {
        h.storage
            .insert_inbound_sms(
                &NewInboundSms {
                    raw_text: text.to_string(),
                    from_msisdn: Some("078*****56".into()),
                    to_msisdn: None,
                    received_at: Utc::now(),
                    modem_id: None,
                    sim_slot: None,
                    dedup_key: dedup_key.to_string(),
                },
                Utc::now(),
            )
            .await
            .unwrap()
            .sms_id
    }

    pub(crate) async fn seed_intent(h: &Harness, amount: i64) -> PaymentIntent {
        h.storage
            .insert_payment_intent(
                &NewPaymentIntent {
                    expected_amount_minor: amount,
                    currency: "RWF".into(),
                    kind: IntentKind::Ticket,
                    owner_reference: "order-1".into(),
                    expires_at: None,
                },
                Utc::now(),
            )
            .await
            .unwrap()
    }

    pub(crate) fn parsed_fields(amount: i64) -> ParsedFields {
        ParsedFields {
            amount_minor: amount,
            currency: "RWF".into(),
            reference: "ABC123".into(),
            payer_mask: None,
            occurred_at: None,
            confidence: 0.95,
            parser_version: "pattern:v1".into(),
            prompt_id: None,
        }
    }
}
