// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of the reconciliation services from configuration.

use std::sync::Arc;

use tokio::sync::mpsc;

use momopay_config::MomopayConfig;
use momopay_config::model::RetryConfig;
use momopay_core::{PaymentParser, StorageAdapter};
use momopay_security::MsisdnRedactor;

use crate::events::EventBus;
use crate::ingress::IngressService;
use crate::intents::IntentService;
use crate::matcher::CandidateMatcher;
use crate::pipeline::Pipeline;
use crate::prompts::PromptService;
use crate::reconcile::ReconciliationEngine;
use crate::retry::{RetryQueue, RetrySweeper, policy_from_config};
use crate::review::ManualReviewService;

/// Every service the HTTP surface and the background tasks share.
#[derive(Clone)]
pub struct Services {
    pub storage: Arc<dyn StorageAdapter>,
    pub parser: Arc<dyn PaymentParser>,
    pub events: EventBus,
    pub pipeline: Arc<Pipeline>,
    pub retry: Arc<RetryQueue>,
    pub ingress: Arc<IngressService>,
    pub review: Arc<ManualReviewService>,
    pub prompts: Arc<PromptService>,
    pub intents: Arc<IntentService>,
    retry_config: RetryConfig,
}

impl Services {
    /// Builds the service graph. The returned receiver feeds
    /// [`run_worker`](crate::worker::run_worker).
    pub fn build(
        config: &MomopayConfig,
        storage: Arc<dyn StorageAdapter>,
        parser: Arc<dyn PaymentParser>,
    ) -> (Self, mpsc::Receiver<String>) {
        let events = EventBus::default();
        let matcher = CandidateMatcher::new(config.matcher.clone());
        let engine = Arc::new(ReconciliationEngine::new(storage.clone(), events.clone()));
        let retry = Arc::new(RetryQueue::new(
            storage.clone(),
            policy_from_config(&config.retry),
            events.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            storage.clone(),
            parser.clone(),
            matcher.clone(),
            engine.clone(),
            retry.clone(),
            events.clone(),
            config.parser.min_confidence,
        ));

        let (work_tx, work_rx) = mpsc::channel(config.server.inbound_buffer.max(1));
        let ingress = Arc::new(IngressService::new(
            storage.clone(),
            MsisdnRedactor::default(),
            work_tx,
        ));
        let review = Arc::new(ManualReviewService::new(
            storage.clone(),
            matcher,
            engine,
            retry.clone(),
        ));
        let prompts = Arc::new(PromptService::new(storage.clone(), parser.clone()));
        let intents = Arc::new(IntentService::new(
            storage.clone(),
            config.parser.home_currency.clone(),
        ));

        let services = Self {
            storage,
            parser,
            events,
            pipeline,
            retry,
            ingress,
            review,
            prompts,
            intents,
            retry_config: config.retry.clone(),
        };
        (services, work_rx)
    }

    pub fn sweeper(&self) -> RetrySweeper {
        RetrySweeper::new(
            self.storage.clone(),
            self.pipeline.clone(),
            self.retry_config.clone(),
        )
    }
}
