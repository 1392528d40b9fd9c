// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process broadcast of reconciliation outcomes.

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use momopay_core::ReconciliationEvent;

/// Default number of events buffered per subscriber before it lags.
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Fan-out of [`ReconciliationEvent`]s to any number of subscribers.
///
/// Publishing never blocks and never fails: with no subscribers the event is
/// dropped, and a slow subscriber skips ahead rather than stalling the pipeline.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ReconciliationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, event: ReconciliationEvent) {
        // Err only means nobody is listening.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ReconciliationEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Logs every event until cancelled or the bus is dropped.
pub fn spawn_log_subscriber(bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => match received {
                    Ok(event) => log_event(&event),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event log subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("event log subscriber stopped");
    })
}

fn log_event(event: &ReconciliationEvent) {
    match event {
        ReconciliationEvent::Confirmed {
            sms_id,
            intent_id,
            amount_minor,
            currency,
            operator_id,
        } => info!(
            sms_id = %sms_id,
            intent_id = %intent_id,
            amount_minor = ?amount_minor,
            currency = %currency,
            operator_id = ?operator_id,
            "payment confirmed"
        ),
        ReconciliationEvent::ManualReview { sms_id, reason } => {
            info!(sms_id = %sms_id, reason = %reason, "sms routed to manual review")
        }
        ReconciliationEvent::IntentFlagged {
            intent_id,
            sms_id,
            score,
        } => info!(
            intent_id = %intent_id,
            sms_id = %sms_id,
            score,
            "intent flagged for review"
        ),
        ReconciliationEvent::RetryScheduled {
            sms_id,
            attempt,
            next_attempt_at,
        } => debug!(
            sms_id = %sms_id,
            attempt,
            next_attempt_at = %next_attempt_at,
            "retry scheduled"
        ),
        ReconciliationEvent::RetryExhausted { sms_id, reason } => {
            warn!(sms_id = %sms_id, reason = %reason, "retries exhausted")
        }
        ReconciliationEvent::Dismissed { sms_id, resolution } => {
            info!(sms_id = %sms_id, resolution = %resolution, "sms dismissed")
        }
    }
}
