// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable retry queue and the sweeper that drains it.
//!
//! Retry state lives in storage, not in memory: a restart loses nothing, and
//! the sweeper picks up whatever is due when it comes back.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use momopay_config::model::RetryConfig;
use momopay_core::types::{AuditEntry, ReconciliationEvent, RetryJob, RetryOutcome, SmsStatus};
use momopay_core::{MomopayError, RetryPolicy, StorageAdapter};

use crate::events::EventBus;
use crate::pipeline::Pipeline;

pub fn policy_from_config(config: &RetryConfig) -> RetryPolicy {
    RetryPolicy {
        max_attempts: config.max_attempts.max(1),
        base_delay: Duration::from_secs(config.base_delay_secs),
        max_delay: Duration::from_secs(config.max_delay_secs.max(config.base_delay_secs)),
    }
}

/// Queue depth and the soonest-due jobs.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatus {
    pub depth: u64,
    pub jobs: Vec<RetryJob>,
}

pub struct RetryQueue {
    storage: Arc<dyn StorageAdapter>,
    policy: RetryPolicy,
    events: EventBus,
}

impl RetryQueue {
    pub fn new(storage: Arc<dyn StorageAdapter>, policy: RetryPolicy, events: EventBus) -> Self {
        Self {
            storage,
            policy,
            events,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Records a failed attempt. Past the attempt limit the SMS lands in
    /// manual review instead of being rescheduled.
    pub async fn enqueue(
        &self,
        sms_id: &str,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<RetryOutcome, MomopayError> {
        let outcome = self
            .storage
            .record_retry_failure(sms_id, reason, &self.policy, now)
            .await?;
        match &outcome {
            RetryOutcome::Scheduled {
                attempts_made,
                next_attempt_at,
            } => {
                debug!(sms_id, attempts_made, %next_attempt_at, reason, "retry scheduled");
                self.events.publish(ReconciliationEvent::RetryScheduled {
                    sms_id: sms_id.to_string(),
                    attempt: *attempts_made,
                    next_attempt_at: *next_attempt_at,
                });
            }
            RetryOutcome::Exhausted { attempts_made } => {
                warn!(sms_id, attempts_made, reason, "retries exhausted; sms sent to manual review");
                self.events.publish(ReconciliationEvent::RetryExhausted {
                    sms_id: sms_id.to_string(),
                    reason: reason.to_string(),
                });
            }
        }
        Ok(outcome)
    }

    /// Operator forces an immediate retry with a fresh attempt budget.
    pub async fn requeue_now(
        &self,
        sms_id: &str,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RetryJob, MomopayError> {
        let sms = self
            .storage
            .get_inbound_sms(sms_id)
            .await?
            .ok_or_else(|| MomopayError::NotFound {
                entity: "sms",
                id: sms_id.to_string(),
            })?;

        let audit = AuditEntry {
            action: "sms.retry".to_string(),
            entity_type: "inbound_sms".to_string(),
            entity_id: sms_id.to_string(),
            actor_id: operator_id.to_string(),
            before: Some(json!({ "status": sms.status })),
            after: Some(json!({ "status": SmsStatus::Error })),
        };
        let job = self
            .storage
            .requeue_sms(
                sms_id,
                SmsStatus::REVIEWABLE,
                self.policy.max_attempts,
                &audit,
                now,
            )
            .await?;

        match job {
            Some(job) => {
                info!(sms_id, operator_id, "operator requeued sms");
                Ok(job)
            }
            None => {
                let status = self
                    .storage
                    .get_inbound_sms(sms_id)
                    .await?
                    .map_or_else(|| "unknown".to_string(), |s| s.status.to_string());
                Err(MomopayError::AlreadyResolved {
                    sms_id: sms_id.to_string(),
                    status,
                })
            }
        }
    }

    pub async fn status(&self, limit: u32) -> Result<QueueStatus, MomopayError> {
        Ok(QueueStatus {
            depth: self.storage.count_retry_jobs().await?,
            jobs: self.storage.list_retry_jobs(limit).await?,
        })
    }
}

/// What one sweep did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Due retry jobs that were re-processed.
    pub retried: usize,
    /// `received` SMS that no worker had picked up.
    pub redriven: usize,
    /// Processing errors; those jobs come back once their lease expires.
    pub failed: usize,
}

/// Periodically re-drives due jobs and stalled SMS through the pipeline.
pub struct RetrySweeper {
    storage: Arc<dyn StorageAdapter>,
    pipeline: Arc<Pipeline>,
    config: RetryConfig,
}

impl RetrySweeper {
    pub fn new(storage: Arc<dyn StorageAdapter>, pipeline: Arc<Pipeline>, config: RetryConfig) -> Self {
        Self {
            storage,
            pipeline,
            config,
        }
    }

    /// One pass at `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, MomopayError> {
        let mut report = SweepReport::default();

        let jobs = self
            .storage
            .claim_due_jobs(now, self.config.batch_size, self.config.claim_lease())
            .await?;
        for job in jobs {
            match self.pipeline.process_sms(&job.sms_id, now).await {
                Ok(_) => report.retried += 1,
                Err(e) => {
                    warn!(sms_id = %job.sms_id, error = %e, "retry attempt failed");
                    report.failed += 1;
                }
            }
        }

        let stale_after = chrono::Duration::from_std(self.config.stale_received())
            .unwrap_or_else(|_| chrono::Duration::minutes(2));
        let stale = self
            .storage
            .list_stale_received(now - stale_after, self.config.batch_size)
            .await?;
        for sms in stale {
            match self.pipeline.process_sms(&sms.id, now).await {
                Ok(_) => report.redriven += 1,
                Err(e) => {
                    warn!(sms_id = %sms.id, error = %e, "re-drive of stalled sms failed");
                    report.failed += 1;
                }
            }
        }

        if report != SweepReport::default() {
            info!(
                retried = report.retried,
                redriven = report.redriven,
                failed = report.failed,
                "retry sweep complete"
            );
        }
        Ok(report)
    }

    /// Sweeps on the configured interval until cancelled.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.sweep_interval().max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.sweep_interval_secs,
            "retry sweeper started"
        );
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep_at(Utc::now()).await {
                        warn!(error = %e, "retry sweep failed");
                    }
                }
            }
        }
        info!("retry sweeper stopped");
    }
}
