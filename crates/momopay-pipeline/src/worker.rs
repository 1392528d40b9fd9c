// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-concurrency consumer of freshly ingested SMS ids.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::pipeline::Pipeline;

/// Drains `rx`, running at most `concurrency` SMS through the pipeline at a
/// time. On cancellation it stops taking new work and waits for in-flight
/// SMS to finish.
pub async fn run_worker(
    pipeline: Arc<Pipeline>,
    mut rx: mpsc::Receiver<String>,
    concurrency: usize,
    cancel: CancellationToken,
) {
    let concurrency = concurrency.max(1);
    let permits = Arc::new(Semaphore::new(concurrency));
    info!(concurrency, "sms worker started");

    loop {
        let sms_id = tokio::select! {
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(id) => id,
                None => break,
            },
        };

        let permit = match permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let pipeline = pipeline.clone();
        tokio::spawn(async move {
            let _permit = permit;
            match pipeline.process_sms(&sms_id, Utc::now()).await {
                Ok(outcome) => debug!(sms_id = %sms_id, ?outcome, "sms processed"),
                // The stale-received sweep or the job lease brings it back.
                Err(e) => warn!(sms_id = %sms_id, error = %e, "sms processing failed"),
            }
        });
    }

    // Wait for every in-flight task to release its permit.
    let _ = permits.acquire_many(concurrency as u32).await;
    info!("sms worker stopped");
}
