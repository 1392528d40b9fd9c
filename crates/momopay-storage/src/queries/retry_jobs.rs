// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable retry queue.
//!
//! Each SMS has at most one job. The job row and the SMS status always move
//! together inside one transaction.

use chrono::{DateTime, Utc};
use momopay_core::MomopayError;
use momopay_core::backoff::RetryPolicy;
use momopay_core::types::{RetryOutcome, SmsStatus};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{AuditEntry, JOB_COLUMNS, RetryJob, job_from_row, status_list, ts};
use crate::queries::audit;

fn chrono_delay(delay: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::days(3650))
}

const UPSERT_JOB: &str = "INSERT INTO retry_jobs (sms_id, attempts_made, max_attempts,
        next_attempt_at, last_failure_reason, created_at, updated_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
     ON CONFLICT(sms_id) DO UPDATE SET
        attempts_made = excluded.attempts_made,
        max_attempts = excluded.max_attempts,
        next_attempt_at = excluded.next_attempt_at,
        last_failure_reason = excluded.last_failure_reason,
        updated_at = excluded.updated_at";

/// Records one failed attempt and either reschedules or exhausts the job.
pub async fn record_failure(
    db: &Database,
    sms_id: &str,
    reason: &str,
    policy: &RetryPolicy,
    now: DateTime<Utc>,
) -> Result<RetryOutcome, MomopayError> {
    let sms_id = sms_id.to_string();
    let reason = reason.to_string();
    let policy = *policy;
    db.connection()
        .call(move |conn| -> Result<RetryOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let previous: Option<u32> = tx
                .query_row(
                    "SELECT attempts_made FROM retry_jobs WHERE sms_id = ?1",
                    params![sms_id],
                    |row| row.get(0),
                )
                .optional()?;
            let attempts_made = previous.unwrap_or(0).saturating_add(1);
            let stamp = ts(now);

            if policy.is_exhausted(attempts_made) {
                tx.execute("DELETE FROM retry_jobs WHERE sms_id = ?1", params![sms_id])?;
                tx.execute(
                    "UPDATE inbound_sms SET status = 'manual_review', failure_reason = ?1, updated_at = ?2
                     WHERE id = ?3 AND status NOT IN ('parsed', 'dismissed')",
                    params![reason, stamp, sms_id],
                )?;
                tx.commit()?;
                return Ok(RetryOutcome::Exhausted { attempts_made });
            }

            let next_attempt_at = now + chrono_delay(policy.delay_for(attempts_made));
            tx.execute(
                UPSERT_JOB,
                params![
                    sms_id,
                    attempts_made,
                    policy.max_attempts,
                    ts(next_attempt_at),
                    reason,
                    stamp,
                ],
            )?;
            tx.execute(
                "UPDATE inbound_sms SET status = 'error', failure_reason = ?1, updated_at = ?2
                 WHERE id = ?3 AND status NOT IN ('parsed', 'dismissed')",
                params![reason, stamp, sms_id],
            )?;
            tx.commit()?;
            Ok(RetryOutcome::Scheduled {
                attempts_made,
                next_attempt_at,
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Leases due jobs by pushing `next_attempt_at` forward. A crashed sweeper's
/// jobs come due again once the lease runs out.
pub async fn claim_due(
    db: &Database,
    now: DateTime<Utc>,
    limit: u32,
    lease: std::time::Duration,
) -> Result<Vec<RetryJob>, MomopayError> {
    let stamp = ts(now);
    let lease_until = ts(now + chrono_delay(lease));
    db.connection()
        .call(move |conn| -> Result<Vec<RetryJob>, rusqlite::Error> {
            let tx = conn.transaction()?;
            let jobs = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM retry_jobs WHERE next_attempt_at <= ?1
                     ORDER BY next_attempt_at ASC, sms_id ASC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![stamp, limit], job_from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            for job in &jobs {
                tx.execute(
                    "UPDATE retry_jobs SET next_attempt_at = ?1, updated_at = ?2 WHERE sms_id = ?3",
                    params![lease_until, stamp, job.sms_id],
                )?;
            }
            tx.commit()?;
            Ok(jobs)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, sms_id: &str) -> Result<Option<RetryJob>, MomopayError> {
    let sms_id = sms_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<RetryJob>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM retry_jobs WHERE sms_id = ?1"),
                params![sms_id],
                job_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list(db: &Database, limit: u32) -> Result<Vec<RetryJob>, MomopayError> {
    db.connection()
        .call(move |conn| -> Result<Vec<RetryJob>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {JOB_COLUMNS} FROM retry_jobs ORDER BY next_attempt_at ASC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], job_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count(db: &Database) -> Result<u64, MomopayError> {
    db.connection()
        .call(|conn| -> Result<u64, rusqlite::Error> {
            let n: i64 = conn.query_row("SELECT COUNT(*) FROM retry_jobs", [], |row| row.get(0))?;
            Ok(n.max(0) as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Operator-requested retry: the SMS goes back to `error` and its job is due now.
pub async fn requeue(
    db: &Database,
    sms_id: &str,
    from: &[SmsStatus],
    max_attempts: u32,
    entry: &AuditEntry,
    now: DateTime<Utc>,
) -> Result<Option<RetryJob>, MomopayError> {
    let sms_id = sms_id.to_string();
    let entry = entry.clone();
    let stamp = ts(now);
    let sms_sql = format!(
        "UPDATE inbound_sms SET status = 'error', failure_reason = 'manual retry requested',
             updated_at = ?1
         WHERE id = ?2 AND status IN ({})",
        status_list(from)
    );
    db.connection()
        .call(move |conn| -> Result<Option<RetryJob>, rusqlite::Error> {
            let tx = conn.transaction()?;
            if tx.execute(&sms_sql, params![stamp, sms_id])? != 1 {
                return Ok(None);
            }
            tx.execute(
                UPSERT_JOB,
                params![
                    sms_id,
                    0u32,
                    max_attempts,
                    stamp,
                    "manual retry requested",
                    stamp,
                ],
            )?;
            audit::insert_on(&tx, &entry, &stamp)?;
            let job = tx.query_row(
                &format!("SELECT {JOB_COLUMNS} FROM retry_jobs WHERE sms_id = ?1"),
                params![sms_id],
                job_from_row,
            )?;
            tx.commit()?;
            Ok(Some(job))
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::inbound_sms;
    use crate::queries::test_support::{new_sms, setup_db};
    use std::time::Duration;

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(1800),
        }
    }

    fn audit_entry(sms_id: &str) -> AuditEntry {
        AuditEntry {
            action: "sms.retry".into(),
            entity_type: "inbound_sms".into(),
            entity_id: sms_id.into(),
            actor_id: "op-1".into(),
            before: None,
            after: None,
        }
    }

    #[tokio::test]
    async fn failures_back_off_then_exhaust() {
        let (db, _dir) = setup_db().await;
        let sms_id = inbound_sms::insert(&db, &new_sms("r1", "x"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        let now = Utc::now();
        let policy = policy(3);

        let first = record_failure(&db, &sms_id, "timeout", &policy, now).await.unwrap();
        assert_eq!(
            first,
            RetryOutcome::Scheduled {
                attempts_made: 1,
                next_attempt_at: now + chrono::Duration::seconds(30),
            }
        );
        let second = record_failure(&db, &sms_id, "timeout", &policy, now).await.unwrap();
        assert!(matches!(
            second,
            RetryOutcome::Scheduled { attempts_made: 2, next_attempt_at } if next_attempt_at == now + chrono::Duration::seconds(60)
        ));
        let sms = inbound_sms::get(&db, &sms_id).await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::Error);

        let third = record_failure(&db, &sms_id, "timeout", &policy, now).await.unwrap();
        assert_eq!(third, RetryOutcome::Exhausted { attempts_made: 3 });
        assert!(get(&db, &sms_id).await.unwrap().is_none());
        let sms = inbound_sms::get(&db, &sms_id).await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::ManualReview);
        assert_eq!(sms.failure_reason.as_deref(), Some("timeout"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_due_leases_jobs() {
        let (db, _dir) = setup_db().await;
        let sms_id = inbound_sms::insert(&db, &new_sms("r2", "x"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        let now = Utc::now();
        record_failure(&db, &sms_id, "timeout", &policy(5), now).await.unwrap();

        assert!(claim_due(&db, now, 10, Duration::from_secs(300)).await.unwrap().is_empty());

        let later = now + chrono::Duration::seconds(31);
        let due = claim_due(&db, later, 10, Duration::from_secs(300)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].sms_id, sms_id);

        // Leased: not handed out again until the lease expires.
        assert!(claim_due(&db, later, 10, Duration::from_secs(300)).await.unwrap().is_empty());
        let after_lease = later + chrono::Duration::seconds(301);
        assert_eq!(
            claim_due(&db, after_lease, 10, Duration::from_secs(300))
                .await
                .unwrap()
                .len(),
            1
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn leaving_error_removes_job() {
        let (db, _dir) = setup_db().await;
        let sms_id = inbound_sms::insert(&db, &new_sms("r3", "x"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        record_failure(&db, &sms_id, "timeout", &policy(5), Utc::now())
            .await
            .unwrap();
        assert_eq!(count(&db).await.unwrap(), 1);

        inbound_sms::transition(
            &db,
            &sms_id,
            &[SmsStatus::Error],
            SmsStatus::ManualReview,
            Some("no candidates"),
            Utc::now(),
        )
        .await
        .unwrap();
        assert_eq!(count(&db).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn requeue_resets_attempts_and_audits() {
        let (db, _dir) = setup_db().await;
        let sms_id = inbound_sms::insert(&db, &new_sms("r4", "x"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        inbound_sms::transition(
            &db,
            &sms_id,
            &[SmsStatus::Received],
            SmsStatus::ManualReview,
            Some("ambiguous candidates"),
            Utc::now(),
        )
        .await
        .unwrap();

        let now = Utc::now();
        let job = requeue(&db, &sms_id, SmsStatus::REVIEWABLE, 5, &audit_entry(&sms_id), now)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.attempts_made, 0);
        assert_eq!(ts(job.next_attempt_at), ts(now));

        let sms = inbound_sms::get(&db, &sms_id).await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::Error);
        let audits = audit::list_for_entity(&db, "inbound_sms", &sms_id).await.unwrap();
        assert_eq!(audits.len(), 1);

        // A received SMS is not reviewable.
        let other = inbound_sms::insert(&db, &new_sms("r5", "y"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        let none = requeue(&db, &other, SmsStatus::REVIEWABLE, 5, &audit_entry(&other), now)
            .await
            .unwrap();
        assert!(none.is_none());
        db.close().await.unwrap();
    }
}
