// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment intent persistence and the atomic claim.

use chrono::{DateTime, Utc};
use momopay_core::MomopayError;
use momopay_core::types::{
    ClaimOutcome, IntentClaim, IntentStatus, NewPaymentIntent, SmsStatus,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{INTENT_COLUMNS, PaymentIntent, enum_col, intent_from_row, status_list, ts};
use crate::queries::audit;

pub async fn insert(
    db: &Database,
    intent: &NewPaymentIntent,
    now: DateTime<Utc>,
) -> Result<PaymentIntent, MomopayError> {
    let id = uuid::Uuid::new_v4().to_string();
    let intent = intent.clone();
    let now = ts(now);
    db.connection()
        .call(move |conn| -> Result<PaymentIntent, rusqlite::Error> {
            conn.execute(
                "INSERT INTO payment_intents (id, expected_amount_minor, currency, kind,
                     owner_reference, status, created_at, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?6)",
                params![
                    id,
                    intent.expected_amount_minor,
                    intent.currency,
                    intent.kind.to_string(),
                    intent.owner_reference,
                    now,
                    intent.expires_at.map(ts),
                ],
            )?;
            conn.query_row(
                &format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = ?1"),
                params![id],
                intent_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<PaymentIntent>, MomopayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<PaymentIntent>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {INTENT_COLUMNS} FROM payment_intents WHERE id = ?1"),
                params![id],
                intent_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Candidate lookup for the matcher, oldest intent first.
pub async fn find_pending_by_amount_range(
    db: &Database,
    currency: &str,
    min: i64,
    max: i64,
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<Vec<PaymentIntent>, MomopayError> {
    let currency = currency.to_string();
    let since = ts(since);
    let now = ts(now);
    db.connection()
        .call(move |conn| -> Result<Vec<PaymentIntent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INTENT_COLUMNS} FROM payment_intents
                 WHERE status = 'pending'
                   AND currency = ?1
                   AND expected_amount_minor BETWEEN ?2 AND ?3
                   AND created_at >= ?4
                   AND (expires_at IS NULL OR expires_at > ?5)
                 ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map(params![currency, min, max, since, now], intent_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently updated first.
pub async fn list_by_status(
    db: &Database,
    status: IntentStatus,
    limit: u32,
) -> Result<Vec<PaymentIntent>, MomopayError> {
    db.connection()
        .call(move |conn| -> Result<Vec<PaymentIntent>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {INTENT_COLUMNS} FROM payment_intents WHERE status = ?1
                 ORDER BY updated_at DESC, id DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![status.to_string(), limit], intent_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn conditional_transition(
    db: &Database,
    id: &str,
    from: &[IntentStatus],
    to: IntentStatus,
    suggested_sms_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, MomopayError> {
    let id = id.to_string();
    let suggested = suggested_sms_id.map(str::to_string);
    let now = ts(now);
    let sql = format!(
        "UPDATE payment_intents
         SET status = ?1, suggested_sms_id = COALESCE(?2, suggested_sms_id), updated_at = ?3
         WHERE id = ?4 AND status IN ({})",
        status_list(from)
    );
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let changed = conn.execute(&sql, params![to.to_string(), suggested, now, id])?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Confirms the intent and resolves the SMS together, or changes nothing.
pub async fn claim(
    db: &Database,
    claim: &IntentClaim,
    now: DateTime<Utc>,
) -> Result<ClaimOutcome, MomopayError> {
    let claim = claim.clone();
    let now = ts(now);
    let intent_sql = format!(
        "UPDATE payment_intents
         SET status = 'confirmed', confirmed_sms_id = ?1, updated_at = ?2
         WHERE id = ?3 AND status IN ({})",
        status_list(&claim.intent_from)
    );
    let sms_sql = format!(
        "UPDATE inbound_sms
         SET status = 'parsed', intent_id = ?1,
             parsed_payment_id = COALESCE(?2, parsed_payment_id),
             failure_reason = NULL, updated_at = ?3
         WHERE id = ?4 AND status IN ({})",
        status_list(&claim.sms_from)
    );
    db.connection()
        .call(move |conn| -> Result<ClaimOutcome, rusqlite::Error> {
            let tx = conn.transaction()?;
            let intent_changed =
                tx.execute(&intent_sql, params![claim.sms_id, now, claim.intent_id])?;
            if intent_changed != 1 {
                let status: Option<IntentStatus> = tx
                    .query_row(
                        "SELECT status FROM payment_intents WHERE id = ?1",
                        params![claim.intent_id],
                        |row| enum_col(row, 0),
                    )
                    .optional()?;
                return Ok(ClaimOutcome::IntentNotClaimable { status });
            }

            let sms_changed = tx.execute(
                &sms_sql,
                params![claim.intent_id, claim.parsed_payment_id, now, claim.sms_id],
            )?;
            if sms_changed != 1 {
                let status: Option<SmsStatus> = tx
                    .query_row(
                        "SELECT status FROM inbound_sms WHERE id = ?1",
                        params![claim.sms_id],
                        |row| enum_col(row, 0),
                    )
                    .optional()?;
                tx.rollback()?;
                return Ok(ClaimOutcome::SmsNotClaimable { status });
            }

            tx.execute(
                "DELETE FROM retry_jobs WHERE sms_id = ?1",
                params![claim.sms_id],
            )?;
            if let Some(entry) = &claim.audit {
                audit::insert_on(&tx, entry, &now)?;
            }
            tx.commit()?;
            Ok(ClaimOutcome::Claimed)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::inbound_sms;
    use crate::queries::test_support::{new_intent, new_sms, setup_db};

    fn claim_for(intent_id: &str, sms_id: &str) -> IntentClaim {
        IntentClaim {
            intent_id: intent_id.to_string(),
            sms_id: sms_id.to_string(),
            parsed_payment_id: None,
            intent_from: vec![IntentStatus::Pending],
            sms_from: SmsStatus::PROCESSABLE.to_vec(),
            audit: None,
        }
    }

    #[tokio::test]
    async fn amount_range_excludes_expired_and_other_currencies() {
        let (db, _dir) = setup_db().await;
        let now = Utc::now();
        let ok = insert(&db, &new_intent(5000, "RWF"), now).await.unwrap();
        insert(&db, &new_intent(5000, "UGX"), now).await.unwrap();
        insert(&db, &new_intent(9000, "RWF"), now).await.unwrap();
        let mut expired = new_intent(5000, "RWF");
        expired.expires_at = Some(now - chrono::Duration::minutes(1));
        insert(&db, &expired, now).await.unwrap();

        let found = find_pending_by_amount_range(
            &db,
            "RWF",
            4500,
            5500,
            now - chrono::Duration::hours(48),
            now,
        )
        .await
        .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ok.id);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_confirms_intent_and_resolves_sms() {
        let (db, _dir) = setup_db().await;
        let intent = insert(&db, &new_intent(5000, "RWF"), Utc::now()).await.unwrap();
        let sms_id = inbound_sms::insert(&db, &new_sms("c1", "x"), Utc::now())
            .await
            .unwrap()
            .sms_id;

        let outcome = claim(&db, &claim_for(&intent.id, &sms_id), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::Claimed);

        let intent = get(&db, &intent.id).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Confirmed);
        assert_eq!(intent.confirmed_sms_id.as_deref(), Some(sms_id.as_str()));
        let sms = inbound_sms::get(&db, &sms_id).await.unwrap().unwrap();
        assert_eq!(sms.status, SmsStatus::Parsed);
        assert_eq!(sms.intent_id.as_deref(), Some(intent.id.as_str()));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn second_claim_on_same_intent_loses() {
        let (db, _dir) = setup_db().await;
        let intent = insert(&db, &new_intent(5000, "RWF"), Utc::now()).await.unwrap();
        let a = inbound_sms::insert(&db, &new_sms("a", "a"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        let b = inbound_sms::insert(&db, &new_sms("b", "b"), Utc::now())
            .await
            .unwrap()
            .sms_id;

        claim(&db, &claim_for(&intent.id, &a), Utc::now()).await.unwrap();
        let lost = claim(&db, &claim_for(&intent.id, &b), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            lost,
            ClaimOutcome::IntentNotClaimable {
                status: Some(IntentStatus::Confirmed)
            }
        );
        let b = inbound_sms::get(&db, &b).await.unwrap().unwrap();
        assert_eq!(b.status, SmsStatus::Received);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_rolls_back_when_sms_moved_on() {
        let (db, _dir) = setup_db().await;
        let intent = insert(&db, &new_intent(5000, "RWF"), Utc::now()).await.unwrap();
        let sms_id = inbound_sms::insert(&db, &new_sms("d", "d"), Utc::now())
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

        let outcome = claim(&db, &claim_for(&intent.id, &sms_id), Utc::now())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            ClaimOutcome::SmsNotClaimable {
                status: Some(SmsStatus::ManualReview)
            }
        );
        let intent = get(&db, &intent.id).await.unwrap().unwrap();
        assert_eq!(intent.status, IntentStatus::Pending);
        assert!(intent.confirmed_sms_id.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_intent_reports_no_status() {
        let (db, _dir) = setup_db().await;
        let sms_id = inbound_sms::insert(&db, &new_sms("e", "e"), Utc::now())
            .await
            .unwrap()
            .sms_id;
        let outcome = claim(&db, &claim_for("nope", &sms_id), Utc::now())
            .await
            .unwrap();
        assert_eq!(outcome, ClaimOutcome::IntentNotClaimable { status: None });
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn conditional_transition_records_suggestion() {
        let (db, _dir) = setup_db().await;
        let intent = insert(&db, &new_intent(5000, "RWF"), Utc::now()).await.unwrap();
        let moved = conditional_transition(
            &db,
            &intent.id,
            &[IntentStatus::Pending],
            IntentStatus::ManualReview,
            Some("sms-1"),
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(moved);
        let again = conditional_transition(
            &db,
            &intent.id,
            &[IntentStatus::Pending],
            IntentStatus::Failed,
            None,
            Utc::now(),
        )
        .await
        .unwrap();
        assert!(!again);

        let listed = list_by_status(&db, IntentStatus::ManualReview, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].suggested_sms_id.as_deref(), Some("sms-1"));
        db.close().await.unwrap();
    }
}
