// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inbound SMS persistence.

use chrono::{DateTime, Utc};
use momopay_core::types::{DismissResolution, NewInboundSms, SmsInsert, SmsStatus};
use momopay_core::MomopayError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{AuditEntry, InboundSms, SMS_COLUMNS, sms_from_row, status_list, ts};
use crate::queries::audit;

/// Inserts an SMS, or returns the existing row's id when the dedup key is taken.
pub async fn insert(
    db: &Database,
    sms: &NewInboundSms,
    now: DateTime<Utc>,
) -> Result<SmsInsert, MomopayError> {
    let sms = sms.clone();
    let id = uuid::Uuid::new_v4().to_string();
    let now = ts(now);
    db.connection()
        .call(move |conn| -> Result<SmsInsert, rusqlite::Error> {
            let changed = conn.execute(
                "INSERT INTO inbound_sms (id, dedup_key, raw_text, from_msisdn, to_msisdn,
                     received_at, modem_id, sim_slot, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'received', ?9, ?9)
                 ON CONFLICT(dedup_key) DO NOTHING",
                params![
                    id,
                    sms.dedup_key,
                    sms.raw_text,
                    sms.from_msisdn,
                    sms.to_msisdn,
                    ts(sms.received_at),
                    sms.modem_id,
                    sms.sim_slot,
                    now,
                ],
            )?;
            if changed == 1 {
                return Ok(SmsInsert {
                    sms_id: id,
                    created: true,
                });
            }
            let existing: String = conn.query_row(
                "SELECT id FROM inbound_sms WHERE dedup_key = ?1",
                params![sms.dedup_key],
                |row| row.get(0),
            )?;
            Ok(SmsInsert {
                sms_id: existing,
                created: false,
            })
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<InboundSms>, MomopayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<InboundSms>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {SMS_COLUMNS} FROM inbound_sms WHERE id = ?1"),
                params![id],
                sms_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently received first.
pub async fn list_recent(db: &Database, limit: u32) -> Result<Vec<InboundSms>, MomopayError> {
    db.connection()
        .call(move |conn| -> Result<Vec<InboundSms>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SMS_COLUMNS} FROM inbound_sms ORDER BY created_at DESC, id DESC LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit], sms_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Most recently updated first.
pub async fn list_by_status(
    db: &Database,
    statuses: &[SmsStatus],
    limit: u32,
) -> Result<Vec<InboundSms>, MomopayError> {
    let sql = format!(
        "SELECT {SMS_COLUMNS} FROM inbound_sms WHERE status IN ({})
         ORDER BY updated_at DESC, id DESC LIMIT ?1",
        status_list(statuses)
    );
    db.connection()
        .call(move |conn| -> Result<Vec<InboundSms>, rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params![limit], sms_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// `received` SMS last touched before `older_than`, oldest first.
pub async fn list_stale_received(
    db: &Database,
    older_than: DateTime<Utc>,
    limit: u32,
) -> Result<Vec<InboundSms>, MomopayError> {
    let cutoff = ts(older_than);
    db.connection()
        .call(move |conn| -> Result<Vec<InboundSms>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SMS_COLUMNS} FROM inbound_sms
                 WHERE status = 'received' AND updated_at < ?1
                 ORDER BY updated_at ASC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![cutoff, limit], sms_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

/// Conditional status change. Leaving the retry path drops the retry job.
pub async fn transition(
    db: &Database,
    id: &str,
    from: &[SmsStatus],
    to: SmsStatus,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> Result<bool, MomopayError> {
    let id = id.to_string();
    let reason = reason.map(str::to_string);
    let now = ts(now);
    let sql = format!(
        "UPDATE inbound_sms
         SET status = ?1, failure_reason = COALESCE(?2, failure_reason), updated_at = ?3
         WHERE id = ?4 AND status IN ({})",
        status_list(from)
    );
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(&sql, params![to.to_string(), reason, now, id])?;
            if changed == 1 && to != SmsStatus::Error {
                tx.execute("DELETE FROM retry_jobs WHERE sms_id = ?1", params![id])?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Terminal dismissal with its audit row, in one transaction.
pub async fn dismiss(
    db: &Database,
    id: &str,
    from: &[SmsStatus],
    resolution: DismissResolution,
    note: Option<&str>,
    entry: &AuditEntry,
    now: DateTime<Utc>,
) -> Result<bool, MomopayError> {
    let id = id.to_string();
    let note = note.map(str::to_string);
    let entry = entry.clone();
    let now = ts(now);
    let sql = format!(
        "UPDATE inbound_sms
         SET status = 'dismissed', resolution = ?1, resolution_note = ?2, updated_at = ?3
         WHERE id = ?4 AND status IN ({})",
        status_list(from)
    );
    db.connection()
        .call(move |conn| -> Result<bool, rusqlite::Error> {
            let tx = conn.transaction()?;
            let changed = tx.execute(&sql, params![resolution.to_string(), note, now, id])?;
            if changed == 1 {
                tx.execute("DELETE FROM retry_jobs WHERE sms_id = ?1", params![id])?;
                audit::insert_on(&tx, &entry, &now)?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}
