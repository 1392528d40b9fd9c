// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parsed payment records. One row per parser run.

use chrono::{DateTime, Utc};
use momopay_core::MomopayError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{PARSED_COLUMNS, ParsedFields, ParsedPayment, parsed_from_row, ts};

pub async fn insert(
    db: &Database,
    sms_id: &str,
    attempt: u32,
    fields: &ParsedFields,
    now: DateTime<Utc>,
) -> Result<ParsedPayment, MomopayError> {
    let id = uuid::Uuid::new_v4().to_string();
    let sms_id = sms_id.to_string();
    let fields = fields.clone();
    let now = ts(now);
    db.connection()
        .call(move |conn| -> Result<ParsedPayment, rusqlite::Error> {
            conn.execute(
                "INSERT INTO parsed_payments (id, sms_id, attempt, amount_minor, currency, reference,
                     payer_mask, occurred_at, confidence, parser_version, prompt_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    id,
                    sms_id,
                    attempt,
                    fields.amount_minor,
                    fields.currency,
                    fields.reference,
                    fields.payer_mask,
                    fields.occurred_at.map(ts),
                    fields.confidence,
                    fields.parser_version,
                    fields.prompt_id,
                    now,
                ],
            )?;
            conn.query_row(
                &format!("SELECT {PARSED_COLUMNS} FROM parsed_payments WHERE id = ?1"),
                params![id],
                parsed_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Highest attempt for the SMS.
pub async fn latest_for_sms(
    db: &Database,
    sms_id: &str,
) -> Result<Option<ParsedPayment>, MomopayError> {
    let sms_id = sms_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ParsedPayment>, rusqlite::Error> {
            conn.query_row(
                &format!(
                    "SELECT {PARSED_COLUMNS} FROM parsed_payments WHERE sms_id = ?1
                     ORDER BY attempt DESC, created_at DESC LIMIT 1"
                ),
                params![sms_id],
                parsed_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}
