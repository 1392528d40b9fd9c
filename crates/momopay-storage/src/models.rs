// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Row mapping between SQLite and the domain types in `momopay-core`.
//!
//! Timestamps are fixed-width RFC 3339 UTC text with millisecond precision, so
//! comparing the strings compares the instants.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use rusqlite::types::Type;

pub use momopay_core::types::{
    AuditEntry, AuditRecord, InboundSms, ParsedFields, ParsedPayment, ParserPrompt, PaymentIntent,
    RetryJob,
};

/// Formats a timestamp for storage.
pub fn ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
}

pub(crate) fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

pub(crate) fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_err(idx, e))
    })
    .transpose()
}

pub(crate) fn enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: String = row.get(idx)?;
    T::from_str(&raw).map_err(|e| conversion_err(idx, e))
}

pub(crate) fn opt_enum_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr<Err = strum::ParseError>,
{
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| T::from_str(&raw).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

/// Renders statuses as a SQL `IN (...)` body. Status names are fixed
/// snake_case identifiers, never user input.
pub(crate) fn status_list<T: std::fmt::Display>(statuses: &[T]) -> String {
    if statuses.is_empty() {
        return "NULL".to_string();
    }
    statuses
        .iter()
        .map(|s| format!("'{s}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub(crate) const SMS_COLUMNS: &str = "id, raw_text, from_msisdn, to_msisdn, received_at, \
     modem_id, sim_slot, status, dedup_key, failure_reason, intent_id, parsed_payment_id, \
     resolution, resolution_note, created_at, updated_at";

pub(crate) fn sms_from_row(row: &Row<'_>) -> rusqlite::Result<InboundSms> {
    Ok(InboundSms {
        id: row.get(0)?,
        raw_text: row.get(1)?,
        from_msisdn: row.get(2)?,
        to_msisdn: row.get(3)?,
        received_at: ts_col(row, 4)?,
        modem_id: row.get(5)?,
        sim_slot: row.get(6)?,
        status: enum_col(row, 7)?,
        dedup_key: row.get(8)?,
        failure_reason: row.get(9)?,
        intent_id: row.get(10)?,
        parsed_payment_id: row.get(11)?,
        resolution: opt_enum_col(row, 12)?,
        resolution_note: row.get(13)?,
        created_at: ts_col(row, 14)?,
        updated_at: ts_col(row, 15)?,
    })
}

pub(crate) const PARSED_COLUMNS: &str = "id, sms_id, attempt, amount_minor, currency, reference, \
     payer_mask, occurred_at, confidence, parser_version, prompt_id, created_at";

pub(crate) fn parsed_from_row(row: &Row<'_>) -> rusqlite::Result<ParsedPayment> {
    Ok(ParsedPayment {
        id: row.get(0)?,
        sms_id: row.get(1)?,
        attempt: row.get(2)?,
        fields: ParsedFields {
            amount_minor: row.get(3)?,
            currency: row.get(4)?,
            reference: row.get(5)?,
            payer_mask: row.get(6)?,
            occurred_at: opt_ts_col(row, 7)?,
            confidence: row.get(8)?,
            parser_version: row.get(9)?,
            prompt_id: row.get(10)?,
        },
        created_at: ts_col(row, 11)?,
    })
}

pub(crate) const INTENT_COLUMNS: &str = "id, expected_amount_minor, currency, kind, \
     owner_reference, status, created_at, expires_at, confirmed_sms_id, suggested_sms_id, updated_at";

pub(crate) fn intent_from_row(row: &Row<'_>) -> rusqlite::Result<PaymentIntent> {
    Ok(PaymentIntent {
        id: row.get(0)?,
        expected_amount_minor: row.get(1)?,
        currency: row.get(2)?,
        kind: enum_col(row, 3)?,
        owner_reference: row.get(4)?,
        status: enum_col(row, 5)?,
        created_at: ts_col(row, 6)?,
        expires_at: opt_ts_col(row, 7)?,
        confirmed_sms_id: row.get(8)?,
        suggested_sms_id: row.get(9)?,
        updated_at: ts_col(row, 10)?,
    })
}

pub(crate) const JOB_COLUMNS: &str = "sms_id, attempts_made, max_attempts, next_attempt_at, \
     last_failure_reason, created_at, updated_at";

pub(crate) fn job_from_row(row: &Row<'_>) -> rusqlite::Result<RetryJob> {
    Ok(RetryJob {
        sms_id: row.get(0)?,
        attempts_made: row.get(1)?,
        max_attempts: row.get(2)?,
        next_attempt_at: ts_col(row, 3)?,
        last_failure_reason: row.get(4)?,
        created_at: ts_col(row, 5)?,
        updated_at: ts_col(row, 6)?,
    })
}

pub(crate) const PROMPT_COLUMNS: &str = "id, label, body, version, is_active, created_at";

pub(crate) fn prompt_from_row(row: &Row<'_>) -> rusqlite::Result<ParserPrompt> {
    Ok(ParserPrompt {
        id: row.get(0)?,
        label: row.get(1)?,
        body: row.get(2)?,
        version: row.get(3)?,
        is_active: row.get(4)?,
        created_at: ts_col(row, 5)?,
    })
}

fn json_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<serde_json::Value>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| serde_json::from_str(&raw).map_err(|e| conversion_err(idx, e)))
        .transpose()
}

pub(crate) fn audit_from_row(row: &Row<'_>) -> rusqlite::Result<AuditRecord> {
    Ok(AuditRecord {
        id: row.get(0)?,
        entry: AuditEntry {
            action: row.get(1)?,
            entity_type: row.get(2)?,
            entity_id: row.get(3)?,
            actor_id: row.get(4)?,
            before: json_col(row, 5)?,
            after: json_col(row, 6)?,
        },
        created_at: ts_col(row, 7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use momopay_core::SmsStatus;

    #[test]
    fn timestamps_are_fixed_width_and_ordered() {
        let a = Utc.with_ymd_and_hms(2026, 3, 1, 9, 5, 0).unwrap();
        let b = a + chrono::Duration::milliseconds(1500);
        assert_eq!(ts(a), "2026-03-01T09:05:00.000Z");
        assert_eq!(ts(b), "2026-03-01T09:05:01.500Z");
        assert!(ts(a) < ts(b));
    }

    #[test]
    fn status_list_quotes_each_status() {
        assert_eq!(
            status_list(&[SmsStatus::Received, SmsStatus::Error]),
            "'received', 'error'"
        );
        assert_eq!(status_list::<SmsStatus>(&[]), "NULL");
    }
}
