// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Append-only audit log for operator actions.

use chrono::{DateTime, Utc};
use momopay_core::MomopayError;
use rusqlite::params;

use crate::database::{Database, map_tr_err};
use crate::models::{AuditEntry, AuditRecord, audit_from_row, ts};

/// Writes an audit row on an open connection or transaction.
pub(crate) fn insert_on(
    conn: &rusqlite::Connection,
    entry: &AuditEntry,
    now: &str,
) -> Result<(), rusqlite::Error> {
    let before = entry.before.as_ref().map(|v| v.to_string());
    let after = entry.after.as_ref().map(|v| v.to_string());
    conn.execute(
        "INSERT INTO audit_log (action, entity_type, entity_id, actor_id, before_json, after_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            entry.action,
            entry.entity_type,
            entry.entity_id,
            entry.actor_id,
            before,
            after,
            now,
        ],
    )?;
    Ok(())
}

pub async fn record(
    db: &Database,
    entry: &AuditEntry,
    now: DateTime<Utc>,
) -> Result<(), MomopayError> {
    let entry = entry.clone();
    let now = ts(now);
    db.connection()
        .call(move |conn| -> Result<(), rusqlite::Error> { insert_on(conn, &entry, &now) })
        .await
        .map_err(map_tr_err)
}

/// Audit rows for one entity, oldest first.
pub async fn list_for_entity(
    db: &Database,
    entity_type: &str,
    entity_id: &str,
) -> Result<Vec<AuditRecord>, MomopayError> {
    let entity_type = entity_type.to_string();
    let entity_id = entity_id.to_string();
    db.connection()
        .call(move |conn| -> Result<Vec<AuditRecord>, rusqlite::Error> {
            let mut stmt = conn.prepare(
                "SELECT id, action, entity_type, entity_id, actor_id, before_json, after_json, created_at
                 FROM audit_log WHERE entity_type = ?1 AND entity_id = ?2 ORDER BY id ASC",
            )?;
            let rows = stmt.query_map(params![entity_type, entity_id], audit_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}
