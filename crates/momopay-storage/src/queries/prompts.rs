// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned parser prompts.

use chrono::{DateTime, Utc};
use momopay_core::MomopayError;
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};
use crate::models::{PROMPT_COLUMNS, ParserPrompt, prompt_from_row, ts};

/// Highest version first.
pub async fn list(db: &Database) -> Result<Vec<ParserPrompt>, MomopayError> {
    db.connection()
        .call(|conn| -> Result<Vec<ParserPrompt>, rusqlite::Error> {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROMPT_COLUMNS} FROM parser_prompts ORDER BY version DESC, created_at DESC"
            ))?;
            let rows = stmt.query_map([], prompt_from_row)?;
            rows.collect()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<ParserPrompt>, MomopayError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| -> Result<Option<ParserPrompt>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {PROMPT_COLUMNS} FROM parser_prompts WHERE id = ?1"),
                params![id],
                prompt_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn active(db: &Database) -> Result<Option<ParserPrompt>, MomopayError> {
    db.connection()
        .call(|conn| -> Result<Option<ParserPrompt>, rusqlite::Error> {
            conn.query_row(
                &format!("SELECT {PROMPT_COLUMNS} FROM parser_prompts WHERE is_active = 1"),
                [],
                prompt_from_row,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// New prompts start inactive.
pub async fn insert(
    db: &Database,
    label: &str,
    body: &str,
    version: Option<i64>,
    now: DateTime<Utc>,
) -> Result<ParserPrompt, MomopayError> {
    let id = uuid::Uuid::new_v4().to_string();
    let label = label.to_string();
    let body = body.to_string();
    let now = ts(now);
    db.connection()
        .call(move |conn| -> Result<ParserPrompt, rusqlite::Error> {
            let version = match version {
                Some(v) => v,
                None => conn.query_row(
                    "SELECT COALESCE(MAX(version), 0) + 1 FROM parser_prompts",
                    [],
                    |row| row.get(0),
                )?,
            };
            conn.execute(
                "INSERT INTO parser_prompts (id, label, body, version, is_active, created_at)
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![id, label, body, version, now],
            )?;
            conn.query_row(
                &format!("SELECT {PROMPT_COLUMNS} FROM parser_prompts WHERE id = ?1"),
                params![id],
                prompt_from_row,
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Switches the active prompt. `None` if `id` does not exist, in which case
/// the current active prompt is left alone.
pub async fn activate(
    db: &Database,
    id: &str,
) -> Result<Option<(Option<ParserPrompt>, ParserPrompt)>, MomopayError> {
    let id = id.to_string();
    db.connection()
        .call(
            move |conn| -> Result<Option<(Option<ParserPrompt>, ParserPrompt)>, rusqlite::Error> {
                let tx = conn.transaction()?;
                let exists: bool = tx.query_row(
                    "SELECT EXISTS(SELECT 1 FROM parser_prompts WHERE id = ?1)",
                    params![id],
                    |row| row.get(0),
                )?;
                if !exists {
                    return Ok(None);
                }
                let previous = tx
                    .query_row(
                        &format!("SELECT {PROMPT_COLUMNS} FROM parser_prompts WHERE is_active = 1"),
                        [],
                        prompt_from_row,
                    )
                    .optional()?;
                tx.execute("UPDATE parser_prompts SET is_active = 0 WHERE is_active = 1", [])?;
                tx.execute(
                    "UPDATE parser_prompts SET is_active = 1 WHERE id = ?1",
                    params![id],
                )?;
                let current = tx.query_row(
                    &format!("SELECT {PROMPT_COLUMNS} FROM parser_prompts WHERE id = ?1"),
                    params![id],
                    prompt_from_row,
                )?;
                tx.commit()?;
                Ok(Some((previous, current)))
            },
        )
        .await
        .map_err(map_tr_err)
}
