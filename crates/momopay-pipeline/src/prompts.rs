// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Versioned parser prompts and dry runs against them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use momopay_core::types::{
    AuditEntry, ParseFailure, ParsedFields, ParserPrompt, PromptSpec,
};
use momopay_core::{MomopayError, PaymentParser, StorageAdapter};

/// What a dry run produced. Nothing is persisted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptTestResult {
    pub prompt_id: Option<String>,
    pub parsed: Option<ParsedFields>,
    pub failure: Option<ParseFailure>,
}

pub struct PromptService {
    storage: Arc<dyn StorageAdapter>,
    parser: Arc<dyn PaymentParser>,
}

impl PromptService {
    pub fn new(storage: Arc<dyn StorageAdapter>, parser: Arc<dyn PaymentParser>) -> Self {
        Self { storage, parser }
    }

    pub async fn list(&self) -> Result<Vec<ParserPrompt>, MomopayError> {
        self.storage.list_prompts().await
    }

    pub async fn active(&self) -> Result<Option<ParserPrompt>, MomopayError> {
        self.storage.active_prompt().await
    }

    /// Stores a new, inactive prompt version.
    pub async fn create(
        &self,
        label: &str,
        body: &str,
        version: Option<i64>,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ParserPrompt, MomopayError> {
        if label.trim().is_empty() || body.trim().is_empty() {
            return Err(MomopayError::Validation(
                "prompt label and body must not be empty".into(),
            ));
        }
        let prompt = self.storage.insert_prompt(label, body, version, now).await?;
        self.storage
            .record_audit(
                &AuditEntry {
                    action: "prompt.create".into(),
                    entity_type: "parser_prompt".into(),
                    entity_id: prompt.id.clone(),
                    actor_id: operator_id.into(),
                    before: None,
                    after: Some(json!({ "label": prompt.label, "version": prompt.version })),
                },
                now,
            )
            .await?;
        Ok(prompt)
    }

    /// Makes `id` the one active prompt.
    pub async fn activate(
        &self,
        id: &str,
        operator_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ParserPrompt, MomopayError> {
        let (previous, current) =
            self.storage
                .activate_prompt(id)
                .await?
                .ok_or_else(|| MomopayError::NotFound {
                    entity: "parser_prompt",
                    id: id.to_string(),
                })?;

        let snapshot = |p: &ParserPrompt| json!({ "id": p.id, "label": p.label, "version": p.version });
        self.storage
            .record_audit(
                &AuditEntry {
                    action: "prompt.activate".into(),
                    entity_type: "parser_prompt".into(),
                    entity_id: current.id.clone(),
                    actor_id: operator_id.into(),
                    before: previous.as_ref().map(snapshot),
                    after: Some(snapshot(&current)),
                },
                now,
            )
            .await?;
        info!(
            prompt_id = %current.id,
            version = current.version,
            previous = ?previous.as_ref().map(|p| p.id.as_str()),
            operator_id,
            "parser prompt activated"
        );
        Ok(current)
    }

    /// Parses `text` under a stored prompt, an ad-hoc body, or the active
    /// prompt, in that order of preference.
    pub async fn test(
        &self,
        text: &str,
        prompt_id: Option<&str>,
        prompt_body: Option<&str>,
    ) -> Result<PromptTestResult, MomopayError> {
        if text.trim().is_empty() {
            return Err(MomopayError::Validation("text must not be empty".into()));
        }
        let spec = match (prompt_id, prompt_body) {
            (_, Some(body)) => Some(PromptSpec {
                id: prompt_id.map(str::to_string),
                body: body.to_string(),
            }),
            (Some(id), None) => Some(
                self.storage
                    .get_prompt(id)
                    .await?
                    .ok_or_else(|| MomopayError::NotFound {
                        entity: "parser_prompt",
                        id: id.to_string(),
                    })?
                    .spec(),
            ),
            (None, None) => self.storage.active_prompt().await?.map(|p| p.spec()),
        };

        let prompt_id = spec.as_ref().and_then(|s| s.id.clone());
        Ok(match self.parser.parse(text, spec.as_ref()).await {
            Ok(fields) => PromptTestResult {
                prompt_id,
                parsed: Some(fields),
                failure: None,
            },
            Err(failure) => PromptTestResult {
                prompt_id,
                parsed: None,
                failure: Some(failure),
            },
        })
    }
}
