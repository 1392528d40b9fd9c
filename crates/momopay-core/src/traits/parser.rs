// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parser capability for turning SMS text into payment fields.

use async_trait::async_trait;

use crate::traits::adapter::PluginAdapter;
use crate::types::{ParseFailure, ParsedFields, PromptSpec};

/// Extracts payment fields from masked SMS text.
///
/// Implementations are interchangeable: a deterministic pattern parser and an
/// inference-backed parser both satisfy this contract. A supplied prompt is a
/// dry-run input and never changes which prompt is active.
#[async_trait]
pub trait PaymentParser: PluginAdapter {
    async fn parse(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure>;
}
