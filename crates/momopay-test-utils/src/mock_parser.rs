// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted parser for deterministic pipeline tests.
//!
//! `MockParser` implements `PaymentParser` with pre-configured results,
//! so tests can drive confidence, failure kinds, and retries precisely.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use momopay_core::types::{
    AdapterType, HealthStatus, ParseFailure, ParseFailureKind, ParsedFields, PromptSpec,
};
use momopay_core::{MomopayError, PaymentParser, PluginAdapter};

/// A parser that returns queued results in order.
///
/// When the queue is empty every call fails with `unrecognized_format`.
/// Every text it was asked to parse is recorded.
pub struct MockParser {
    results: Arc<Mutex<VecDeque<Result<ParsedFields, ParseFailure>>>>,
    seen: Arc<Mutex<Vec<(String, Option<PromptSpec>)>>>,
}

impl MockParser {
    pub fn new() -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::new())),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_results(results: Vec<Result<ParsedFields, ParseFailure>>) -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::from(results))),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn push(&self, result: Result<ParsedFields, ParseFailure>) {
        self.results.lock().await.push_back(result);
    }

    /// Texts and prompts passed to `parse`, oldest first.
    pub async fn seen(&self) -> Vec<(String, Option<PromptSpec>)> {
        self.seen.lock().await.clone()
    }

    /// A confident RWF result with the given amount and reference.
    pub fn fields(amount_minor: i64, reference: &str, confidence: f64) -> ParsedFields {
        ParsedFields {
            amount_minor,
            currency: "RWF".to_string(),
            reference: reference.to_string(),
            payer_mask: None,
            occurred_at: None,
            confidence,
            parser_version: "mock:v1".to_string(),
            prompt_id: None,
        }
    }
}

impl Default for MockParser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockParser {
    fn name(&self) -> &str {
        "mock-parser"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Parser
    }

    async fn health_check(&self) -> Result<HealthStatus, MomopayError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MomopayError> {
        Ok(())
    }
}

#[async_trait]
impl PaymentParser for MockParser {
    async fn parse(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure> {
        self.seen
            .lock()
            .await
            .push((text.to_string(), prompt.cloned()));
        let mut result = self.results.lock().await.pop_front().unwrap_or_else(|| {
            Err(ParseFailure::new(
                ParseFailureKind::UnrecognizedFormat,
                "mock parser queue empty",
            ))
        });
        if let Ok(fields) = result.as_mut() {
            fields.prompt_id = prompt.and_then(|p| p.id.clone());
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn results_are_returned_in_order_then_fail() {
        let parser = MockParser::with_results(vec![Ok(MockParser::fields(100, "R1", 0.9))]);
        assert_eq!(parser.parse("a", None).await.unwrap().amount_minor, 100);
        let failure = parser.parse("b", None).await.unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::UnrecognizedFormat);
        let seen = parser.seen().await;
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].0, "b");
    }

    #[tokio::test]
    async fn prompt_id_is_recorded() {
        let parser = MockParser::new();
        parser.push(Ok(MockParser::fields(100, "R1", 0.9))).await;
        let spec = PromptSpec {
            id: Some("p1".into()),
            body: "extract".into(),
        };
        let parsed = parser.parse("a", Some(&spec)).await.unwrap();
        assert_eq!(parsed.prompt_id.as_deref(), Some("p1"));
    }
}
