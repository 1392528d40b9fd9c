// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Primary-then-pattern parser composition.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use momopay_core::types::{ParseFailure, ParsedFields, PromptSpec};
use momopay_core::{AdapterType, HealthStatus, MomopayError, PaymentParser, PluginAdapter};

use crate::pattern::PatternParser;

/// Runs the primary parser under a hard timeout and falls back to the
/// pattern parser when it fails or does not answer in time.
pub struct FallbackParser {
    primary: Arc<dyn PaymentParser>,
    fallback: PatternParser,
    timeout: Duration,
}

impl FallbackParser {
    pub fn new(primary: Arc<dyn PaymentParser>, fallback: PatternParser, timeout: Duration) -> Self {
        Self {
            primary,
            fallback,
            timeout,
        }
    }
}

#[async_trait]
impl PluginAdapter for FallbackParser {
    fn name(&self) -> &str {
        "fallback"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Parser
    }

    async fn health_check(&self) -> Result<HealthStatus, MomopayError> {
        // The pattern parser always answers, so a sick primary only degrades.
        match self.primary.health_check().await {
            Ok(HealthStatus::Healthy) => Ok(HealthStatus::Healthy),
            Ok(HealthStatus::Degraded(reason)) | Ok(HealthStatus::Unhealthy(reason)) => {
                Ok(HealthStatus::Degraded(reason))
            }
            Err(e) => Ok(HealthStatus::Degraded(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), MomopayError> {
        self.primary.shutdown().await
    }
}

#[async_trait]
impl PaymentParser for FallbackParser {
    async fn parse(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure> {
        match tokio::time::timeout(self.timeout, self.primary.parse(text, prompt)).await {
            Ok(Ok(fields)) => Ok(fields),
            Ok(Err(failure)) => {
                debug!(parser = self.primary.name(), kind = %failure.kind, "primary parser failed; using pattern parser");
                self.fallback.parse_text(text, prompt)
            }
            Err(_) => {
                warn!(
                    parser = self.primary.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "primary parser timed out; using pattern parser"
                );
                self.fallback.parse_text(text, prompt)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use momopay_config::model::ParserConfig;
    use momopay_core::types::ParseFailureKind;

    struct Scripted {
        delay: Duration,
        result: Result<ParsedFields, ParseFailure>,
    }

    #[async_trait]
    impl PluginAdapter for Scripted {
        fn name(&self) -> &str {
            "scripted"
        }
        fn version(&self) -> semver::Version {
            semver::Version::new(0, 0, 1)
        }
        fn adapter_type(&self) -> AdapterType {
            AdapterType::Parser
        }
        async fn health_check(&self) -> Result<HealthStatus, MomopayError> {
            Ok(HealthStatus::Unhealthy("down".into()))
        }
        async fn shutdown(&self) -> Result<(), MomopayError> {
            Ok(())
        }
    }

    #[async_trait]
    impl PaymentParser for Scripted {
        async fn parse(
            &self,
            _text: &str,
            _prompt: Option<&PromptSpec>,
        ) -> Result<ParsedFields, ParseFailure> {
            tokio::time::sleep(self.delay).await;
            self.result.clone()
        }
    }

    fn fields(version: &str) -> ParsedFields {
        ParsedFields {
            amount_minor: 777,
            currency: "RWF".into(),
            reference: "R1".into(),
            payer_mask: None,
            occurred_at: None,
            confidence: 0.9,
            parser_version: version.into(),
            prompt_id: None,
        }
    }

    fn compose(delay: Duration, result: Result<ParsedFields, ParseFailure>) -> FallbackParser {
        FallbackParser::new(
            Arc::new(Scripted { delay, result }),
            PatternParser::from_config(&ParserConfig::default()),
            Duration::from_millis(100),
        )
    }

    const TEXT: &str = "You have received 15000 RWF from 0788123456. TxId: ABC123";

    #[tokio::test]
    async fn primary_result_wins() {
        let parser = compose(Duration::ZERO, Ok(fields("openai:test")));
        let parsed = parser.parse(TEXT, None).await.unwrap();
        assert_eq!(parsed.parser_version, "openai:test");
    }

    #[tokio::test]
    async fn primary_failure_falls_back() {
        let parser = compose(
            Duration::ZERO,
            Err(ParseFailure::new(ParseFailureKind::InferenceUnavailable, "503")),
        );
        let parsed = parser.parse(TEXT, None).await.unwrap();
        assert_eq!(parsed.parser_version, "pattern:v1");
        assert_eq!(parsed.amount_minor, 15000);
    }

    #[tokio::test]
    async fn primary_timeout_falls_back() {
        let parser = compose(Duration::from_secs(5), Ok(fields("openai:test")));
        let parsed = parser.parse(TEXT, None).await.unwrap();
        assert_eq!(parsed.parser_version, "pattern:v1");
    }

    #[tokio::test]
    async fn both_failing_reports_pattern_failure() {
        let parser = compose(
            Duration::ZERO,
            Err(ParseFailure::new(ParseFailureKind::InferenceUnavailable, "503")),
        );
        let failure = parser.parse("hello there", None).await.unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::UnrecognizedFormat);
    }

    #[tokio::test]
    async fn unhealthy_primary_only_degrades() {
        let parser = compose(Duration::ZERO, Ok(fields("x")));
        assert!(matches!(
            parser.health_check().await.unwrap(),
            HealthStatus::Degraded(_)
        ));
    }
}
