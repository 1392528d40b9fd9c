// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Inference-backed parser over an OpenAI-compatible chat completions API.
//!
//! The SMS text is MSISDN-redacted before it leaves the process. Any failure
//! (transport, non-2xx, malformed output) is reported as
//! [`ParseFailureKind::InferenceUnavailable`] so the caller can fall back to
//! the pattern parser.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use momopay_config::model::ParserConfig;
use momopay_core::types::{ParseFailure, ParseFailureKind, ParsedFields, PromptSpec};
use momopay_core::{AdapterType, HealthStatus, MomopayError, PaymentParser, PluginAdapter};
use momopay_security::{MsisdnRedactor, mask_msisdn};

use crate::pattern::to_minor_units;

/// Used when no prompt is active.
pub const DEFAULT_PROMPT: &str = "Extract mobile-money payment details from the SMS into strict JSON \
with fields: amount (number, major units), currency (ISO code), payer_mask (masked phone number), \
ref (transaction reference), timestamp (ISO 8601, if present), confidence (0..1). \
Respond with the JSON object only.";

// --- Wire types ---

#[derive(Debug, Clone, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    response_format: ResponseFormat,
    temperature: f32,
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// The JSON object the model is asked to produce.
#[derive(Debug, Default, Deserialize)]
struct Extraction {
    amount: Option<serde_json::Value>,
    currency: Option<String>,
    payer_mask: Option<String>,
    #[serde(alias = "reference")]
    r#ref: Option<String>,
    timestamp: Option<String>,
    confidence: Option<f64>,
}

fn unavailable(detail: impl Into<String>) -> ParseFailure {
    ParseFailure::new(ParseFailureKind::InferenceUnavailable, detail)
}

/// OpenAI-compatible inference parser.
#[derive(Debug, Clone)]
pub struct InferenceParser {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    home_currency: String,
    exponents: BTreeMap<String, u32>,
    redactor: MsisdnRedactor,
}

impl InferenceParser {
    pub fn new(
        base_url: &str,
        api_key: &str,
        model: impl Into<String>,
        timeout: Duration,
        home_currency: impl Into<String>,
        exponents: BTreeMap<String, u32>,
    ) -> Result<Self, MomopayError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| MomopayError::Config(format!("invalid API key header value: {e}")))?,
        );
        headers.insert("content-type", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| MomopayError::Parser {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: model.into(),
            home_currency: home_currency.into().to_ascii_uppercase(),
            exponents,
            redactor: MsisdnRedactor::default(),
        })
    }

    /// `None` when inference is disabled or has no API key.
    pub fn from_config(config: &ParserConfig) -> Result<Option<Self>, MomopayError> {
        let inference = &config.inference;
        if !inference.enabled {
            return Ok(None);
        }
        let Some(api_key) = inference.api_key.as_deref() else {
            warn!("inference parser enabled without an API key; using pattern parser only");
            return Ok(None);
        };
        Self::new(
            &inference.base_url,
            api_key,
            inference.model.clone(),
            inference.timeout(),
            config.home_currency.clone(),
            config.currency_exponents.clone(),
        )
        .map(Some)
    }

    fn parser_version(&self, prompt: Option<&PromptSpec>) -> String {
        match prompt {
            Some(PromptSpec { id: Some(id), .. }) => format!("openai:{}:prompt:{id}", self.model),
            Some(_) => format!("openai:{}:prompt:custom", self.model),
            None => format!("openai:{}", self.model),
        }
    }

    async fn request_extraction(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<Extraction, ParseFailure> {
        let redacted = self.redactor.redact(text);
        let system = prompt.map_or(DEFAULT_PROMPT, |p| p.body.as_str());
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: &redacted,
                },
            ],
            response_format: ResponseFormat {
                format_type: "json_object",
            },
            temperature: 0.0,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| unavailable(format!("inference request failed: {e}")))?;

        let status = response.status();
        debug!(status = %status, "inference response received");
        if !status.is_success() {
            return Err(unavailable(format!("inference API returned {status}")));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| unavailable(format!("malformed inference response: {e}")))?;
        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| unavailable("empty inference response"))?;
        serde_json::from_str(&content)
            .map_err(|e| unavailable(format!("inference output is not JSON: {e}")))
    }

    fn to_fields(
        &self,
        extraction: Extraction,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure> {
        let currency = extraction
            .currency
            .filter(|c| !c.trim().is_empty())
            .map(|c| c.trim().to_ascii_uppercase())
            .unwrap_or_else(|| self.home_currency.clone());
        let exponent = self.exponents.get(&currency).copied().ok_or_else(|| {
            ParseFailure::new(
                ParseFailureKind::InvalidAmount,
                format!("no minor-unit exponent configured for {currency}"),
            )
        })?;

        let amount_text = match extraction.amount {
            Some(serde_json::Value::Number(n)) => n.to_string(),
            Some(serde_json::Value::String(s)) => s,
            _ => {
                return Err(ParseFailure::new(
                    ParseFailureKind::UnrecognizedFormat,
                    "inference returned no amount",
                ));
            }
        };
        let amount_minor = to_minor_units(amount_text.trim(), exponent)?;

        let reference = extraction
            .r#ref
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty() && !r.eq_ignore_ascii_case("unknown"))
            .ok_or_else(|| {
                ParseFailure::new(
                    ParseFailureKind::MissingReference,
                    "inference returned no reference",
                )
            })?;

        // Never trust the model with masking.
        let payer_mask = extraction
            .payer_mask
            .and_then(|m| {
                if m.contains('*') {
                    Some(m)
                } else {
                    mask_msisdn(&m)
                }
            })
            .or_else(|| self.redactor.first_masked(text));

        let occurred_at = extraction
            .timestamp
            .and_then(|t| DateTime::parse_from_rfc3339(&t).ok())
            .map(|t| t.with_timezone(&Utc));

        Ok(ParsedFields {
            amount_minor,
            currency,
            reference,
            payer_mask,
            occurred_at,
            confidence: extraction.confidence.unwrap_or(0.5).clamp(0.0, 1.0),
            parser_version: self.parser_version(prompt),
            prompt_id: prompt.and_then(|p| p.id.clone()),
        })
    }
}

#[async_trait]
impl PluginAdapter for InferenceParser {
    fn name(&self) -> &str {
        "inference"
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
impl PaymentParser for InferenceParser {
    async fn parse(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure> {
        let extraction = self.request_extraction(text, prompt).await?;
        self.to_fields(extraction, text, prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_parser(base_url: &str, timeout: Duration) -> InferenceParser {
        let config = ParserConfig::default();
        InferenceParser::new(
            base_url,
            "sk-test",
            "gpt-4o-mini",
            timeout,
            config.home_currency,
            config.currency_exponents,
        )
        .unwrap()
    }

    fn completion(content: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": content.to_string()}}]
        })
    }

    #[tokio::test]
    async fn extracts_fields_and_redacts_outbound_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_string_contains("078*****56"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                serde_json::json!({
                    "amount": 15000,
                    "currency": "RWF",
                    "payer_mask": "0788123456",
                    "ref": "ABC123",
                    "confidence": 0.92
                }),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let parser = test_parser(&server.uri(), Duration::from_secs(5));
        let prompt = PromptSpec {
            id: Some("p-1".into()),
            body: "Extract.".into(),
        };
        let parsed = parser
            .parse(
                "You have received 15000 RWF from 0788123456. TxId: ABC123",
                Some(&prompt),
            )
            .await
            .unwrap();
        assert_eq!(parsed.amount_minor, 15000);
        assert_eq!(parsed.reference, "ABC123");
        assert_eq!(parsed.payer_mask.as_deref(), Some("078*****56"));
        assert_eq!(parsed.confidence, 0.92);
        assert_eq!(parsed.parser_version, "openai:gpt-4o-mini:prompt:p-1");
        assert_eq!(parsed.prompt_id.as_deref(), Some("p-1"));
    }

    #[tokio::test]
    async fn server_error_is_inference_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let parser = test_parser(&server.uri(), Duration::from_secs(5));
        let failure = parser.parse("Received 100 RWF. TxId: 1", None).await.unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::InferenceUnavailable);
    }

    #[tokio::test]
    async fn non_json_output_is_inference_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "sorry, I cannot help"}}]
            })))
            .mount(&server)
            .await;

        let parser = test_parser(&server.uri(), Duration::from_secs(5));
        let failure = parser.parse("Received 100 RWF. TxId: 1", None).await.unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::InferenceUnavailable);
    }

    #[tokio::test]
    async fn slow_server_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(2))
                    .set_body_json(completion(serde_json::json!({"amount": 1}))),
            )
            .mount(&server)
            .await;

        let parser = test_parser(&server.uri(), Duration::from_millis(200));
        let failure = parser.parse("Received 100 RWF. TxId: 1", None).await.unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::InferenceUnavailable);
    }

    #[tokio::test]
    async fn missing_reference_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion(
                serde_json::json!({"amount": 100, "currency": "RWF", "ref": "UNKNOWN", "confidence": 0.9}),
            )))
            .mount(&server)
            .await;

        let parser = test_parser(&server.uri(), Duration::from_secs(5));
        let failure = parser.parse("Received 100 RWF", None).await.unwrap_err();
        assert_eq!(failure.kind, ParseFailureKind::MissingReference);
    }

    #[test]
    fn disabled_config_builds_nothing() {
        assert!(InferenceParser::from_config(&ParserConfig::default())
            .unwrap()
            .is_none());

        let mut config = ParserConfig::default();
        config.inference.enabled = true;
        assert!(InferenceParser::from_config(&config).unwrap().is_none());
    }
}
