// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Deterministic regex parser for mobile-money confirmation SMS.
//!
//! Confidence is fixed per extraction path: a currency-tagged amount next to
//! a payment keyword scores 0.95, a currency-tagged amount alone 0.85, and a
//! bare number after a payment keyword 0.65.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;

use momopay_config::model::ParserConfig;
use momopay_core::types::{ParseFailure, ParseFailureKind, ParsedFields, PromptSpec};
use momopay_core::{AdapterType, HealthStatus, MomopayError, PaymentParser, PluginAdapter};
use momopay_security::MsisdnRedactor;

pub const PATTERN_PARSER_VERSION: &str = "pattern:v1";

const CONFIDENCE_KEYWORD: f64 = 0.95;
const CONFIDENCE_TAGGED: f64 = 0.85;
const CONFIDENCE_BARE: f64 = 0.65;

const CURRENCIES: &str = "RWF|FRW|RF|UGX|KES|KSH|TZS|USD";

static AMOUNT_THEN_CURRENCY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(\d[\d,]*(?:\.\d+)?)\s*({CURRENCIES})\b")).unwrap()
});

static CURRENCY_THEN_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({CURRENCIES})\s*(\d[\d,]*(?:\.\d+)?)")).unwrap()
});

static BARE_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:received|paid|payment\s+of|amount)[:\s]+(\d[\d,]*(?:\.\d+)?)\b").unwrap()
});

static PAYMENT_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:received|paid|payment|deposit(?:ed)?|credited|transferred)\b").unwrap()
});

static NON_PAYMENT_LABEL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:fees?|balance|charges?|commission)\b").unwrap());

static REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:financial\s+transaction\s+id|transaction\s+id|ft\s*id|tx\s*id|txn\s*id|ref(?:erence)?(?:\s+no)?)(?:\s*[:#.]\s*|\s+)([A-Z0-9][A-Z0-9-]*)",
    )
    .unwrap()
});

static TIMESTAMP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{4}-\d{2}-\d{2})[ T](\d{2}:\d{2}(?::\d{2})?)").unwrap()
});

/// Regex-only parser. Ignores prompt bodies but records the prompt id it was
/// run under.
#[derive(Debug, Clone)]
pub struct PatternParser {
    home_currency: String,
    exponents: BTreeMap<String, u32>,
    redactor: MsisdnRedactor,
}

impl PatternParser {
    pub fn new(home_currency: impl Into<String>, exponents: BTreeMap<String, u32>) -> Self {
        Self {
            home_currency: home_currency.into().to_ascii_uppercase(),
            exponents,
            redactor: MsisdnRedactor::default(),
        }
    }

    pub fn from_config(config: &ParserConfig) -> Self {
        Self::new(config.home_currency.clone(), config.currency_exponents.clone())
    }

    /// Synchronous core of [`PaymentParser::parse`].
    pub fn parse_text(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure> {
        let (amount_minor, currency, confidence) = self.extract_amount(text)?;

        let reference = extract_reference(text).ok_or_else(|| {
            ParseFailure::new(
                ParseFailureKind::MissingReference,
                "no transaction reference found",
            )
        })?;

        Ok(ParsedFields {
            amount_minor,
            currency,
            reference,
            payer_mask: self.redactor.first_masked(text),
            occurred_at: extract_timestamp(text),
            confidence,
            parser_version: PATTERN_PARSER_VERSION.to_string(),
            prompt_id: prompt.and_then(|p| p.id.clone()),
        })
    }

    fn extract_amount(&self, text: &str) -> Result<(i64, String, f64), ParseFailure> {
        // (start, end, number, currency)
        let mut tagged: Vec<(usize, usize, &str, &str)> = Vec::new();
        for caps in AMOUNT_THEN_CURRENCY.captures_iter(text) {
            if let (Some(whole), Some(number), Some(currency)) = (caps.get(0), caps.get(1), caps.get(2)) {
                tagged.push((whole.start(), whole.end(), number.as_str(), currency.as_str()));
            }
        }
        for caps in CURRENCY_THEN_AMOUNT.captures_iter(text) {
            if let (Some(whole), Some(currency), Some(number)) = (caps.get(0), caps.get(1), caps.get(2)) {
                let overlaps = tagged
                    .iter()
                    .any(|(start, end, _, _)| whole.start() < *end && *start < whole.end());
                if !overlaps {
                    tagged.push((whole.start(), whole.end(), number.as_str(), currency.as_str()));
                }
            }
        }

        let mut amounts: Vec<(i64, String)> = Vec::new();
        for (at, _, number, currency) in tagged {
            if is_labelled_non_payment(text, at) {
                continue;
            }
            let currency = normalize_currency(currency);
            let minor = self.to_minor(number, &currency)?;
            if !amounts.contains(&(minor, currency.clone())) {
                amounts.push((minor, currency));
            }
        }

        match amounts.len() {
            1 => {
                let (minor, currency) = amounts.remove(0);
                let confidence = if PAYMENT_KEYWORD.is_match(text) {
                    CONFIDENCE_KEYWORD
                } else {
                    CONFIDENCE_TAGGED
                };
                Ok((minor, currency, confidence))
            }
            0 => {
                let number = BARE_AMOUNT
                    .captures(text)
                    .and_then(|caps| caps.get(1))
                    .map(|m| m.as_str())
                    .ok_or_else(|| {
                        ParseFailure::new(
                            ParseFailureKind::UnrecognizedFormat,
                            "no payment amount found",
                        )
                    })?;
                let currency = self.home_currency.clone();
                let minor = self.to_minor(number, &currency)?;
                Ok((minor, currency, CONFIDENCE_BARE))
            }
            n => Err(ParseFailure::new(
                ParseFailureKind::AmbiguousAmount,
                format!("{n} distinct payment amounts found"),
            )),
        }
    }

    /// Converts a decimal string to minor units of `currency`.
    fn to_minor(&self, number: &str, currency: &str) -> Result<i64, ParseFailure> {
        let exponent = self.exponents.get(currency).copied().ok_or_else(|| {
            ParseFailure::new(
                ParseFailureKind::InvalidAmount,
                format!("no minor-unit exponent configured for {currency}"),
            )
        })?;
        to_minor_units(number, exponent)
    }
}

/// Parses `"12,500.50"` style numbers into integer minor units.
pub fn to_minor_units(number: &str, exponent: u32) -> Result<i64, ParseFailure> {
    let invalid = |detail: String| ParseFailure::new(ParseFailureKind::InvalidAmount, detail);
    let cleaned: String = number.chars().filter(|c| *c != ',').collect();
    let (whole, fraction) = match cleaned.split_once('.') {
        Some((w, f)) => (w, f),
        None => (cleaned.as_str(), ""),
    };
    if whole.is_empty() || !whole.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("not a number: {number}")));
    }
    if !fraction.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid(format!("not a number: {number}")));
    }

    // Trailing zeros beyond the currency's precision carry no value.
    let significant = fraction.trim_end_matches('0');
    if significant.len() > exponent as usize {
        return Err(invalid(format!(
            "{number} has more precision than the currency allows"
        )));
    }

    let scale = 10i64
        .checked_pow(exponent)
        .ok_or_else(|| invalid("exponent too large".into()))?;
    let whole: i64 = whole
        .parse()
        .map_err(|_| invalid(format!("amount out of range: {number}")))?;
    let mut frac_minor: i64 = 0;
    if !significant.is_empty() {
        let padded = format!("{significant:0<width$}", width = exponent as usize);
        frac_minor = padded
            .parse()
            .map_err(|_| invalid(format!("not a number: {number}")))?;
    }
    let minor = whole
        .checked_mul(scale)
        .and_then(|v| v.checked_add(frac_minor))
        .ok_or_else(|| invalid(format!("amount out of range: {number}")))?;
    if minor <= 0 {
        return Err(invalid("amount must be positive".into()));
    }
    Ok(minor)
}

fn normalize_currency(raw: &str) -> String {
    match raw.to_ascii_uppercase().as_str() {
        "FRW" | "RF" => "RWF".to_string(),
        "KSH" => "KES".to_string(),
        other => other.to_string(),
    }
}

/// True when the clause leading up to `at` labels the amount as a fee or a
/// balance rather than the payment itself.
fn is_labelled_non_payment(text: &str, at: usize) -> bool {
    let before = &text[..at];
    let clause_start = [". ", "\n", "; ", ", "]
        .iter()
        .filter_map(|sep| before.rfind(sep).map(|i| i + sep.len()))
        .max()
        .unwrap_or(0);
    NON_PAYMENT_LABEL.is_match(&before[clause_start..])
}

fn extract_reference(text: &str) -> Option<String> {
    REFERENCE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().trim_end_matches('-')))
        .find(|token| token.chars().any(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Timestamps in the SMS body carry no zone and are read as UTC.
fn extract_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let caps = TIMESTAMP.captures(text)?;
    let raw = format!("{} {}", &caps[1], &caps[2]);
    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&raw, "%Y-%m-%d %H:%M"))
        .ok()
        .map(|naive| naive.and_utc())
}

#[async_trait]
impl PluginAdapter for PatternParser {
    fn name(&self) -> &str {
        "pattern"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(1, 0, 0)
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
impl PaymentParser for PatternParser {
    async fn parse(
        &self,
        text: &str,
        prompt: Option<&PromptSpec>,
    ) -> Result<ParsedFields, ParseFailure> {
        self.parse_text(text, prompt)
    }
}
