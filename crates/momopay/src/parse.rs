// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `momopay parse`: dry-run the configured parser on one SMS body.

use momopay_config::MomopayConfig;
use momopay_core::types::{ParseFailure, ParsedFields, PromptSpec};
use momopay_core::MomopayError;
use momopay_security::MsisdnRedactor;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ParseReport {
    masked_text: String,
    parsed: Option<ParsedFields>,
    failure: Option<ParseFailure>,
}

async fn parse_text(
    config: &MomopayConfig,
    text: &str,
    prompt: Option<String>,
) -> Result<ParseReport, MomopayError> {
    let masked_text = MsisdnRedactor::default().redact(text);
    let parser = momopay_parser::build_parser(&config.parser)?;
    let prompt = prompt.map(|body| PromptSpec { id: None, body });

    let (parsed, failure) = match parser.parse(&masked_text, prompt.as_ref()).await {
        Ok(fields) => (Some(fields), None),
        Err(failure) => (None, Some(failure)),
    };
    Ok(ParseReport {
        masked_text,
        parsed,
        failure,
    })
}

pub async fn run_parse(
    config: &MomopayConfig,
    text: &str,
    prompt: Option<String>,
) -> Result<(), MomopayError> {
    let report = parse_text(config, text, prompt).await?;
    let rendered = serde_json::to_string_pretty(&report)
        .map_err(|e| MomopayError::Internal(format!("failed to render parse result: {e}")))?;
    println!("{rendered}");
    Ok(())
}
