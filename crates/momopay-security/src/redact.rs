// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Redaction for log output and error messages.
//!
//! Two complementary mechanisms:
//! 1. **Pattern-based**: bearer tokens, API keys, and MSISDN-shaped digit runs.
//! 2. **Exact-match**: configured secrets (webhook and admin tokens, inference key).

use std::io::Write;
use std::sync::{Arc, LazyLock, RwLock};

use regex::Regex;

use crate::mask::MsisdnRedactor;

static SECRET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // Bearer tokens in headers
        Regex::new(r"Bearer\s+[a-zA-Z0-9._\-]{10,}").unwrap(),
        // OpenAI-style secret keys
        Regex::new(r"sk-[a-zA-Z0-9_\-]{20,}").unwrap(),
    ]
});

static MSISDN: LazyLock<MsisdnRedactor> = LazyLock::new(MsisdnRedactor::default);

/// The redaction placeholder.
const REDACTED: &str = "[REDACTED]";

/// Redact secrets and phone numbers from a string.
///
/// Exact-match secrets are replaced longest first so a secret that contains
/// another is not partially revealed.
pub fn redact(input: &str, secrets: &[String]) -> String {
    let mut result = input.to_string();

    for pattern in SECRET_PATTERNS.iter() {
        result = pattern.replace_all(&result, REDACTED).into_owned();
    }

    let mut sorted: Vec<&String> = secrets.iter().collect();
    sorted.sort_by_key(|v| std::cmp::Reverse(v.len()));
    for value in sorted {
        if !value.is_empty() {
            result = result.replace(value.as_str(), REDACTED);
        }
    }

    MSISDN.redact(&result)
}

/// A writer wrapper that redacts secrets and MSISDNs from output.
///
/// Installed under the tracing subscriber so no log line reaches stderr with
/// a raw payer number or a configured token.
pub struct RedactingWriter<W> {
    inner: W,
    secrets: Arc<RwLock<Vec<String>>>,
}

impl<W: Write> RedactingWriter<W> {
    pub fn new(inner: W, secrets: Arc<RwLock<Vec<String>>>) -> Self {
        Self { inner, secrets }
    }

    /// Add a secret to the shared redaction list.
    pub fn add_secret(secrets: &Arc<RwLock<Vec<String>>>, value: String) {
        if value.is_empty() {
            return;
        }
        if let Ok(mut values) = secrets.write()
            && !values.contains(&value)
        {
            values.push(value);
        }
    }
}

impl<W: Write> Write for RedactingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let input = String::from_utf8_lossy(buf);
        let secrets = self
            .secrets
            .read()
            .map(|v| v.clone())
            .unwrap_or_default();
        let redacted = redact(&input, &secrets);
        self.inner.write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}
