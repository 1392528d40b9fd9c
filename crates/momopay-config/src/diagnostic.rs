// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Config errors rendered as miette diagnostics.
//!
//! Unknown keys are checked against the momopay key table: a typo gets a
//! "did you mean" from the same section, and a key written under the wrong
//! section is pointed at the section that owns it. Every key-level error
//! also names the `MOMOPAY_*` variable that overrides it.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use figment::error::Kind;
use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity score to suggest a correction.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// Every section of `momopay.toml` with the keys it accepts.
pub const SECTIONS: &[(&str, &[&str])] = &[
    ("service", &["name", "log_level"]),
    (
        "server",
        &[
            "bind_address",
            "port",
            "webhook_token",
            "admin_token",
            "request_timeout_secs",
            "worker_concurrency",
            "inbound_buffer",
        ],
    ),
    ("storage", &["database_path", "wal_mode"]),
    (
        "parser",
        &["home_currency", "min_confidence", "currency_exponents", "inference"],
    ),
    (
        "parser.inference",
        &["enabled", "base_url", "api_key", "model", "timeout_secs"],
    ),
    (
        "matcher",
        &[
            "lookback_hours",
            "tolerance_min_minor",
            "tolerance_bps",
            "top_n",
            "auto_match_threshold",
            "ambiguity_margin",
            "reference_weight",
            "amount_weight",
            "recency_weight",
            "retry_unmatched",
        ],
    ),
    (
        "retry",
        &[
            "max_attempts",
            "base_delay_secs",
            "max_delay_secs",
            "sweep_interval_secs",
            "batch_size",
            "claim_lease_secs",
            "stale_received_secs",
        ],
    ),
];

/// A configuration error with enough context for miette to point at the
/// offending line.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in [{section}]")]
    #[diagnostic(code(momopay::config::unknown_key), help("{hint}"))]
    UnknownKey {
        key: String,
        /// Dotted section the key was found in; `root` for the top level.
        section: String,
        /// Closest valid key, or `[section].key` when the key lives elsewhere.
        suggestion: Option<String>,
        hint: String,
        #[label("not a momopay setting")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: found {found}")]
    #[diagnostic(
        code(momopay::config::invalid_type),
        help("expected {expected}; env override is {env_var}")
    )]
    InvalidType {
        key: String,
        found: String,
        expected: String,
        env_var: String,
        #[label("wrong type here")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(code(momopay::config::missing_key), help("set `{key}` in momopay.toml"))]
    MissingKey { key: String },

    /// A single value outside its allowed range.
    #[error("`{key}` {message}")]
    #[diagnostic(
        code(momopay::config::out_of_range),
        help("fix it in momopay.toml or via {}", env_var_for(key))
    )]
    OutOfRange { key: String, message: String },

    /// Values that are fine alone but contradict each other.
    #[error("{message}")]
    #[diagnostic(code(momopay::config::inconsistent))]
    Inconsistent { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(momopay::config::other))]
    Other(String),
}

impl ConfigError {
    pub fn out_of_range(key: &str, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            key: key.to_string(),
            message: message.into(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }

    /// Dotted config key the error is about, when there is one.
    pub fn key(&self) -> Option<String> {
        match self {
            Self::UnknownKey { key, section, .. } if section == "root" => Some(key.clone()),
            Self::UnknownKey { key, section, .. } => Some(format!("{section}.{key}")),
            Self::InvalidType { key, .. }
            | Self::MissingKey { key }
            | Self::OutOfRange { key, .. } => Some(key.clone()),
            Self::Inconsistent { .. } | Self::Other(_) => None,
        }
    }
}

/// The `MOMOPAY_*` variable that overrides a dotted key.
pub fn env_var_for(key: &str) -> String {
    format!("MOMOPAY_{}", key.replace('.', "_").to_ascii_uppercase())
}

fn section_keys(section: &str) -> Option<&'static [&'static str]> {
    SECTIONS
        .iter()
        .find(|(name, _)| *name == section)
        .map(|(_, keys)| *keys)
}

/// Best correction for `key` found under `section`.
///
/// A close match inside the same section wins. Otherwise an exact match in
/// another section is reported as `[other].key`.
pub fn suggest(section: &str, key: &str) -> Option<String> {
    let local: Vec<&str> = match section {
        "root" => SECTIONS
            .iter()
            .filter(|(name, _)| !name.contains('.'))
            .map(|(name, _)| *name)
            .collect(),
        _ => section_keys(section).map(<[&str]>::to_vec).unwrap_or_default(),
    };
    if let Some(close) = suggest_key(key, &local) {
        return Some(close);
    }
    SECTIONS
        .iter()
        .find(|(name, keys)| *name != section && keys.contains(&key))
        .map(|(name, _)| format!("[{name}].{key}"))
}

fn unknown_key_hint(section: &str, suggestion: Option<&str>) -> String {
    match suggestion {
        Some(s) if s.starts_with('[') => format!("this key belongs in {s}"),
        Some(s) => format!("did you mean `{s}`?"),
        None => match section_keys(section) {
            Some(keys) => format!("[{section}] accepts: {}", keys.join(", ")),
            None => "see momopay.toml for the accepted sections".to_string(),
        },
    }
}

/// Converts a figment error into one diagnostic per underlying failure.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.clone();
            match &error.kind {
                Kind::UnknownField(field, _) => {
                    let section = if path.is_empty() {
                        "root".to_string()
                    } else {
                        path.join(".")
                    };
                    let suggestion = suggest(&section, field);
                    let (span, src) = locate(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        hint: unknown_key_hint(&section, suggestion.as_deref()),
                        section,
                        suggestion,
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: dotted(&path, field),
                },
                Kind::InvalidType(actual, expected) => {
                    let key = path.join(".");
                    let (section, field) = match path.split_last() {
                        Some((field, section)) => (section.to_vec(), field.clone()),
                        None => (Vec::new(), String::new()),
                    };
                    let (span, src) = locate(&error, &section, &field, toml_sources);
                    ConfigError::InvalidType {
                        env_var: env_var_for(&key),
                        key,
                        found: actual.to_string(),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

fn dotted(path: &[String], field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{}.{field}", path.join("."))
    }
}

/// Span of `field` under `[section]` in whichever file the error came from.
fn locate(
    error: &figment::error::Error,
    section: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let path = match error.metadata.as_ref().and_then(|m| m.source.as_ref()) {
        Some(figment::Source::File(path)) => path.display().to_string(),
        // Inline sources are registered under one pseudo path.
        _ => match toml_sources {
            [(only, _)] if only == "<inline>" => only.clone(),
            _ => return (None, None),
        },
    };
    let Some((name, content)) = toml_sources.iter().find(|(p, _)| *p == path) else {
        return (None, None);
    };
    match find_key_offset(content, section, field) {
        Some(offset) => (
            Some(SourceSpan::new(offset.into(), field.len())),
            Some(NamedSource::new(name, content.clone())),
        ),
        None => (None, None),
    }
}

/// Byte offset of `field` inside the `[a.b]` table named by `section`.
///
/// The search stops at the next table header, so a key with the same name
/// in a later section is not picked up.
pub fn find_key_offset(content: &str, section: &[String], field: &str) -> Option<usize> {
    let mut in_section = section.is_empty();
    let header = format!("[{}]", section.join("."));
    let mut offset = 0;
    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') {
            in_section = trimmed.trim_end() == header;
        } else if in_section
            && let Some(after) = trimmed.strip_prefix(field)
            && after.trim_start().starts_with('=')
        {
            return Some(offset + line.len() - trimmed.len());
        }
        offset += line.len();
    }
    None
}

/// Closest entry of `valid_keys` by Jaro-Winkler similarity, if close enough.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Writes every error to stderr through miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    for error in errors {
        let mut buf = String::new();
        match handler.render_report(&mut buf, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{buf}"),
            Err(_) => eprintln!("Error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typo_suggests_key_from_same_section() {
        assert_eq!(
            suggest("matcher", "lookbak_hours").as_deref(),
            Some("lookback_hours")
        );
        assert_eq!(suggest("server", "webhok_token").as_deref(), Some("webhook_token"));
        assert_eq!(suggest("retry", "zzzzzz"), None);
    }

    #[test]
    fn misplaced_key_points_at_owning_section() {
        assert_eq!(
            suggest("matcher", "max_attempts").as_deref(),
            Some("[retry].max_attempts")
        );
        assert_eq!(suggest("root", "sever").as_deref(), Some("server"));
        assert_eq!(
            unknown_key_hint("matcher", Some("[retry].max_attempts")),
            "this key belongs in [retry].max_attempts"
        );
    }

    #[test]
    fn env_var_names_follow_the_loader_mapping() {
        assert_eq!(env_var_for("server.webhook_token"), "MOMOPAY_SERVER_WEBHOOK_TOKEN");
        assert_eq!(env_var_for("parser.inference.model"), "MOMOPAY_PARSER_INFERENCE_MODEL");
    }

    #[test]
    fn key_offset_stays_inside_its_table() {
        let content = "[parser]\nenabeld = 1\n\n[parser.inference]\nenabeld = true\n";
        let path = vec!["parser".to_string(), "inference".to_string()];
        let o = find_key_offset(content, &path, "enabeld").unwrap();
        assert_eq!(&content[o..o + 14], "enabeld = true");
        assert_eq!(find_key_offset(content, &["retry".to_string()], "enabeld"), None);
    }

    #[test]
    fn key_table_covers_every_serialized_setting() {
        let value = toml::Value::try_from(crate::MomopayConfig::default()).unwrap();
        let root = value.as_table().unwrap();
        let mut tables = vec![(String::new(), root)];
        while let Some((prefix, table)) = tables.pop() {
            for (key, child) in table {
                let section = if prefix.is_empty() { "root" } else { prefix.as_str() };
                if prefix.is_empty() {
                    assert!(section_keys(key).is_some(), "no section entry for [{key}]");
                } else {
                    assert!(
                        section_keys(section).is_some_and(|keys| keys.contains(&key.as_str())),
                        "{section}.{key} missing from the key table"
                    );
                }
                let nested = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                if let Some(child) = child.as_table()
                    && section_keys(&nested).is_some()
                {
                    tables.push((nested, child));
                }
            }
        }
    }
}
