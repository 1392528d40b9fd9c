// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as probability ranges, backoff ordering, and non-empty paths.

use crate::diagnostic::ConfigError;
use crate::model::MomopayConfig;

fn out_of_range(errors: &mut Vec<ConfigError>, key: &str, message: impl Into<String>) {
    errors.push(ConfigError::out_of_range(key, message));
}

fn check_unit_interval(errors: &mut Vec<ConfigError>, key: &str, value: f64) {
    if !(0.0..=1.0).contains(&value) {
        out_of_range(errors, key, format!("must be within [0, 1], got {value}"));
    }
}

fn check_positive(errors: &mut Vec<ConfigError>, key: &str, value: u64) {
    if value == 0 {
        out_of_range(errors, key, "must be at least 1");
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MomopayConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // [server]
    let addr = config.server.bind_address.trim();
    if addr.is_empty() {
        out_of_range(&mut errors, "server.bind_address", "must not be empty");
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            out_of_range(
                &mut errors,
                "server.bind_address",
                format!("`{addr}` is not a valid IP address or hostname"),
            );
        }
    }
    for (key, token) in [
        ("server.webhook_token", &config.server.webhook_token),
        ("server.admin_token", &config.server.admin_token),
    ] {
        if let Some(token) = token
            && token.trim().is_empty()
        {
            out_of_range(&mut errors, key, "must not be blank when set");
        }
    }
    check_positive(&mut errors, "server.request_timeout_secs", config.server.request_timeout_secs);
    check_positive(&mut errors, "server.worker_concurrency", config.server.worker_concurrency as u64);
    check_positive(&mut errors, "server.inbound_buffer", config.server.inbound_buffer as u64);

    // [storage]
    if config.storage.database_path.trim().is_empty() {
        out_of_range(&mut errors, "storage.database_path", "must not be empty");
    }

    // [parser]
    check_unit_interval(&mut errors, "parser.min_confidence", config.parser.min_confidence);
    if config.parser.exponent_for(&config.parser.home_currency).is_none() {
        errors.push(ConfigError::inconsistent(format!(
            "parser.home_currency `{}` has no entry in parser.currency_exponents",
            config.parser.home_currency
        )));
    }
    for (code, exp) in &config.parser.currency_exponents {
        if *exp > 4 {
            out_of_range(
                &mut errors,
                &format!("parser.currency_exponents.{code}"),
                format!("must be at most 4, got {exp}"),
            );
        }
    }
    let inference = &config.parser.inference;
    if inference.enabled {
        if inference.base_url.trim().is_empty() {
            out_of_range(&mut errors, "parser.inference.base_url", "must not be empty");
        }
        if inference.model.trim().is_empty() {
            out_of_range(&mut errors, "parser.inference.model", "must not be empty");
        }
        check_positive(&mut errors, "parser.inference.timeout_secs", inference.timeout_secs);
    }

    // [matcher]
    let matcher = &config.matcher;
    check_positive(&mut errors, "matcher.lookback_hours", u64::from(matcher.lookback_hours));
    if matcher.tolerance_min_minor < 0 {
        out_of_range(
            &mut errors,
            "matcher.tolerance_min_minor",
            format!("must be non-negative, got {}", matcher.tolerance_min_minor),
        );
    }
    check_positive(&mut errors, "matcher.top_n", matcher.top_n as u64);
    check_unit_interval(&mut errors, "matcher.auto_match_threshold", matcher.auto_match_threshold);
    check_unit_interval(&mut errors, "matcher.ambiguity_margin", matcher.ambiguity_margin);
    let weights = [
        ("matcher.reference_weight", matcher.reference_weight),
        ("matcher.amount_weight", matcher.amount_weight),
        ("matcher.recency_weight", matcher.recency_weight),
    ];
    for (key, weight) in weights {
        if weight < 0.0 {
            out_of_range(&mut errors, key, format!("must be non-negative, got {weight}"));
        }
    }
    if weights.iter().map(|(_, w)| w).sum::<f64>() <= 0.0 {
        errors.push(ConfigError::inconsistent(
            "matcher weights must sum to a positive value",
        ));
    }

    // [retry]
    let retry = &config.retry;
    check_positive(&mut errors, "retry.max_attempts", u64::from(retry.max_attempts));
    if retry.base_delay_secs > retry.max_delay_secs {
        errors.push(ConfigError::inconsistent(format!(
            "retry.base_delay_secs ({}) must not exceed retry.max_delay_secs ({})",
            retry.base_delay_secs, retry.max_delay_secs
        )));
    }
    check_positive(&mut errors, "retry.sweep_interval_secs", retry.sweep_interval_secs);
    check_positive(&mut errors, "retry.batch_size", u64::from(retry.batch_size));

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
