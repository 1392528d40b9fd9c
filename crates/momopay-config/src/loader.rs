// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./momopay.toml` > `~/.config/momopay/momopay.toml` > `/etc/momopay/momopay.toml`
//! with environment variable overrides via `MOMOPAY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::MomopayConfig;

pub(crate) const SYSTEM_CONFIG: &str = "/etc/momopay/momopay.toml";
pub(crate) const LOCAL_CONFIG: &str = "momopay.toml";

/// Env var sections, most specific first so `parser_inference_` wins over `parser_`.
const ENV_SECTIONS: &[(&str, &str)] = &[
    ("parser_inference_", "parser.inference."),
    ("service_", "service."),
    ("server_", "server."),
    ("storage_", "storage."),
    ("parser_", "parser."),
    ("matcher_", "matcher."),
    ("retry_", "retry."),
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/momopay/momopay.toml` (system-wide)
/// 3. `~/.config/momopay/momopay.toml` (user XDG config)
/// 4. `./momopay.toml` (local directory)
/// 5. `MOMOPAY_*` environment variables
pub fn load_config() -> Result<MomopayConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MomopayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MomopayConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MomopayConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MomopayConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading.
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MomopayConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("momopay").join(LOCAL_CONFIG))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(LOCAL_CONFIG))
        .merge(env_provider())
}

/// Maps a lowercased, prefix-stripped env var name to a dotted config key.
///
/// Only the leading section is split off: `server_webhook_token` becomes
/// `server.webhook_token`, and `matcher_retry_unmatched` stays inside
/// `[matcher]`.
pub fn map_env_key(key: &str) -> String {
    for (prefix, dotted) in ENV_SECTIONS {
        if let Some(rest) = key.strip_prefix(prefix) {
            return format!("{dotted}{rest}");
        }
    }
    key.to_string()
}

fn env_provider() -> Env {
    Env::prefixed("MOMOPAY_").map(|key| map_env_key(&key.as_str().to_ascii_lowercase()).into())
}
