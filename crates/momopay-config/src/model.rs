// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Momopay reconciliation service.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Momopay configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MomopayConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// HTTP surface: webhook ingress and operator endpoints.
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// SMS parsing settings.
    #[serde(default)]
    pub parser: ParserConfig,

    /// Candidate matching and auto-match policy.
    #[serde(default)]
    pub matcher: MatcherConfig,

    /// Retry queue and sweeper settings.
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "momopay".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Shared secret the modem relay presents. `None` rejects every webhook.
    #[serde(default)]
    pub webhook_token: Option<String>,

    /// Bearer token for operator endpoints. `None` rejects every admin call.
    #[serde(default)]
    pub admin_token: Option<String>,

    /// Upper bound on any single HTTP request, webhook included.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// SMS processed concurrently by the in-process workers.
    #[serde(default = "default_worker_concurrency")]
    pub worker_concurrency: usize,

    /// Capacity of the ingress-to-worker channel.
    #[serde(default = "default_inbound_buffer")]
    pub inbound_buffer: usize,
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            webhook_token: None,
            admin_token: None,
            request_timeout_secs: default_request_timeout_secs(),
            worker_concurrency: default_worker_concurrency(),
            inbound_buffer: default_inbound_buffer(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_worker_concurrency() -> usize {
    4
}

fn default_inbound_buffer() -> usize {
    256
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("momopay").join("momopay.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("momopay.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// SMS parser configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParserConfig {
    /// Currency assumed when the SMS body names none.
    #[serde(default = "default_home_currency")]
    pub home_currency: String,

    /// Results below this confidence are parse failures.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Minor-unit exponent per ISO currency code.
    #[serde(default = "default_currency_exponents")]
    pub currency_exponents: BTreeMap<String, u32>,

    #[serde(default)]
    pub inference: InferenceConfig,
}

impl ParserConfig {
    pub fn exponent_for(&self, currency: &str) -> Option<u32> {
        self.currency_exponents.get(currency).copied()
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            home_currency: default_home_currency(),
            min_confidence: default_min_confidence(),
            currency_exponents: default_currency_exponents(),
            inference: InferenceConfig::default(),
        }
    }
}

fn default_home_currency() -> String {
    "RWF".to_string()
}

fn default_min_confidence() -> f64 {
    0.6
}

fn default_currency_exponents() -> BTreeMap<String, u32> {
    [("RWF", 0), ("UGX", 0), ("KES", 2), ("TZS", 2), ("USD", 2)]
        .into_iter()
        .map(|(code, exp)| (code.to_string(), exp))
        .collect()
}

/// Inference-backed parser. When disabled, only the pattern parser runs.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct InferenceConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_inference_base_url")]
    pub base_url: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_inference_model")]
    pub model: String,

    /// Past this, the pattern parser takes over.
    #[serde(default = "default_inference_timeout_secs")]
    pub timeout_secs: u64,
}

impl InferenceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_inference_base_url(),
            api_key: None,
            model: default_inference_model(),
            timeout_secs: default_inference_timeout_secs(),
        }
    }
}

fn default_inference_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_inference_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_inference_timeout_secs() -> u64 {
    8
}

/// Candidate matcher configuration.
///
/// The auto-match threshold, ambiguity margin, and weights are tunables.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MatcherConfig {
    /// Only intents created this long before the SMS are considered.
    #[serde(default = "default_lookback_hours")]
    pub lookback_hours: u32,

    /// Absolute floor of the amount tolerance, in minor units.
    #[serde(default = "default_tolerance_min_minor")]
    pub tolerance_min_minor: i64,

    /// Relative amount tolerance in basis points (500 = 5%).
    #[serde(default = "default_tolerance_bps")]
    pub tolerance_bps: u32,

    /// Candidates returned for operator display.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    /// The top candidate must score strictly above this to auto-match.
    #[serde(default = "default_auto_match_threshold")]
    pub auto_match_threshold: f64,

    /// The top candidate must lead the runner-up by at least this much.
    #[serde(default = "default_ambiguity_margin")]
    pub ambiguity_margin: f64,

    #[serde(default = "default_reference_weight")]
    pub reference_weight: f64,

    #[serde(default = "default_amount_weight")]
    pub amount_weight: f64,

    #[serde(default = "default_recency_weight")]
    pub recency_weight: f64,

    /// Route zero-candidate SMS through the retry queue instead of straight
    /// to manual review, in case the intent is created late.
    #[serde(default)]
    pub retry_unmatched: bool,
}

impl MatcherConfig {
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.lookback_hours))
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            lookback_hours: default_lookback_hours(),
            tolerance_min_minor: default_tolerance_min_minor(),
            tolerance_bps: default_tolerance_bps(),
            top_n: default_top_n(),
            auto_match_threshold: default_auto_match_threshold(),
            ambiguity_margin: default_ambiguity_margin(),
            reference_weight: default_reference_weight(),
            amount_weight: default_amount_weight(),
            recency_weight: default_recency_weight(),
            retry_unmatched: false,
        }
    }
}

fn default_lookback_hours() -> u32 {
    48
}

fn default_tolerance_min_minor() -> i64 {
    500
}

fn default_tolerance_bps() -> u32 {
    500
}

fn default_top_n() -> usize {
    10
}

fn default_auto_match_threshold() -> f64 {
    0.4
}

fn default_ambiguity_margin() -> f64 {
    0.05
}

fn default_reference_weight() -> f64 {
    0.5
}

fn default_amount_weight() -> f64 {
    0.4
}

fn default_recency_weight() -> f64 {
    0.1
}

/// Retry queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: u64,

    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Jobs claimed per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// How long a claimed job stays invisible to other sweepers.
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,

    /// `received` SMS untouched for this long are re-driven by the sweeper.
    #[serde(default = "default_stale_received_secs")]
    pub stale_received_secs: u64,
}

impl RetryConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn claim_lease(&self) -> Duration {
        Duration::from_secs(self.claim_lease_secs)
    }

    pub fn stale_received(&self) -> Duration {
        Duration::from_secs(self.stale_received_secs)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_secs: default_base_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            batch_size: default_batch_size(),
            claim_lease_secs: default_claim_lease_secs(),
            stale_received_secs: default_stale_received_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_secs() -> u64 {
    30
}

fn default_max_delay_secs() -> u64 {
    30 * 60
}

fn default_sweep_interval_secs() -> u64 {
    15
}

fn default_batch_size() -> u32 {
    20
}

fn default_claim_lease_secs() -> u64 {
    300
}

fn default_stale_received_secs() -> u64 {
    120
}
