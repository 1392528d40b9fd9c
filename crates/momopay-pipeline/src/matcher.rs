// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Candidate search and scoring.
//!
//! A candidate's score is a weighted sum of three components, each in [0, 1]:
//! reference similarity, amount closeness within the tolerance band, and
//! intent recency within the lookback window. Only the top candidate can be
//! auto-matched, and only when it clears the threshold by itself.

use chrono::{DateTime, Utc};
use momopay_config::model::MatcherConfig;
use momopay_core::types::{MatchCandidate, PaymentIntent};
use momopay_core::{MomopayError, StorageAdapter};
use strsim::jaro_winkler;
use tracing::debug;

/// Jaro-Winkler similarity below this counts as no reference evidence.
const FUZZY_REFERENCE_FLOOR: f64 = 0.85;

/// Shortest owner reference searched for verbatim in the SMS body.
const MIN_REFERENCE_LEN: usize = 4;

/// What the matcher knows about one parsed SMS.
#[derive(Debug, Clone)]
pub struct MatchInput<'a> {
    pub sms_id: &'a str,
    pub amount_minor: i64,
    pub currency: &'a str,
    pub reference: &'a str,
    /// Masked SMS body, searched for the intent's owner reference.
    pub text: &'a str,
    pub received_at: DateTime<Utc>,
}

/// The matcher's verdict on a ranked candidate list.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchDecision {
    NoCandidates,
    /// Safe to reconcile automatically.
    Auto(MatchCandidate),
    /// Top two are within the ambiguity margin. Nothing is guessed.
    Ambiguous {
        top: MatchCandidate,
        runner_up: MatchCandidate,
    },
    /// A lone best candidate that does not clear the auto-match threshold.
    BelowThreshold(MatchCandidate),
}

#[derive(Debug, Clone)]
pub struct CandidateMatcher {
    config: MatcherConfig,
}

impl CandidateMatcher {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// The greater of the fixed minimum and the percentage of `amount_minor`.
    pub fn tolerance(&self, amount_minor: i64) -> i64 {
        let pct = (i128::from(amount_minor.abs()) * i128::from(self.config.tolerance_bps)) / 10_000;
        let pct = i64::try_from(pct).unwrap_or(i64::MAX);
        pct.max(self.config.tolerance_min_minor)
    }

    /// Inclusive `(min, max)` band of expected amounts for a parsed amount.
    pub fn amount_window(&self, amount_minor: i64) -> (i64, i64) {
        let tolerance = self.tolerance(amount_minor);
        (
            amount_minor.saturating_sub(tolerance),
            amount_minor.saturating_add(tolerance),
        )
    }

    /// Scores one intent. `within_tolerance_window` is false when the amount
    /// or currency falls outside the band.
    pub fn score(&self, input: &MatchInput<'_>, intent: &PaymentIntent) -> MatchCandidate {
        let tolerance = self.tolerance(input.amount_minor).max(1);
        let delta = intent.expected_amount_minor - input.amount_minor;
        let within = intent.currency.eq_ignore_ascii_case(input.currency) && delta.abs() <= tolerance;

        let closeness = if within {
            1.0 - (delta.abs() as f64 / tolerance as f64)
        } else {
            0.0
        };

        let lookback_secs = self.config.lookback().num_seconds().max(1) as f64;
        let age_secs = (input.received_at - intent.created_at).num_seconds().max(0) as f64;
        let recency = (1.0 - age_secs / lookback_secs).clamp(0.0, 1.0);

        let reference_similarity = reference_similarity(input, &intent.owner_reference);

        let weights = self.config.reference_weight + self.config.amount_weight + self.config.recency_weight;
        let raw = self.config.reference_weight * reference_similarity
            + self.config.amount_weight * closeness
            + self.config.recency_weight * recency;
        let score = if weights > 0.0 {
            (raw / weights).clamp(0.0, 1.0)
        } else {
            0.0
        };

        MatchCandidate {
            intent_id: intent.id.clone(),
            sms_id: input.sms_id.to_string(),
            score,
            amount_delta: delta,
            reference_similarity,
            within_tolerance_window: within,
        }
    }

    /// Scores, filters to the tolerance window, sorts best first, and keeps
    /// the configured top-N.
    pub fn rank(&self, input: &MatchInput<'_>, intents: &[PaymentIntent]) -> Vec<MatchCandidate> {
        let mut candidates: Vec<MatchCandidate> = intents
            .iter()
            .map(|intent| self.score(input, intent))
            .filter(|c| c.within_tolerance_window)
            .collect();
        candidates.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.amount_delta.abs().cmp(&b.amount_delta.abs()))
                .then_with(|| a.intent_id.cmp(&b.intent_id))
        });
        candidates.truncate(self.config.top_n);
        candidates
    }

    /// Pending intents within the lookback and amount window, ranked.
    pub async fn find_candidates(
        &self,
        storage: &dyn StorageAdapter,
        input: &MatchInput<'_>,
        now: DateTime<Utc>,
    ) -> Result<Vec<MatchCandidate>, MomopayError> {
        let (min, max) = self.amount_window(input.amount_minor);
        let since = input.received_at - self.config.lookback();
        let intents = storage
            .find_pending_by_amount_range(input.currency, min, max, since, now)
            .await?;
        let ranked = self.rank(input, &intents);
        debug!(
            sms_id = input.sms_id,
            searched = intents.len(),
            candidates = ranked.len(),
            "candidate search complete"
        );
        Ok(ranked)
    }

    pub fn decide(&self, candidates: &[MatchCandidate]) -> MatchDecision {
        let Some(top) = candidates.first() else {
            return MatchDecision::NoCandidates;
        };
        if let Some(runner_up) = candidates.get(1) {
            if top.score - runner_up.score < self.config.ambiguity_margin {
                return MatchDecision::Ambiguous {
                    top: top.clone(),
                    runner_up: runner_up.clone(),
                };
            }
        }
        if top.score > self.config.auto_match_threshold {
            MatchDecision::Auto(top.clone())
        } else {
            MatchDecision::BelowThreshold(top.clone())
        }
    }
}

/// 1.0 when the owner reference appears verbatim in the parsed reference or
/// the SMS body, the Jaro-Winkler similarity when it is high, else 0.
fn reference_similarity(input: &MatchInput<'_>, owner_reference: &str) -> f64 {
    let owner = owner_reference.trim().to_ascii_lowercase();
    let parsed = input.reference.trim().to_ascii_lowercase();
    if owner.is_empty() || parsed.is_empty() {
        return 0.0;
    }
    if parsed.contains(&owner) || owner.contains(&parsed) {
        return 1.0;
    }
    if owner.len() >= MIN_REFERENCE_LEN && input.text.to_ascii_lowercase().contains(&owner) {
        return 1.0;
    }
    let similarity = jaro_winkler(&owner, &parsed);
    if similarity >= FUZZY_REFERENCE_FLOOR {
        similarity
    } else {
        0.0
    }
}
