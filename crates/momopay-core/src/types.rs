// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain types shared by the storage, parser, pipeline, and gateway crates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Parser,
}

// --- Inbound SMS ---

/// Ingest status of an inbound SMS.
///
/// Transitions only move forward: `received -> parsed | error | manual_review`,
/// `error -> parsed | manual_review`, `manual_review -> parsed | dismissed`.
/// An operator retry is the one way back into `error`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SmsStatus {
    Received,
    Parsed,
    Error,
    ManualReview,
    Dismissed,
}

impl SmsStatus {
    /// Statuses the automatic pipeline may pick up.
    pub const PROCESSABLE: &'static [SmsStatus] = &[SmsStatus::Received, SmsStatus::Error];

    /// Statuses an operator may attach, retry, or dismiss.
    pub const REVIEWABLE: &'static [SmsStatus] = &[SmsStatus::ManualReview, SmsStatus::Error];
}

/// How an operator disposed of an SMS that matched no payment.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DismissResolution {
    Invalid,
    Duplicate,
    LinkedElsewhere,
}

/// One raw SMS delivery as persisted.
///
/// `raw_text` and `from_msisdn` have already been through MSISDN masking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundSms {
    pub id: String,
    pub raw_text: String,
    pub from_msisdn: Option<String>,
    pub to_msisdn: Option<String>,
    pub received_at: DateTime<Utc>,
    pub modem_id: Option<String>,
    pub sim_slot: Option<String>,
    pub status: SmsStatus,
    #[serde(skip)]
    pub dedup_key: String,
    pub failure_reason: Option<String>,
    pub intent_id: Option<String>,
    pub parsed_payment_id: Option<String>,
    pub resolution: Option<DismissResolution>,
    pub resolution_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An SMS ready to be inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewInboundSms {
    pub raw_text: String,
    pub from_msisdn: Option<String>,
    pub to_msisdn: Option<String>,
    pub received_at: DateTime<Utc>,
    pub modem_id: Option<String>,
    pub sim_slot: Option<String>,
    pub dedup_key: String,
}

/// Result of an idempotent SMS insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmsInsert {
    pub sms_id: String,
    /// False when a row with the same dedup key already existed.
    pub created: bool,
}

// --- Parsing ---

/// Fields extracted from an SMS body by a parser run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedFields {
    /// Amount in minor units of `currency`.
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub payer_mask: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
    pub confidence: f64,
    pub parser_version: String,
    pub prompt_id: Option<String>,
}

/// A persisted parser run. A re-parse creates a new row with a higher attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedPayment {
    pub id: String,
    pub sms_id: String,
    pub attempt: u32,
    #[serde(flatten)]
    pub fields: ParsedFields,
    pub created_at: DateTime<Utc>,
}

/// Why a parser could not produce a usable result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureKind {
    UnrecognizedFormat,
    AmbiguousAmount,
    InvalidAmount,
    MissingReference,
    LowConfidence,
    InferenceUnavailable,
}

/// A structured parse failure. Recoverable: it routes the SMS to the retry queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    pub kind: ParseFailureKind,
    pub detail: String,
}

impl ParseFailure {
    pub fn new(kind: ParseFailureKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl std::fmt::Display for ParseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

/// Prompt handed to a parser: either the active prompt or an operator override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSpec {
    pub id: Option<String>,
    pub body: String,
}

/// A versioned parser prompt. Exactly one is active at a time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParserPrompt {
    pub id: String,
    pub label: String,
    pub body: String,
    pub version: i64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl ParserPrompt {
    pub fn spec(&self) -> PromptSpec {
        PromptSpec {
            id: Some(self.id.clone()),
            body: self.body.clone(),
        }
    }
}

// --- Payment intents ---

/// Lifecycle of a payment intent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    Confirmed,
    Failed,
    ManualReview,
    Dismissed,
}

/// Upstream flow that created a payment intent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Ticket,
    Shop,
    Membership,
    Donation,
}

/// An expectation of payment created by a ticket, shop, membership, or donation flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub id: String,
    pub expected_amount_minor: i64,
    pub currency: String,
    pub kind: IntentKind,
    pub owner_reference: String,
    pub status: IntentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub confirmed_sms_id: Option<String>,
    pub suggested_sms_id: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymentIntent {
    pub expected_amount_minor: i64,
    pub currency: String,
    pub kind: IntentKind,
    pub owner_reference: String,
    pub expires_at: Option<DateTime<Utc>>,
}

// --- Matching and reconciliation ---

/// A scored pairing of a parsed payment with a pending intent. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub intent_id: String,
    pub sms_id: String,
    pub score: f64,
    pub amount_delta: i64,
    pub reference_similarity: f64,
    pub within_tolerance_window: bool,
}

/// A conditional claim of an intent by an SMS, applied in one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct IntentClaim {
    pub intent_id: String,
    pub sms_id: String,
    pub parsed_payment_id: Option<String>,
    /// Intent statuses the claim may confirm from.
    pub intent_from: Vec<IntentStatus>,
    /// SMS statuses the claim may resolve from.
    pub sms_from: Vec<SmsStatus>,
    /// Written in the same transaction when present.
    pub audit: Option<AuditEntry>,
}

/// What happened to an [`IntentClaim`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    Claimed,
    /// The intent update changed no rows. `None` means the intent does not exist.
    IntentNotClaimable { status: Option<IntentStatus> },
    /// The intent was claimable but the SMS had moved on; nothing was written.
    SmsNotClaimable { status: Option<SmsStatus> },
}

/// Result of recording a failed processing attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Scheduled {
        attempts_made: u32,
        next_attempt_at: DateTime<Utc>,
    },
    /// The job was removed and the SMS forced to `manual_review`.
    Exhausted { attempts_made: u32 },
}

// --- Retry queue ---

/// Durable retry bookkeeping for one SMS.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryJob {
    pub sms_id: String,
    pub attempts_made: u32,
    pub max_attempts: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_failure_reason: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// --- Audit ---

/// An audit record for a trust-sensitive operator action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub action: String,
    pub entity_type: String,
    pub entity_id: String,
    pub actor_id: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub id: i64,
    #[serde(flatten)]
    pub entry: AuditEntry,
    pub created_at: DateTime<Utc>,
}

// --- Events ---

/// Published on the in-process event bus for downstream consumers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReconciliationEvent {
    Confirmed {
        sms_id: String,
        intent_id: String,
        amount_minor: Option<i64>,
        currency: String,
        operator_id: Option<String>,
    },
    ManualReview {
        sms_id: String,
        reason: String,
    },
    IntentFlagged {
        intent_id: String,
        sms_id: String,
        score: f64,
    },
    RetryScheduled {
        sms_id: String,
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
    RetryExhausted {
        sms_id: String,
        reason: String,
    },
    Dismissed {
        sms_id: String,
        resolution: DismissResolution,
    },
}
