// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Momopay SMS reconciliation service.
//!
//! This crate provides the error type, the domain types, and the adapter
//! traits the storage and parser backends implement.

pub mod backoff;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use backoff::RetryPolicy;
pub use error::MomopayError;
pub use types::{
    AdapterType, AuditEntry, AuditRecord, ClaimOutcome, DismissResolution, HealthStatus,
    InboundSms, IntentClaim, IntentKind, IntentStatus, MatchCandidate, NewInboundSms,
    NewPaymentIntent, ParseFailure, ParseFailureKind, ParsedFields, ParsedPayment, ParserPrompt,
    PaymentIntent, PromptSpec, ReconciliationEvent, RetryJob, RetryOutcome, SmsInsert, SmsStatus,
};

pub use traits::{PaymentParser, PluginAdapter, StorageAdapter};
