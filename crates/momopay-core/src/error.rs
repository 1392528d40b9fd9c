// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Momopay reconciliation service.

use thiserror::Error;

/// The primary error type used across all Momopay adapter traits and core operations.
#[derive(Debug, Error)]
pub enum MomopayError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Parser backend errors (inference service failure, malformed response).
    ///
    /// A parser that merely cannot make sense of an SMS reports a
    /// [`ParseFailure`](crate::types::ParseFailure) instead.
    #[error("parser error: {message}")]
    Parser {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The SMS has already been resolved and cannot be attached or dismissed again.
    #[error("sms {sms_id} already resolved (status {status})")]
    AlreadyResolved { sms_id: String, status: String },

    /// The payment intent lost its open state before the claim landed.
    #[error("payment intent {intent_id} is no longer pending (status {status})")]
    IntentNotPending { intent_id: String, status: String },

    /// Missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Request payload failed validation.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MomopayError {
    /// Stable machine-readable code surfaced to operator clients.
    pub fn code(&self) -> &'static str {
        match self {
            MomopayError::NotFound { .. } => "not_found",
            MomopayError::AlreadyResolved { .. } => "already_resolved",
            MomopayError::IntentNotPending { .. } => "intent_not_pending",
            MomopayError::Unauthorized => "unauthorized",
            MomopayError::Validation(_) => "invalid_request",
            MomopayError::Timeout { .. } => "timeout",
            MomopayError::Config(_)
            | MomopayError::Storage { .. }
            | MomopayError::Parser { .. }
            | MomopayError::Internal(_) => "internal",
        }
    }

    /// Shorthand for boxing any error as a storage failure.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MomopayError::Storage {
            source: Box::new(err),
        }
    }
}
