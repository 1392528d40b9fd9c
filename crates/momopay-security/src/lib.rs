// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Data protection for the Momopay reconciliation service.
//!
//! Provides the MSISDN masking policy, in-text MSISDN redaction applied
//! before anything is persisted, a log writer that redacts secrets and
//! phone numbers, and constant-time token comparison.

pub mod mask;
pub mod redact;
pub mod token;

pub use mask::{MsisdnRedactor, mask_address, mask_msisdn};
pub use redact::{RedactingWriter, redact};
pub use token::tokens_match;
