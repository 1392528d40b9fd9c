// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP surface of the Momopay reconciliation service.
//!
//! The modem relay posts SMS to the webhook; operators drive manual review,
//! retries, prompt management, and payment intents through `/admin`. Each
//! surface has its own bearer token and fails closed without one.

pub mod admin;
pub mod auth;
pub mod error;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use error::{ApiError, ErrorResponse};
pub use server::{GatewayState, HealthState, router, start_server};
