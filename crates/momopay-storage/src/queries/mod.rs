// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Query modules, one per table.

pub mod audit;
pub mod inbound_sms;
pub mod parsed_payments;
pub mod payment_intents;
pub mod prompts;
pub mod retry_jobs;
