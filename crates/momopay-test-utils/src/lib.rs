// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Momopay integration tests.
//!
//! Provides a scripted parser and a harness that wires the full service
//! graph over a temporary SQLite database.
//!
//! # Components
//!
//! - [`MockParser`] - parser with pre-configured results
//! - [`TestHarness`] - services, storage, and the worker queue for one test

pub mod harness;
pub mod mock_parser;

pub use harness::{TestHarness, TestHarnessBuilder};
pub use mock_parser::MockParser;
