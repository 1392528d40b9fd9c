// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SMS payment parsers.
//!
//! [`PatternParser`] is deterministic and always available.
//! [`InferenceParser`] calls an OpenAI-compatible API and is composed behind
//! [`FallbackParser`] so a slow or failing model degrades to pattern parsing.

pub mod fallback;
pub mod inference;
pub mod pattern;

use std::sync::Arc;

use momopay_config::model::ParserConfig;
use momopay_core::{MomopayError, PaymentParser};
use tracing::info;

pub use fallback::FallbackParser;
pub use inference::InferenceParser;
pub use pattern::{PATTERN_PARSER_VERSION, PatternParser, to_minor_units};

/// Builds the parser stack described by `config`.
pub fn build_parser(config: &ParserConfig) -> Result<Arc<dyn PaymentParser>, MomopayError> {
    let pattern = PatternParser::from_config(config);
    match InferenceParser::from_config(config)? {
        Some(inference) => {
            info!(model = %config.inference.model, "inference parser enabled with pattern fallback");
            Ok(Arc::new(FallbackParser::new(
                Arc::new(inference),
                pattern,
                config.inference.timeout(),
            )))
        }
        None => {
            info!("pattern parser enabled");
            Ok(Arc::new(pattern))
        }
    }
}
