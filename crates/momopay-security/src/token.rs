// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared-secret comparison.

use sha2::{Digest, Sha256};

/// Compares a presented token against the expected one without an early exit.
///
/// Both sides are hashed first, so neither the length nor the position of
/// the first differing byte shows up in timing.
pub fn tokens_match(presented: &str, expected: &str) -> bool {
    let a = Sha256::digest(presented.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    let mut diff: u8 = 0;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_tokens_match() {
        assert!(tokens_match("s3cret-token", "s3cret-token"));
    }

    #[test]
    fn different_tokens_do_not_match() {
        assert!(!tokens_match("s3cret-token", "s3cret-tokeN"));
        assert!(!tokens_match("short", "s3cret-token"));
        assert!(!tokens_match("", "s3cret-token"));
    }
}
