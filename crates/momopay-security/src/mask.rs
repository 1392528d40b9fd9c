// SPDX-FileCopyrightText: 2026 Momopay Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! MSISDN masking.
//!
//! One policy everywhere: keep a three-digit prefix and a two-digit suffix,
//! mask every digit in between, and never mask fewer than two digits.

use std::sync::LazyLock;

use regex::Regex;

const KEEP_PREFIX: usize = 3;
const KEEP_SUFFIX: usize = 2;
const MIN_MASKED: usize = 2;
const MASK_CHAR: char = '*';

/// Phone-shaped tokens: optional country code, optional trunk zero, a mobile
/// prefix of 7, then eight digits. Space, dash and dot separators are
/// accepted between digit groups only when a country code or trunk zero
/// leads, so dotted amounts like `750.000.000` stay intact.
pub const DEFAULT_MSISDN_PATTERN: &str = concat!(
    r"\+?\b(?:(?:2\d{2})?0?7\d{8}",
    r"|(?:2\d{2}[ .-]?0?|0)7\d{2}[ .-]?\d{3}[ .-]?\d{3}",
    r"|(?:2\d{2}[ .-]?0?|0)7\d{2}[ .-]?\d{2}[ .-]?\d{2}[ .-]?\d{2}",
    r")\b"
);

/// A token that has already been masked by [`mask_msisdn`].
static MASKED_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{3}\*{2,}\d{2}\b").unwrap());

/// Masks a raw MSISDN. Returns `None` when the input does not carry enough
/// digits to mask safely.
///
/// Separators (spaces, dashes, a leading `+`) are dropped; only digits count.
pub fn mask_msisdn(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.len() < KEEP_PREFIX + KEEP_SUFFIX + MIN_MASKED {
        return None;
    }
    let masked_len = digits.len() - KEEP_PREFIX - KEEP_SUFFIX;
    let mut out = String::with_capacity(digits.len());
    out.extend(&digits[..KEEP_PREFIX]);
    out.extend(std::iter::repeat_n(MASK_CHAR, masked_len));
    out.extend(&digits[digits.len() - KEEP_SUFFIX..]);
    Some(out)
}

/// Masks a transport address (`from`/`to`). Inputs with too few digits to
/// be a subscriber number, such as alphanumeric sender ids and short codes,
/// are kept as given.
pub fn mask_address(raw: &str) -> String {
    let raw = raw.trim();
    mask_msisdn(raw).unwrap_or_else(|| raw.to_string())
}

/// Finds phone-shaped tokens in free text and masks them in place.
#[derive(Debug, Clone)]
pub struct MsisdnRedactor {
    pattern: Regex,
}

impl MsisdnRedactor {
    /// Builds a redactor from a custom pattern.
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// Replaces every MSISDN-shaped token with its masked form.
    pub fn redact(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &regex::Captures<'_>| {
                mask_msisdn(&caps[0]).unwrap_or_else(|| "[MSISDN]".to_string())
            })
            .into_owned()
    }

    /// Whether the text still contains an unmasked MSISDN.
    pub fn contains_msisdn(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }

    /// The masked form of the first payer number in `text`, whether it is
    /// still raw or was masked upstream.
    pub fn first_masked(&self, text: &str) -> Option<String> {
        let raw = self.pattern.find(text).map(|m| (m.start(), m.as_str()));
        let masked = MASKED_TOKEN.find(text).map(|m| (m.start(), m.as_str()));
        match (raw, masked) {
            (Some((raw_at, raw)), Some((masked_at, masked))) => {
                if raw_at < masked_at {
                    mask_msisdn(raw)
                } else {
                    Some(masked.to_string())
                }
            }
            (Some((_, raw)), None) => mask_msisdn(raw),
            (None, Some((_, masked))) => Some(masked.to_string()),
            (None, None) => None,
        }
    }
}

impl Default for MsisdnRedactor {
    fn default() -> Self {
        Self::new(DEFAULT_MSISDN_PATTERN).unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn masks_local_number() {
        assert_eq!(mask_msisdn("0788123456").as_deref(), Some("078*****56"));
    }

    #[test]
    fn masks_international_number() {
        assert_eq!(
            mask_msisdn("+250 788 123 456").as_deref(),
            Some("250*******56")
        );
    }

    #[test]
    fn short_input_is_not_masked() {
        assert_eq!(mask_msisdn("123456"), None);
        assert_eq!(mask_msisdn("MoMo"), None);
        assert_eq!(mask_msisdn("1234567").as_deref(), Some("123**67"));
    }

    #[test]
    fn redacts_number_in_sms_body() {
        let redactor = MsisdnRedactor::default();
        let text = "You have received 15000 RWF from 0788123456. TxId: ABC123";
        let out = redactor.redact(text);
        assert_eq!(
            out,
            "You have received 15000 RWF from 078*****56. TxId: ABC123"
        );
        assert!(!out.contains("0788123456"));
        assert!(!redactor.contains_msisdn(&out));
    }

    #[test]
    fn leaves_amounts_and_references_alone() {
        let redactor = MsisdnRedactor::default();
        let text = "Payment of 1,500,000 RWF. Ref: 12345678. Balance 250000";
        assert_eq!(redactor.redact(text), text);
        let dotted = "Payment of 750.000.000 RWF received";
        assert_eq!(redactor.redact(dotted), dotted);
    }

    #[test]
    fn redacts_numbers_written_with_separators() {
        let redactor = MsisdnRedactor::default();
        let cases = [
            ("from 0788 123 456.", "from 078*****56."),
            ("from +250 788 123 456 ok", "from 250*******56 ok"),
            ("from 250-788-123-456 ok", "from 250*******56 ok"),
            ("from 0788.12.34.56 ok", "from 078*****56 ok"),
        ];
        for (text, expected) in cases {
            let out = redactor.redact(text);
            assert_eq!(out, expected, "input: {text}");
            assert!(!redactor.contains_msisdn(&out));
        }
    }

    #[test]
    fn address_masking_ignores_separators_and_keeps_sender_ids() {
        assert_eq!(mask_address("+250 788 123 456"), "250*******56");
        assert_eq!(mask_address(" 0788-123-456 "), "078*****56");
        assert_eq!(mask_address("M-Money"), "M-Money");
        assert_eq!(mask_address("162"), "162");
    }

    #[test]
    fn first_masked_accepts_raw_or_premasked() {
        let redactor = MsisdnRedactor::default();
        assert_eq!(
            redactor.first_masked("from +250788123456 ok").as_deref(),
            Some("250*******56")
        );
        assert_eq!(
            redactor.first_masked("from 078*****56 ok").as_deref(),
            Some("078*****56")
        );
        assert_eq!(redactor.first_masked("no payer here"), None);
    }

    proptest! {
        #[test]
        fn masked_output_never_reveals_middle(digits in "[0-9]{7,15}") {
            let masked = mask_msisdn(&digits).expect("long enough");
            prop_assert_eq!(masked.len(), digits.len());
            prop_assert_eq!(&masked[..3], &digits[..3]);
            prop_assert_eq!(&masked[masked.len() - 2..], &digits[digits.len() - 2..]);
            let stars = masked.chars().filter(|c| *c == '*').count();
            prop_assert!(stars >= 2);
            prop_assert_eq!(stars, digits.len() - 5);
        }

        #[test]
        fn redacted_text_has_no_raw_mobile_numbers(
            prefix in "[a-zA-Z ]{0,20}",
            number in "07[0-9]{8}",
            suffix in "[a-zA-Z .]{0,20}",
        ) {
            let redactor = MsisdnRedactor::default();
            let text = format!("{prefix} {number} {suffix}");
            let out = redactor.redact(&text);
            prop_assert!(!out.contains(&number));
        }
    }
}
