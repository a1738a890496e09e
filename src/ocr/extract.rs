//! Reading extraction from noisy OCR text.
//!
//! Turns the unordered text fragments produced by the recognizer into a
//! single best-guess meter reading: join, strip unit tokens, correct
//! letter/digit confusions, pull out plausible digit runs, and rank them.
//! A photo that yields no valid candidate is flagged for human review
//! instead of being retried.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::{ExtractorConfig, TieBreak};

/// Displayed/persisted value for a reading that needs human review.
pub const NEEDS_REVIEW_SENTINEL: &str = "Cek Foto";

/// Matches plausible meter readings: 5-8 consecutive digits, optionally
/// followed by a decimal point and 1-3 fractional digits. The length bounds
/// keep stray background text (serial fragments, small dial markings) from
/// being mistaken for the reading.
const CANDIDATE_PATTERN: &str = r"\d{5,8}(?:\.\d{1,3})?";

fn candidate_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(CANDIDATE_PATTERN).expect("candidate pattern is valid"))
}

/// Outcome of reading extraction.
///
/// `NeedsReview` means no valid candidate survived; the photo must be
/// checked by a human. It is not an error and the pipeline never retries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reading {
    Confident(String),
    NeedsReview,
}

impl Reading {
    /// The value as persisted in a record. `NeedsReview` keeps the legacy
    /// "Cek Foto" sentinel so downstream consumers see the same signal.
    pub fn value(&self) -> &str {
        match self {
            Reading::Confident(value) => value,
            Reading::NeedsReview => NEEDS_REVIEW_SENTINEL,
        }
    }

    pub fn is_confident(&self) -> bool {
        matches!(self, Reading::Confident(_))
    }
}

/// Extracts the most plausible reading from recognized text fragments.
///
/// Pure function: no side effects, never fails. An empty fragment list
/// yields `NeedsReview`.
pub fn extract(fragments: &[String], config: &ExtractorConfig) -> Reading {
    // Fragment order carries no meaning; join with single spaces, then
    // normalize case and decimal commas before any other step.
    let mut text = fragments.join(" ").to_uppercase().replace(',', ".");

    // Units must go before confusion correction: "KWH" glued onto a reading
    // would otherwise become "1<reading>" via K/W/H neighbors like T and I.
    for unit in &config.units {
        text = text.replace(unit.as_str(), "");
    }

    for (from, to) in &config.corrections {
        text = text.replace(*from, &to.to_string());
    }

    let mut best: Option<&str> = None;
    for m in candidate_regex().find_iter(&text) {
        let candidate = m.as_str();
        if all_digits_identical(candidate) {
            // Runs like 0000000 are near-certainly a false match on dial
            // decoration, not a real reading.
            continue;
        }
        best = match best {
            None => Some(candidate),
            Some(current) => {
                let replace = match config.tie_break {
                    TieBreak::FirstMatch => candidate.len() > current.len(),
                    TieBreak::LastMatch => candidate.len() >= current.len(),
                };
                if replace { Some(candidate) } else { Some(current) }
            }
        };
    }

    match best {
        Some(candidate) => Reading::Confident(candidate.to_string()),
        None => Reading::NeedsReview,
    }
}

/// True if every digit in the candidate is the same (decimal point ignored).
fn all_digits_identical(candidate: &str) -> bool {
    let mut digits = candidate.chars().filter(|c| *c != '.');
    match digits.next() {
        Some(first) => digits.all(|c| c == first),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    fn extract_default(parts: &[&str]) -> Reading {
        extract(&fragments(parts), &ExtractorConfig::default())
    }

    #[test]
    fn test_empty_fragments_need_review() {
        assert_eq!(extract_default(&[]), Reading::NeedsReview);
    }

    #[test]
    fn test_no_long_digit_run_needs_review() {
        // Nothing reaches 5 consecutive digits even after correction.
        let result = extract_default(&["PLN", "meter", "1234", "x9"]);
        assert_eq!(result, Reading::NeedsReview);
        assert_eq!(result.value(), NEEDS_REVIEW_SENTINEL);
        assert!(!result.is_confident());
    }

    #[test]
    fn test_single_valid_run_returned_unchanged() {
        let result = extract_default(&["stand:", "0482915"]);
        assert_eq!(result, Reading::Confident("0482915".to_string()));
        assert!(result.is_confident());
    }

    #[test]
    fn test_longest_candidate_wins() {
        let result = extract_default(&["12345", "1234567"]);
        assert_eq!(result, Reading::Confident("1234567".to_string()));
    }

    #[test]
    fn test_equal_length_tie_goes_to_first_match() {
        let result = extract_default(&["54321", "12345"]);
        assert_eq!(result, Reading::Confident("54321".to_string()));
    }

    #[test]
    fn test_equal_length_tie_last_match_variant() {
        let config = ExtractorConfig {
            tie_break: TieBreak::LastMatch,
            ..ExtractorConfig::default()
        };
        let result = extract(&fragments(&["54321", "12345"]), &config);
        assert_eq!(result, Reading::Confident("12345".to_string()));
    }

    #[test]
    fn test_all_identical_digits_rejected() {
        assert_eq!(extract_default(&["000000"]), Reading::NeedsReview);
        assert_eq!(extract_default(&["77777.7"]), Reading::NeedsReview);
    }

    #[test]
    fn test_identical_run_loses_to_real_reading() {
        let result = extract_default(&["00000000", "48291"]);
        assert_eq!(result, Reading::Confident("48291".to_string()));
    }

    #[test]
    fn test_confusion_mapping() {
        // O->0, B->8: "O12B45" corrects to "012845", a valid 6-digit run.
        let result = extract_default(&["O12B45"]);
        assert_eq!(result, Reading::Confident("012845".to_string()));
    }

    #[test]
    fn test_confusion_mapping_lowercase_input() {
        // Uppercasing happens before correction.
        let result = extract_default(&["o12b45"]);
        assert_eq!(result, Reading::Confident("012845".to_string()));
    }

    #[test]
    fn test_unit_token_stripped_before_correction() {
        let result = extract_default(&["123456", "KWH"]);
        assert_eq!(result, Reading::Confident("123456".to_string()));
    }

    #[test]
    fn test_adjacent_unit_does_not_corrupt_reading() {
        // Without stripping, the H in "KWH" would survive and T/I/L style
        // corrections could fuse unit letters into the digit run.
        let result = extract_default(&["004821KWH"]);
        assert_eq!(result, Reading::Confident("004821".to_string()));
    }

    #[test]
    fn test_kvarh_stripped_before_kvar() {
        let result = extract_default(&["83012 KVARH"]);
        assert_eq!(result, Reading::Confident("83012".to_string()));
    }

    #[test]
    fn test_decimal_comma_normalized() {
        let result = extract_default(&["12345,6"]);
        assert_eq!(result, Reading::Confident("12345.6".to_string()));
    }

    #[test]
    fn test_fractional_reading_kept() {
        let result = extract_default(&["004821.53", "m3"]);
        assert_eq!(result, Reading::Confident("004821.53".to_string()));
    }

    #[test]
    fn test_run_longer_than_eight_digits_truncated_by_pattern() {
        // A 10-digit run matches as its first 8 digits; the 2-digit tail is
        // too short to form a second candidate.
        let result = extract_default(&["1234567890"]);
        assert_eq!(result, Reading::Confident("12345678".to_string()));
    }

    #[test]
    fn test_background_noise_ignored() {
        let result = extract_default(&["SN", "9001", "PLN", "048215", "240V"]);
        assert_eq!(result, Reading::Confident("048215".to_string()));
    }
}
