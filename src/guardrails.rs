//! Automated checks on drafted replies.
//!
//! Both checks always run, in a fixed order. The validator only reports; it
//! never alters the draft.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// `[kb: <identifier>]`, case-insensitive.
static CITATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[kb:\s*\w+\]").unwrap());

/// Sixteen consecutive digits.
static DIGIT_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{16}").unwrap());

/// Four groups of four digits, optional whitespace between groups.
static GROUPED_CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}\s*\d{4}\s*\d{4}\s*\d{4}").unwrap());

/// A failed check, rendered as its reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailFailure {
    CitationMissing,
    PossiblePiiInDraft,
}

impl GuardrailFailure {
    pub fn code(&self) -> &'static str {
        match self {
            Self::CitationMissing => "citation_missing",
            Self::PossiblePiiInDraft => "possible_pii_in_draft",
        }
    }
}

impl fmt::Display for GuardrailFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Outcome of validating one draft.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailReport {
    pub passed: bool,
    pub failures: Vec<GuardrailFailure>,
}

impl GuardrailReport {
    /// Reason codes in check order.
    pub fn reason_codes(&self) -> Vec<&'static str> {
        self.failures.iter().map(GuardrailFailure::code).collect()
    }

    /// `OK` or `FAIL:<codes>`.
    pub fn status_label(&self) -> String {
        if self.passed {
            "OK".to_string()
        } else {
            format!("FAIL:{}", self.reason_codes().join(","))
        }
    }
}

/// True if the draft carries a policy citation.
pub fn has_citation(draft: &str) -> bool {
    CITATION_RE.is_match(draft)
}

/// True if the draft contains something shaped like a card number.
pub fn has_possible_card_number(draft: &str) -> bool {
    DIGIT_RUN_RE.is_match(draft) || GROUPED_CARD_RE.is_match(draft)
}

/// Run every check against `draft`.
pub fn validate(draft: &str) -> GuardrailReport {
    let mut failures = Vec::new();
    if !has_citation(draft) {
        failures.push(GuardrailFailure::CitationMissing);
    }
    if has_possible_card_number(draft) {
        failures.push(GuardrailFailure::PossiblePiiInDraft);
    }
    GuardrailReport {
        passed: failures.is_empty(),
        failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cited_clean_draft_passes() {
        let report = validate("Please call us. [kb: card_lost_stolen]");
        assert!(report.passed);
        assert!(report.failures.is_empty());
        assert_eq!(report.status_label(), "OK");
    }

    #[test]
    fn citation_match_is_case_insensitive() {
        assert!(has_citation("see [KB:   suspected_fraud]"));
        assert!(!has_citation("see [kb: ]"));
        assert!(!has_citation("see kb: suspected_fraud"));
    }

    #[test]
    fn missing_citation_fails() {
        let report = validate("A colleague will respond shortly.");
        assert!(!report.passed);
        assert_eq!(report.reason_codes(), vec!["citation_missing"]);
    }

    #[test]
    fn sixteen_digit_run_is_flagged_even_with_citation() {
        let report = validate("Your card 4791574123074814 is blocked [kb: card_lost_stolen]");
        assert_eq!(report.failures, vec![GuardrailFailure::PossiblePiiInDraft]);
    }

    #[test]
    fn grouped_card_number_is_flagged() {
        assert!(has_possible_card_number("4791 5741 2307 4814"));
        assert!(has_possible_card_number("47915741 23074814"));
        assert!(!has_possible_card_number("4791-5741-2307-4814"));
        assert!(!has_possible_card_number("call 0800 123 456"));
    }

    #[test]
    fn both_checks_run_and_keep_order() {
        let report = validate("card 1234567812345678");
        assert_eq!(
            report.failures,
            vec![
                GuardrailFailure::CitationMissing,
                GuardrailFailure::PossiblePiiInDraft
            ]
        );
        assert_eq!(report.status_label(), "FAIL:citation_missing,possible_pii_in_draft");
    }

    #[test]
    fn failures_serialize_as_reason_codes() {
        let json = serde_json::to_value(GuardrailFailure::PossiblePiiInDraft).unwrap();
        assert_eq!(json, "possible_pii_in_draft");
    }
}
