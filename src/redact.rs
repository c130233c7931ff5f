//! PII redaction: ordered regex rules, each match replaced by a mask.
//!
//! Rules come from a YAML pattern file:
//!
//! ```yaml
//! patterns:
//!   - name: card
//!     regex: '\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}'
//!     mask: '[CARD]'
//! ```
//!
//! Redaction is fail-open per rule: a pattern that does not compile is
//! skipped and the remaining rules still run.

use std::borrow::Cow;
use std::path::Path;

use regex::{NoExpand, Regex};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ConfigError;

/// A redaction rule as configured (pattern not yet compiled).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionRule {
    /// Human-readable rule name (e.g. "email").
    #[serde(default)]
    pub name: String,
    /// Regex source.
    pub regex: String,
    /// Literal replacement for every match.
    pub mask: String,
}

impl RedactionRule {
    pub fn new(name: impl Into<String>, regex: impl Into<String>, mask: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            regex: regex.into(),
            mask: mask.into(),
        }
    }
}

/// Raw YAML entry. Entries missing `regex` or `mask` are dropped.
#[derive(Debug, Deserialize)]
struct RawPattern {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    mask: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PatternFile {
    #[serde(default)]
    patterns: Vec<RawPattern>,
}

/// Parse rules from YAML text. Entries missing `regex` or `mask` are dropped.
pub fn parse_patterns(yaml: &str) -> Result<Vec<RedactionRule>, serde_yaml::Error> {
    if yaml.trim().is_empty() {
        return Ok(Vec::new());
    }
    let file: Option<PatternFile> = serde_yaml::from_str(yaml)?;
    let rules = file
        .unwrap_or_default()
        .patterns
        .into_iter()
        .filter_map(|p| {
            let (Some(regex), Some(mask)) = (p.regex, p.mask) else {
                debug!(name = ?p.name, "Dropping pattern without regex or mask");
                return None;
            };
            Some(RedactionRule {
                name: p.name.unwrap_or_default(),
                regex: regex.trim().to_string(),
                mask: mask.trim().to_string(),
            })
        })
        .collect();
    Ok(rules)
}

/// Load rules from a YAML file, reporting IO and parse failures.
pub fn try_load_patterns(path: &Path) -> Result<Vec<RedactionRule>, ConfigError> {
    let yaml = std::fs::read_to_string(path)?;
    parse_patterns(&yaml).map_err(|e| ConfigError::PatternFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load rules from a YAML file. A missing, empty or unreadable file yields
/// zero rules, which makes redaction a no-op.
pub fn load_patterns(path: &Path) -> Vec<RedactionRule> {
    if !path.is_file() {
        warn!(path = %path.display(), "Pattern file not found, redaction disabled");
        return Vec::new();
    }
    match try_load_patterns(path) {
        Ok(rules) => {
            debug!(path = %path.display(), count = rules.len(), "Loaded redaction patterns");
            rules
        }
        Err(e) => {
            warn!(error = %e, "Failed to load pattern file, redaction disabled");
            Vec::new()
        }
    }
}

/// A rule whose pattern compiled.
#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    regex: Regex,
    mask: String,
}

/// Compiled, ordered rule set.
#[derive(Debug, Clone, Default)]
pub struct Redactor {
    rules: Vec<CompiledRule>,
}

impl Redactor {
    /// Compile the given rules, skipping any whose pattern is malformed.
    pub fn new(rules: &[RedactionRule]) -> Self {
        let rules = rules
            .iter()
            .filter_map(|rule| match Regex::new(&rule.regex) {
                Ok(regex) => Some(CompiledRule {
                    name: rule.name.clone(),
                    regex,
                    mask: rule.mask.clone(),
                }),
                Err(e) => {
                    warn!(
                        rule = %rule.name,
                        pattern = %rule.regex,
                        error = %e,
                        "Skipping malformed redaction pattern"
                    );
                    None
                }
            })
            .collect();
        Self { rules }
    }

    /// Number of active (compiled) rules.
    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    /// Apply every rule in order; each rule sees the previous rule's output.
    pub fn redact(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            let replaced = match rule.regex.replace_all(&out, NoExpand(&rule.mask)) {
                Cow::Borrowed(_) => continue,
                Cow::Owned(replaced) => replaced,
            };
            debug!(rule = %rule.name, "Redaction rule matched");
            out = replaced;
        }
        out
    }
}

/// Compile `rules` and redact `text` in one step.
pub fn redact(text: &str, rules: &[RedactionRule]) -> String {
    Redactor::new(rules).redact(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn card_and_email() -> Vec<RedactionRule> {
        vec![
            RedactionRule::new("card", r"\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}", "[CARD]"),
            RedactionRule::new(
                "email",
                r"[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\.[a-zA-Z0-9-.]+",
                "[EMAIL]",
            ),
        ]
    }

    #[test]
    fn card_rule_masks_sixteen_digits() {
        let rules = vec![RedactionRule::new("card", r"\d{16}", "[CARD]")];
        assert_eq!(redact("Card 4791574123074814 used", &rules), "Card [CARD] used");
    }

    #[test]
    fn inline_patterns_remove_card_and_email() {
        let out = redact(
            "My card is 4791-5741-2307-4814 and email is joe@example.com.",
            &card_and_email(),
        );
        assert!(!out.contains("4791") && !out.contains("4814"));
        assert!(!out.contains("joe@example.com"));
        assert!(out.contains("[CARD]"));
        assert!(out.contains("[EMAIL]"));
    }

    #[test]
    fn every_match_is_replaced() {
        let rules = vec![RedactionRule::new("digits", r"\d{3}", "#")];
        assert_eq!(redact("111 222 333", &rules), "# # #");
    }

    #[test]
    fn rules_apply_in_order() {
        // The second rule sees the first rule's mask.
        let rules = vec![
            RedactionRule::new("a", "secret", "[X]"),
            RedactionRule::new("b", r"\[X\]", "[Y]"),
        ];
        assert_eq!(redact("my secret", &rules), "my [Y]");
    }

    #[test]
    fn malformed_pattern_is_skipped() {
        let rules = vec![
            RedactionRule::new("broken", r"(unclosed", "[BAD]"),
            RedactionRule::new("card", r"\d{16}", "[CARD]"),
        ];
        let redactor = Redactor::new(&rules);
        assert_eq!(redactor.rule_count(), 1);
        assert_eq!(redactor.redact("1234567812345678"), "[CARD]");
    }

    #[test]
    fn mask_is_literal() {
        let rules = vec![RedactionRule::new("sc", r"(\d{2})-(\d{2})-(\d{2})", "$1-**-**")];
        assert_eq!(redact("sort code 12-34-56", &rules), "sort code $1-**-**");
    }

    #[test]
    fn no_rules_is_identity() {
        assert_eq!(redact("unchanged 4791574123074814", &[]), "unchanged 4791574123074814");
    }

    #[test]
    fn parse_drops_incomplete_entries_and_trims() {
        let yaml = r#"
patterns:
  - name: card
    regex: '  \d{16}  '
    mask: ' [CARD] '
  - name: no_mask
    regex: 'foo'
  - name: no_regex
    mask: '[X]'
  - regex: '[a-z]+@[a-z]+\.com'
    mask: '[EMAIL]'
"#;
        let rules = parse_patterns(yaml).unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].regex, r"\d{16}");
        assert_eq!(rules[0].mask, "[CARD]");
        assert_eq!(rules[1].name, "");
    }

    #[test]
    fn parse_empty_document() {
        assert!(parse_patterns("").unwrap().is_empty());
        assert!(parse_patterns("---\n").unwrap().is_empty());
        assert!(parse_patterns("other: 1\n").unwrap().is_empty());
    }

    #[test]
    fn load_missing_file_yields_no_rules() {
        assert!(load_patterns(Path::new("/no/such/pii_patterns.yaml")).is_empty());
    }

    #[test]
    fn load_from_file_redacts_email() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pii_patterns.yaml");
        std::fs::write(
            &path,
            "patterns:\n  - name: email\n    regex: '[a-zA-Z0-9_.+-]+@[a-zA-Z0-9-]+\\.[a-zA-Z0-9-.]+'\n    mask: '[EMAIL]'\n",
        )
        .unwrap();
        let rules = load_patterns(&path);
        assert_eq!(rules.len(), 1);
        let out = redact("Contact me at alice@test.co.uk", &rules);
        assert!(!out.contains("alice@test.co.uk"));
        assert!(out.contains("[EMAIL]"));
    }

    proptest! {
        #[test]
        fn matched_card_numbers_never_survive(
            prefix in "[a-z ]{0,20}",
            card in "[0-9]{16}",
            suffix in "[a-z ]{0,20}",
        ) {
            let rules = vec![RedactionRule::new("card", r"\d{16}", "[CARD]")];
            let out = redact(&format!("{prefix}{card}{suffix}"), &rules);
            prop_assert!(!out.contains(&card));
            prop_assert!(out.contains("[CARD]"));
        }

        #[test]
        fn redaction_never_panics(text in ".{0,200}") {
            let _ = redact(&text, &card_and_email());
        }
    }
}
