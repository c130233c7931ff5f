//! Policy knowledge base: `kb/*.md` documents keyed by file stem.
//!
//! Loaded once per run and shared read-only. A lookup that finds nothing
//! returns an empty string; callers treat that as "no snippet available".

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

/// Intent aliases → canonical policy key.
const INTENT_ALIASES: &[(&str, &str)] = &[
    ("fraud", "suspected_fraud"),
    ("card_lost", "card_lost_stolen"),
    ("card_lost_stolen", "card_lost_stolen"),
    ("lost_card", "card_lost_stolen"),
    ("stolen_card", "card_lost_stolen"),
    ("dispute", "dispute_timelines"),
    ("disputes", "dispute_timelines"),
    ("credit", "credit_limit_policy"),
    ("general", "general_servicing"),
    ("auth", "auth_safety"),
];

/// Lower-case and trim an intent.
pub fn normalize_intent(intent: &str) -> String {
    intent.trim().to_lowercase()
}

/// Resolve an intent to its canonical policy key.
///
/// Known aliases map through the alias table; anything else becomes the
/// normalised intent with spaces replaced by underscores.
pub fn canonical_key(intent: &str) -> String {
    let normalized = normalize_intent(intent);
    INTENT_ALIASES
        .iter()
        .find(|(alias, _)| *alias == normalized)
        .map(|(_, key)| key.to_string())
        .unwrap_or_else(|| normalized.replace(' ', "_"))
}

/// Read-only policy snippet table.
#[derive(Debug, Clone, Default)]
pub struct PolicyStore {
    snippets: HashMap<String, String>,
}

impl PolicyStore {
    /// Load every `.md` file in `dir`. A missing directory yields an empty store.
    pub fn load(dir: &Path) -> Self {
        if !dir.is_dir() {
            warn!(dir = %dir.display(), "Knowledge-base directory not found, no snippets loaded");
            return Self::default();
        }

        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read knowledge-base directory");
                return Self::default();
            }
        };

        let mut snippets = HashMap::new();
        for entry in entries.flatten() {
            let path = entry.path();
            let is_markdown = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("md"));
            if !is_markdown || !path.is_file() {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match std::fs::read_to_string(&path) {
                Ok(content) => {
                    snippets.insert(stem.to_string(), content.trim().to_string());
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable policy document");
                }
            }
        }

        debug!(dir = %dir.display(), count = snippets.len(), "Loaded policy snippets");
        Self { snippets }
    }

    /// Build a store from in-memory key/content pairs.
    pub fn from_snippets<I, K, V>(snippets: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            snippets: snippets
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Snippet for `intent`, or `""` when none exists.
    ///
    /// Tries the canonical key first, then the raw normalised intent.
    pub fn get_snippet(&self, intent: &str) -> String {
        let key = canonical_key(intent);
        if let Some(snippet) = self.snippets.get(&key) {
            return snippet.clone();
        }
        self.snippets
            .get(&normalize_intent(intent))
            .cloned()
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snippets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snippets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(canonical_key("fraud"), "suspected_fraud");
        assert_eq!(canonical_key(" Card_Lost "), "card_lost_stolen");
        assert_eq!(canonical_key("stolen_card"), "card_lost_stolen");
        assert_eq!(canonical_key("disputes"), "dispute_timelines");
        assert_eq!(canonical_key("credit"), "credit_limit_policy");
        assert_eq!(canonical_key("general"), "general_servicing");
        assert_eq!(canonical_key("auth"), "auth_safety");
    }

    #[test]
    fn unknown_intent_uses_underscored_form() {
        assert_eq!(canonical_key("Account Closure"), "account_closure");
    }

    #[test]
    fn snippet_via_alias() {
        let kb = PolicyStore::from_snippets([("suspected_fraud", "Freeze the card.")]);
        assert_eq!(kb.get_snippet("FRAUD"), "Freeze the card.");
    }

    #[test]
    fn snippet_falls_back_to_raw_intent() {
        // "general" aliases to general_servicing, which is absent; the raw key exists.
        let kb = PolicyStore::from_snippets([("general", "General help.")]);
        assert_eq!(kb.get_snippet("general"), "General help.");
    }

    #[test]
    fn missing_snippet_is_empty_string() {
        let kb = PolicyStore::from_snippets([("card_lost_stolen", "x")]);
        assert_eq!(kb.get_snippet("credit"), "");
        assert_eq!(PolicyStore::default().get_snippet("fraud"), "");
    }

    #[test]
    fn load_reads_markdown_only_and_trims() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("card_lost_stolen.md"), "\n  Block the card.  \n").unwrap();
        std::fs::write(dir.path().join("suspected_fraud.MD"), "Call us.").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let kb = PolicyStore::load(dir.path());
        assert_eq!(kb.len(), 2);
        assert_eq!(kb.get_snippet("card_lost"), "Block the card.");
        assert_eq!(kb.get_snippet("fraud"), "Call us.");
        assert_eq!(kb.get_snippet("notes"), "");
    }

    #[test]
    fn load_missing_dir_is_empty() {
        let kb = PolicyStore::load(Path::new("/no/such/kb"));
        assert!(kb.is_empty());
    }
}
