//! Intent classification.
//!
//! Two backends implement the same contract:
//! - **Lookup**: recorded labels from the reference dataset (never fails).
//! - **Trained**: the two-head statistical model (may fail to load/train).
//!
//! [`Classifier::classify`] is total: a trained-backend failure is converted
//! into a lookup classification at the call site.

pub mod lookup;
pub mod model;
pub mod trained;

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub use lookup::LookupBackend;
pub use model::{DEFAULT_QUEUE, MultiTaskModel, TrainingOptions};
pub use trained::TrainedBackend;

/// Output of any classification backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Normalised (trimmed, lower-case) intent.
    pub intent: String,
    /// Routing queue display name.
    pub suggested_queue: String,
    /// Always within `[0.0, 1.0]`.
    pub confidence: f64,
}

impl ClassificationResult {
    /// Build a result, normalising the intent and clamping the confidence.
    pub fn new(intent: &str, suggested_queue: &str, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            intent: intent.trim().to_lowercase(),
            suggested_queue: suggested_queue.to_string(),
            confidence,
        }
    }

    /// `general` / default queue / zero confidence.
    pub fn default_general() -> Self {
        Self::new("general", DEFAULT_QUEUE, 0.0)
    }
}

/// Backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Lookup,
    Trained,
}

impl BackendKind {
    /// Parse a backend name. `stub` and `mtl` are accepted as aliases.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "lookup" | "stub" => Some(Self::Lookup),
            "trained" | "mtl" => Some(Self::Trained),
            _ => None,
        }
    }

    /// Parse a backend name, using the lookup backend for anything unrecognised.
    pub fn from_name_or_lookup(name: &str) -> Self {
        Self::from_name(name).unwrap_or_else(|| {
            warn!(backend = name, "Unknown classifier backend, using lookup");
            Self::Lookup
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Trained => "trained",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Use `result` if it succeeded, otherwise log and take `fallback()`.
pub fn or_fallback<E: fmt::Display>(
    result: Result<ClassificationResult, E>,
    fallback: impl FnOnce() -> ClassificationResult,
) -> ClassificationResult {
    match result {
        Ok(result) => result,
        Err(e) => {
            warn!(error = %e, "Classifier backend failed, falling back to lookup");
            fallback()
        }
    }
}

/// Backend dispatcher.
#[derive(Debug)]
pub struct Classifier {
    lookup: LookupBackend,
    trained: TrainedBackend,
}

impl Classifier {
    pub fn new(lookup: LookupBackend, trained: TrainedBackend) -> Self {
        Self { lookup, trained }
    }

    pub fn lookup(&self) -> &LookupBackend {
        &self.lookup
    }

    pub fn trained(&self) -> &TrainedBackend {
        &self.trained
    }

    /// Classify `text` with the selected backend. Never fails.
    pub async fn classify(
        &self,
        text: &str,
        message_id: Option<&str>,
        backend: BackendKind,
    ) -> ClassificationResult {
        let result = match backend {
            BackendKind::Lookup => self.lookup.classify(message_id),
            BackendKind::Trained => or_fallback(self.trained.classify(text).await, || {
                self.lookup.classify(message_id)
            }),
        };
        debug!(
            backend = %backend,
            intent = %result.intent,
            queue = %result.suggested_queue,
            confidence = result.confidence,
            "Classified message"
        );
        result
    }

    /// Classify with a backend chosen by name; unknown names use lookup.
    pub async fn classify_by_name(
        &self,
        text: &str,
        message_id: Option<&str>,
        backend: &str,
    ) -> ClassificationResult {
        self.classify(text, message_id, BackendKind::from_name_or_lookup(backend))
            .await
    }
}
