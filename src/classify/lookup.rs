//! Lookup backend: returns the recorded label for a known message id.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::ClassificationResult;
use crate::dataset::Dataset;

/// Deterministic backend over the reference dataset. Never fails.
#[derive(Debug, Clone, Default)]
pub struct LookupBackend {
    dataset: Option<Arc<Dataset>>,
}

impl LookupBackend {
    pub fn new(dataset: Arc<Dataset>) -> Self {
        Self {
            dataset: Some(dataset),
        }
    }

    /// A backend with no dataset: every call returns the default result.
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Load the dataset from disk, degrading to [`LookupBackend::unavailable`].
    pub fn load(messages_path: &Path) -> Self {
        match Dataset::load(messages_path) {
            Ok(dataset) => Self::new(Arc::new(dataset)),
            Err(e) => {
                warn!(error = %e, "Lookup backend has no dataset, using default classification");
                Self::unavailable()
            }
        }
    }

    pub fn dataset(&self) -> Option<&Arc<Dataset>> {
        self.dataset.as_ref()
    }

    /// Recorded label/queue with confidence 1.0, else the default result.
    pub fn classify(&self, message_id: Option<&str>) -> ClassificationResult {
        let Some(id) = message_id.map(str::trim).filter(|id| !id.is_empty()) else {
            return ClassificationResult::default_general();
        };
        let Some(dataset) = &self.dataset else {
            return ClassificationResult::default_general();
        };
        match dataset.find(id) {
            Some(record) => {
                debug!(id, label = %record.label, "Lookup hit");
                ClassificationResult::new(&record.label, record.suggested_queue.trim(), 1.0)
            }
            None => {
                debug!(id, "Lookup miss, using default classification");
                ClassificationResult::default_general()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MessageRecord;

    fn backend() -> LookupBackend {
        LookupBackend::new(Arc::new(Dataset::from_records(vec![MessageRecord {
            message_id: "m-7".into(),
            text: "my card is gone".into(),
            label: " Card_Lost_Stolen ".into(),
            suggested_queue: " Fraud/Economic Crime Prevention ".into(),
        }])))
    }

    #[test]
    fn known_id_returns_recorded_label() {
        let result = backend().classify(Some("m-7"));
        assert_eq!(result.intent, "card_lost_stolen");
        assert_eq!(result.suggested_queue, "Fraud/Economic Crime Prevention");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn unknown_or_absent_id_returns_default() {
        for id in [None, Some(""), Some("m-404")] {
            let result = backend().classify(id);
            assert_eq!(result, ClassificationResult::default_general());
        }
    }

    #[test]
    fn missing_dataset_returns_default() {
        let backend = LookupBackend::load(Path::new("/no/such/messages.csv"));
        assert!(backend.dataset().is_none());
        let result = backend.classify(Some("m-7"));
        assert_eq!(result.intent, "general");
        assert_eq!(result.confidence, 0.0);
    }
}
