//! Offline evaluation over the message dataset.
//!
//! Two reports:
//! - queue accuracy of a classifier backend against the recorded queues
//! - guardrail pass/fail counts for template drafts on a sample of rows

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classify::{BackendKind, Classifier, LookupBackend, TrainedBackend};
use crate::config::PipelineConfig;
use crate::dataset::Dataset;
use crate::draft::{DraftConfig, DraftGenerator};
use crate::error::Result;
use crate::guardrails;
use crate::kb::PolicyStore;
use crate::redact::{Redactor, load_patterns};

/// Queue-routing accuracy for one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub backend: BackendKind,
    pub accuracy: f64,
    pub correct: usize,
    pub total: usize,
}

/// Guardrail outcomes for sampled drafts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftCheckSummary {
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalReport {
    pub classification: ClassificationMetrics,
    pub draft_checks: DraftCheckSummary,
}

/// Classify every row (redacted text plus its id) and compare queues.
pub async fn classification_metrics(
    dataset: &Dataset,
    redactor: &Redactor,
    classifier: &Classifier,
    backend: BackendKind,
) -> ClassificationMetrics {
    let mut correct = 0;
    for record in dataset.records() {
        let redacted = redactor.redact(&record.text);
        let result = classifier
            .classify(&redacted, Some(&record.message_id), backend)
            .await;
        if result.suggested_queue == record.suggested_queue.trim() {
            correct += 1;
        }
    }

    let total = dataset.len();
    let accuracy = if total == 0 {
        0.0
    } else {
        correct as f64 / total as f64
    };
    ClassificationMetrics {
        backend,
        accuracy,
        correct,
        total,
    }
}

/// Draft the first `limit` rows with lookup labels and templates only, then
/// count guardrail passes.
pub async fn eval_draft_checks(
    dataset: &Dataset,
    redactor: &Redactor,
    lookup: &LookupBackend,
    kb: Arc<PolicyStore>,
    limit: usize,
) -> DraftCheckSummary {
    let drafter = DraftGenerator::new(kb, DraftConfig::default());
    let mut summary = DraftCheckSummary {
        passed: 0,
        failed: 0,
        total: 0,
    };

    for record in dataset.records().iter().take(limit) {
        let redacted = redactor.redact(&record.text);
        let classification = lookup.classify(Some(&record.message_id));
        let draft = drafter.draft(&classification, Some(&redacted)).await;
        if guardrails::validate(&draft.text).passed {
            summary.passed += 1;
        } else {
            summary.failed += 1;
        }
        summary.total += 1;
    }
    summary
}

/// Run both evaluations from configuration. Fails only when the dataset
/// cannot be read.
pub async fn evaluate(config: &PipelineConfig, limit: usize) -> Result<EvalReport> {
    let dataset = Arc::new(Dataset::load(&config.messages_path)?);
    let redactor = Redactor::new(&load_patterns(&config.patterns_path));
    let kb = Arc::new(PolicyStore::load(&config.kb_dir));
    let backend = config.resolved_backend();

    let classifier = Classifier::new(
        LookupBackend::new(dataset.clone()),
        TrainedBackend::new(&config.model_path, &config.messages_path),
    );

    let classification = classification_metrics(&dataset, &redactor, &classifier, backend).await;
    let draft_checks =
        eval_draft_checks(&dataset, &redactor, classifier.lookup(), kb, limit).await;

    info!(
        backend = %backend,
        accuracy = classification.accuracy,
        passed = draft_checks.passed,
        failed = draft_checks.failed,
        "Evaluation complete"
    );

    Ok(EvalReport {
        classification,
        draft_checks,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::MessageRecord;
    use crate::error::{DatasetError, Error};

    fn record(id: &str, label: &str, queue: &str) -> MessageRecord {
        MessageRecord {
            message_id: id.into(),
            text: format!("message {id}"),
            label: label.into(),
            suggested_queue: queue.into(),
        }
    }

    fn dataset() -> Arc<Dataset> {
        Arc::new(Dataset::from_records(vec![
            record("1", "card_lost_stolen", "Fraud/Economic Crime Prevention"),
            record("2", "credit", " Credit/Risk "),
            record("3", "fraud", "Fraud/Economic Crime Prevention"),
        ]))
    }

    #[tokio::test]
    async fn lookup_backend_is_exact_on_its_own_dataset() {
        let dataset = dataset();
        let classifier = Classifier::new(
            LookupBackend::new(dataset.clone()),
            TrainedBackend::new("/no/model.json", "/no/messages.csv"),
        );
        let metrics =
            classification_metrics(&dataset, &Redactor::default(), &classifier, BackendKind::Lookup)
                .await;
        assert_eq!(metrics.correct, 3);
        assert_eq!(metrics.total, 3);
        assert_eq!(metrics.accuracy, 1.0);
    }

    #[tokio::test]
    async fn empty_dataset_has_zero_accuracy() {
        let classifier = Classifier::new(
            LookupBackend::unavailable(),
            TrainedBackend::new("/no/model.json", "/no/messages.csv"),
        );
        let metrics = classification_metrics(
            &Dataset::default(),
            &Redactor::default(),
            &classifier,
            BackendKind::Lookup,
        )
        .await;
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.accuracy, 0.0);
    }

    #[tokio::test]
    async fn draft_checks_count_template_passes() {
        let dataset = dataset();
        let kb = Arc::new(PolicyStore::from_snippets([
            ("card_lost_stolen", "Block the card."),
            ("suspected_fraud", "Freeze the card."),
        ]));
        let summary = eval_draft_checks(
            &dataset,
            &Redactor::default(),
            &LookupBackend::new(dataset.clone()),
            kb,
            10,
        )
        .await;
        // row 2 (credit) escalates without a citation
        assert_eq!(
            summary,
            DraftCheckSummary {
                passed: 2,
                failed: 1,
                total: 3
            }
        );
    }

    #[tokio::test]
    async fn draft_checks_respect_limit() {
        let dataset = dataset();
        let summary = eval_draft_checks(
            &dataset,
            &Redactor::default(),
            &LookupBackend::new(dataset.clone()),
            Arc::new(PolicyStore::default()),
            1,
        )
        .await;
        assert_eq!(summary.total, 1);
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn missing_dataset_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::with_data_dir(dir.path());
        let err = evaluate(&config, 5).await.unwrap_err();
        assert!(matches!(err, Error::Dataset(DatasetError::NotFound(_))));
    }
}
