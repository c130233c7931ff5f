//! Message processor: runs each inbound message through the pipeline.
//!
//! Flow:
//! 1. Redaction, before anything leaves the process
//! 2. Classification with the configured backend
//! 3. Draft generation (escalation, template or generated reply)
//! 4. Guardrail checks on the draft
//!
//! Every stage is total, so `process` cannot fail. Guardrail failures are
//! reported on the item, and the draft is still returned unchanged.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::classify::{BackendKind, Classifier, LookupBackend, TrainedBackend};
use crate::config::PipelineConfig;
use crate::draft::{CONFIDENCE_THRESHOLD, DraftGenerator};
use crate::guardrails;
use crate::kb::PolicyStore;
use crate::llm::{LlmProvider, create_provider};
use crate::pipeline::types::{InboundMessage, ItemStatus, ProcessedMessage};
use crate::redact::{Redactor, load_patterns};

/// Sequences redaction, classification, drafting and validation.
pub struct MessageProcessor {
    redactor: Redactor,
    classifier: Arc<Classifier>,
    drafter: DraftGenerator,
    backend: BackendKind,
}

impl MessageProcessor {
    pub fn new(
        redactor: Redactor,
        classifier: Arc<Classifier>,
        drafter: DraftGenerator,
        backend: BackendKind,
    ) -> Self {
        Self {
            redactor,
            classifier,
            drafter,
            backend,
        }
    }

    /// Wire every component from configuration. Missing inputs degrade to
    /// their defaults; nothing here fails.
    pub fn from_config(config: &PipelineConfig) -> Self {
        config.log_missing_inputs();

        let redactor = Redactor::new(&load_patterns(&config.patterns_path));
        let kb = Arc::new(PolicyStore::load(&config.kb_dir));
        let classifier = Arc::new(Classifier::new(
            LookupBackend::load(&config.messages_path),
            TrainedBackend::new(&config.model_path, &config.messages_path),
        ));

        let mut drafter = DraftGenerator::new(kb.clone(), config.generation.draft_config());
        if let Some(llm) = build_llm(config) {
            drafter = drafter.with_llm(llm);
        }

        let backend = config.resolved_backend();
        info!(
            backend = %backend,
            rules = redactor.rule_count(),
            snippets = kb.len(),
            generation = drafter.generation_available(),
            "Pipeline ready"
        );

        Self::new(redactor, classifier, drafter, backend)
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    pub fn redactor(&self) -> &Redactor {
        &self.redactor
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    pub fn generation_available(&self) -> bool {
        self.drafter.generation_available()
    }

    /// Process a single message through the full pipeline.
    pub async fn process(&self, message: InboundMessage) -> ProcessedMessage {
        let id = message.id.as_deref().unwrap_or("-");
        info!(id = %id, "Processing inbound message");

        // Step 1: redact before the text reaches any model or service
        let redacted_text = self.redactor.redact(&message.text);

        // Step 2: classify
        let classification = self
            .classifier
            .classify(&redacted_text, message.id.as_deref(), self.backend)
            .await;

        if self.drafter.generation_available() && classification.confidence < CONFIDENCE_THRESHOLD {
            debug!(
                id = %id,
                confidence = classification.confidence,
                "Generation skipped: confidence below threshold"
            );
        }

        // Step 3: draft
        let draft = self
            .drafter
            .draft(&classification, Some(&redacted_text))
            .await;

        // Step 4: validate
        let guardrails = guardrails::validate(&draft.text);
        let status = ItemStatus::from_report(&guardrails);
        if !status.is_ok() {
            warn!(id = %id, status = %status.label(), "Draft failed guardrail checks");
        }

        info!(
            id = %id,
            intent = %classification.intent,
            queue = %classification.suggested_queue,
            confidence = classification.confidence,
            used_fallback = draft.used_fallback,
            "Processed message"
        );

        ProcessedMessage {
            message_id: message.id,
            redacted_text,
            classification,
            draft,
            guardrails,
            status,
            processed_at: Utc::now(),
        }
    }

    /// Process a batch sequentially. Each item is independent; a failed
    /// guardrail is an annotation on that item only.
    pub async fn process_batch(&self, messages: Vec<InboundMessage>) -> Vec<ProcessedMessage> {
        let count = messages.len();
        info!(count, "Processing message batch");

        let mut results = Vec::with_capacity(count);
        for message in messages {
            results.push(self.process(message).await);
        }

        let flagged = results.iter().filter(|r| !r.status.is_ok()).count();
        info!(
            processed = results.len(),
            flagged,
            "Batch processing complete"
        );
        results
    }
}

fn build_llm(config: &PipelineConfig) -> Option<Arc<dyn LlmProvider>> {
    let llm_config = config.generation.llm_config()?;
    match create_provider(&llm_config) {
        Ok(provider) => Some(provider),
        Err(e) => {
            warn!(error = %e, "Cannot create generation client, using templates");
            None
        }
    }
}
