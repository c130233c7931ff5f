//! Draft reply generation: a confidence-gated escalation state machine.
//!
//! Decision order for one classified message:
//! 1. Intent outside the draft scope → escalate ("a colleague will respond").
//! 2. No policy snippet for the intent → escalate ("we need to escalate").
//! 3. Snippet available → build the deterministic template, then:
//!    a. confidence below threshold → template
//!    b. generation unavailable or empty input → template
//!    c. otherwise call the generation service; any failure → template
//!
//! Every branch returns a [`DraftResult`]; nothing propagates to the caller.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classify::ClassificationResult;
use crate::error::LlmError;
use crate::kb::{PolicyStore, canonical_key, normalize_intent};
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};

/// Minimum confidence for a generation call.
pub const CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Snippet characters quoted in a template draft.
const SNIPPET_CHAR_LIMIT: usize = 500;

/// Intents eligible for a drafted reply (aliases included).
const DRAFT_INTENTS: &[&str] = &[
    "card_lost_stolen",
    "suspected_fraud",
    "fraud",
    "card_lost",
    "lost_card",
    "stolen_card",
];

pub const OUT_OF_SCOPE_ESCALATION: &str = "Thank you for your message. A colleague will respond shortly. [Escalated: intent not in draft scope]";

pub const NO_SNIPPET_ESCALATION: &str = "We are sorry, we need to escalate your request. An agent will contact you shortly. [Escalated: no policy snippet]";

/// Appended to every template draft.
pub const NO_GENERATION_MARKER: &str = " [No-LLM fallback]";

const TEMPLATE_INTRO: &str = "Thank you for contacting us. Based on our policy";
const TEMPLATE_CLOSING: &str = "If you have further questions, please reply or call us.";

/// Which branch of the state machine produced a draft.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftOutcome {
    /// Intent not eligible for drafting.
    OutOfScope,
    /// Eligible, but no policy snippet exists.
    NoSnippet,
    /// Template used because confidence was below the threshold.
    LowConfidence,
    /// Template used because generation is disabled or the input is blank.
    GenerationUnavailable,
    /// Template used because the generation call failed or returned nothing.
    GenerationFailed,
    /// Reply produced by the generation service.
    Generated,
}

impl DraftOutcome {
    pub fn is_escalation(&self) -> bool {
        matches!(self, Self::OutOfScope | Self::NoSnippet)
    }
}

/// A drafted reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftResult {
    /// Reply text; never empty.
    pub text: String,
    /// True when no generation call produced `text`.
    pub used_fallback: bool,
    pub outcome: DraftOutcome,
    /// Canonical policy key cited, when a snippet was found.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kb_key: Option<String>,
}

impl DraftResult {
    fn escalation(text: &str, outcome: DraftOutcome) -> Self {
        Self {
            text: text.to_string(),
            used_fallback: true,
            outcome,
            kb_key: None,
        }
    }

    fn template(template: &str, kb_key: &str, outcome: DraftOutcome) -> Self {
        Self {
            text: format!("{template}{NO_GENERATION_MARKER}"),
            used_fallback: true,
            outcome,
            kb_key: Some(kb_key.to_string()),
        }
    }
}

/// True if the intent is within the draft scope.
pub fn is_eligible(intent: &str) -> bool {
    let normalized = normalize_intent(intent);
    DRAFT_INTENTS.contains(&normalized.as_str())
        || matches!(
            normalized.replace(' ', "_").as_str(),
            "card_lost_stolen" | "suspected_fraud"
        )
}

/// Deterministic policy-quoting reply.
pub fn template_draft(snippet: &str, kb_key: &str) -> String {
    let body: String = snippet.chars().take(SNIPPET_CHAR_LIMIT).collect();
    format!(
        "{TEMPLATE_INTRO} [kb: {kb_key}]:\n\n{}\n\n{TEMPLATE_CLOSING}",
        body.trim()
    )
}

fn build_system_prompt(kb_key: &str) -> String {
    format!(
        "You are a customer-support assistant for a bank. Reply in 2-4 short sentences.\n\
         Use ONLY the policy provided; do not invent steps, fees or timelines.\n\
         Include exactly one citation in this format: [kb: {kb_key}]"
    )
}

fn build_user_prompt(customer_message: &str, snippet: &str) -> String {
    format!(
        "Policy:\n{snippet}\n\n\
         Customer message:\n{customer_message}\n\n\
         Draft reply (cite policy with [kb: ...]):"
    )
}

/// Generation call settings.
#[derive(Debug, Clone)]
pub struct DraftConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    /// Upper bound on one generation call.
    pub timeout: Duration,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            temperature: 0.3,
            max_tokens: 300,
            timeout: Duration::from_secs(20),
        }
    }
}

/// Produces drafts from classifications.
pub struct DraftGenerator {
    kb: Arc<PolicyStore>,
    /// `None` when generation is disabled or no credential is configured.
    llm: Option<Arc<dyn LlmProvider>>,
    config: DraftConfig,
}

impl DraftGenerator {
    /// Template-only generator.
    pub fn new(kb: Arc<PolicyStore>, config: DraftConfig) -> Self {
        Self {
            kb,
            llm: None,
            config,
        }
    }

    /// Enable the generation service.
    pub fn with_llm(mut self, llm: Arc<dyn LlmProvider>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn generation_available(&self) -> bool {
        self.llm.is_some()
    }

    /// Draft a reply for `classification`. Never fails.
    pub async fn draft(
        &self,
        classification: &ClassificationResult,
        redacted_text: Option<&str>,
    ) -> DraftResult {
        let intent = &classification.intent;

        if !is_eligible(intent) {
            debug!(intent = %intent, "Intent out of draft scope, escalating");
            return DraftResult::escalation(OUT_OF_SCOPE_ESCALATION, DraftOutcome::OutOfScope);
        }

        let snippet = self.kb.get_snippet(intent);
        if snippet.is_empty() {
            info!(intent = %intent, "No policy snippet, escalating");
            return DraftResult::escalation(NO_SNIPPET_ESCALATION, DraftOutcome::NoSnippet);
        }

        let kb_key = canonical_key(intent);
        let template = template_draft(&snippet, &kb_key);

        if classification.confidence < CONFIDENCE_THRESHOLD {
            debug!(
                intent = %intent,
                confidence = classification.confidence,
                "Confidence below threshold, using template"
            );
            return DraftResult::template(&template, &kb_key, DraftOutcome::LowConfidence);
        }

        let message = redacted_text.map(str::trim).unwrap_or_default();
        let Some(llm) = self.llm.as_ref().filter(|_| !message.is_empty()) else {
            return DraftResult::template(&template, &kb_key, DraftOutcome::GenerationUnavailable);
        };

        match self.generate(llm.as_ref(), message, &snippet, &kb_key).await {
            Ok(text) => {
                info!(intent = %intent, kb_key = %kb_key, model = llm.model_name(), "Generated draft");
                DraftResult {
                    text,
                    used_fallback: false,
                    outcome: DraftOutcome::Generated,
                    kb_key: Some(kb_key),
                }
            }
            Err(e) => {
                warn!(error = %e, intent = %intent, "Generation failed, using template");
                DraftResult::template(&template, &kb_key, DraftOutcome::GenerationFailed)
            }
        }
    }

    /// One bounded generation call. Empty output counts as a failure.
    async fn generate(
        &self,
        llm: &dyn LlmProvider,
        customer_message: &str,
        snippet: &str,
        kb_key: &str,
    ) -> Result<String, LlmError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt(kb_key)),
            ChatMessage::user(build_user_prompt(customer_message, snippet)),
        ])
        .with_temperature(self.config.temperature)
        .with_max_tokens(self.config.max_tokens);

        let response = tokio::time::timeout(self.config.timeout, llm.complete(request))
            .await
            .map_err(|_| LlmError::Timeout {
                provider: llm.model_name().to_string(),
                timeout: self.config.timeout,
            })??;

        let text = response.content.trim();
        if text.is_empty() {
            return Err(LlmError::EmptyResponse {
                provider: llm.model_name().to_string(),
            });
        }
        Ok(text.to_string())
    }
}
