//! Shared types for the message processing pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ClassificationResult;
use crate::dataset::MessageRecord;
use crate::draft::DraftResult;
use crate::guardrails::GuardrailReport;

/// Drafts longer than this are cut in previews.
const PREVIEW_CHARS: usize = 80;

// ── Inbound message ─────────────────────────────────────────────────

/// A customer message entering the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    /// Dataset identifier, if the message came from the dataset.
    pub id: Option<String>,
    /// Raw message body.
    pub text: String,
}

impl InboundMessage {
    /// An ad-hoc message with no identifier.
    pub fn ad_hoc(text: impl Into<String>) -> Self {
        Self {
            id: None,
            text: text.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            text: text.into(),
        }
    }
}

impl From<&MessageRecord> for InboundMessage {
    fn from(record: &MessageRecord) -> Self {
        Self::with_id(record.message_id.clone(), record.text.clone())
    }
}

// ── Processing outcome ──────────────────────────────────────────────

/// Per-item outcome annotation. Never aborts a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemStatus {
    Ok,
    GuardrailFailed { reasons: Vec<String> },
}

impl ItemStatus {
    pub fn from_report(report: &GuardrailReport) -> Self {
        if report.passed {
            Self::Ok
        } else {
            Self::GuardrailFailed {
                reasons: report.reason_codes().into_iter().map(String::from).collect(),
            }
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// `OK` or `FAIL:<codes>`.
    pub fn label(&self) -> String {
        match self {
            Self::Ok => "OK".to_string(),
            Self::GuardrailFailed { reasons } => format!("FAIL:{}", reasons.join(",")),
        }
    }
}

/// Result of running one message through the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedMessage {
    pub message_id: Option<String>,
    /// Text after redaction; the raw text is not retained.
    pub redacted_text: String,
    pub classification: ClassificationResult,
    pub draft: DraftResult,
    pub guardrails: GuardrailReport,
    pub status: ItemStatus,
    pub processed_at: DateTime<Utc>,
}

impl ProcessedMessage {
    /// Draft truncated to 80 characters, with an ellipsis when cut.
    pub fn draft_preview(&self) -> String {
        preview(&self.draft.text, PREVIEW_CHARS)
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{head}…")
    } else {
        text.to_string()
    }
}
