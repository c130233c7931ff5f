//! Message processing pipeline.
//!
//! Every message flows through:
//! 1. `Redactor::redact()`: configured masking rules
//! 2. `Classifier::classify()`: intent, queue and confidence
//! 3. `DraftGenerator::draft()`: escalation, template or generated reply
//! 4. `guardrails::validate()`: citation and card-number checks
//!
//! Each message is independent. No stage aborts a batch.

pub mod processor;
pub mod types;

pub use processor::MessageProcessor;
pub use types::{InboundMessage, ItemStatus, ProcessedMessage};
