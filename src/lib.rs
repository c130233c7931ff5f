//! Support triage: redact, classify, draft and check inbound banking
//! support messages.

pub mod classify;
pub mod config;
pub mod dataset;
pub mod draft;
pub mod error;
pub mod eval;
pub mod guardrails;
pub mod kb;
pub mod llm;
pub mod pipeline;
pub mod redact;
