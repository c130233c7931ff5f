//! Error types for support-triage.
//!
//! These errors never cross a pipeline component boundary: each component
//! converts them into its documented fallback value. They exist so the
//! collaborators (dataset reader, model store, generation client) can report
//! *why* a fallback happened.

use std::path::PathBuf;
use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse pattern file {path}: {reason}")]
    PatternFile { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Message dataset errors.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("Messages file not found: {0}")]
    NotFound(PathBuf),

    #[error("Dataset is missing required columns: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Dataset has no usable rows")]
    Empty,
}

/// Trained-model errors (training, persistence, inference).
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Cannot train model: {0}")]
    Dataset(#[from] DatasetError),

    #[error("Model has no features (vocabulary is empty after min_df filtering)")]
    EmptyVocabulary,

    #[error("Model artifact at {path} is unreadable: {reason}")]
    Corrupt { path: PathBuf, reason: String },

    #[error("Invalid training ratio {0}: must be in (0, 1]")]
    InvalidRatio(f64),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Model initialisation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Generation service errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Provider {provider} returned an empty response")]
    EmptyResponse { provider: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;
