//! Runtime configuration.
//!
//! Values come from the environment (after an optional `.env`), and the CLI
//! may override any of them. Components never read the environment directly;
//! they receive paths and settings from a [`PipelineConfig`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use tracing::warn;

use crate::classify::BackendKind;
use crate::draft::DraftConfig;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_MODEL_PATH: &str = "models/mtl_model.json";
pub const MESSAGES_FILE: &str = "messages.csv";
pub const PATTERNS_FILE: &str = "pii_patterns.yaml";
pub const KB_DIR: &str = "kb";

const DEFAULT_LLM_MODEL: &str = "gpt-4o-mini";
const DEFAULT_LLM_TIMEOUT_SECS: u64 = 20;

/// Generation service settings.
#[derive(Debug, Clone)]
pub struct GenerationConfig {
    /// Opt-in switch (`USE_LLM`).
    pub enabled: bool,
    pub backend: LlmBackend,
    pub api_key: Option<SecretString>,
    pub model: String,
    pub timeout: Duration,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            backend: LlmBackend::OpenAi,
            api_key: None,
            model: DEFAULT_LLM_MODEL.to_string(),
            timeout: Duration::from_secs(DEFAULT_LLM_TIMEOUT_SECS),
            temperature: 0.3,
            max_tokens: 300,
        }
    }
}

impl GenerationConfig {
    /// Enabled and a credential is present.
    pub fn is_available(&self) -> bool {
        self.enabled && self.api_key.is_some()
    }

    /// Provider settings, or `None` when generation is unavailable.
    pub fn llm_config(&self) -> Option<LlmConfig> {
        if !self.enabled {
            return None;
        }
        let api_key = self.api_key.clone()?;
        Some(LlmConfig {
            backend: self.backend,
            api_key,
            model: self.model.clone(),
        })
    }

    pub fn draft_config(&self) -> DraftConfig {
        DraftConfig {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            timeout: self.timeout,
        }
    }
}

/// Paths and settings for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub data_dir: PathBuf,
    pub messages_path: PathBuf,
    pub patterns_path: PathBuf,
    pub kb_dir: PathBuf,
    pub model_path: PathBuf,
    /// Explicit backend; `None` selects automatically.
    pub backend: Option<BackendKind>,
    pub generation: GenerationConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::with_data_dir(DEFAULT_DATA_DIR)
    }
}

impl PipelineConfig {
    /// Defaults rooted at `data_dir`.
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut config = Self {
            data_dir: PathBuf::new(),
            messages_path: PathBuf::new(),
            patterns_path: PathBuf::new(),
            kb_dir: PathBuf::new(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            backend: None,
            generation: GenerationConfig::default(),
        };
        config.set_data_dir(data_dir);
        config
    }

    /// Re-root the dataset, pattern file and knowledge base.
    pub fn set_data_dir(&mut self, data_dir: impl Into<PathBuf>) {
        let data_dir = data_dir.into();
        self.messages_path = data_dir.join(MESSAGES_FILE);
        self.patterns_path = data_dir.join(PATTERNS_FILE);
        self.kb_dir = data_dir.join(KB_DIR);
        self.data_dir = data_dir;
    }

    /// Build from environment variables, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut config =
            Self::with_data_dir(var("SUPPORT_TRIAGE_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.into()));

        if let Some(path) = var("SUPPORT_TRIAGE_MODEL_PATH") {
            config.model_path = PathBuf::from(path);
        }

        config.backend = var("SUPPORT_TRIAGE_BACKEND").map(|name| BackendKind::from_name_or_lookup(&name));

        let generation = &mut config.generation;
        generation.enabled = var("USE_LLM").is_some_and(|v| parse_flag(&v));

        if let Some(name) = var("SUPPORT_TRIAGE_LLM_BACKEND") {
            generation.backend =
                LlmBackend::from_name(&name).ok_or_else(|| ConfigError::InvalidValue {
                    key: "SUPPORT_TRIAGE_LLM_BACKEND".to_string(),
                    message: format!("unknown backend '{name}' (expected openai or anthropic)"),
                })?;
        }

        let key_var = match generation.backend {
            LlmBackend::OpenAi => "OPENAI_API_KEY",
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
        };
        generation.api_key = var(key_var).map(SecretString::from);

        if let Some(model) = var("SUPPORT_TRIAGE_LLM_MODEL") {
            generation.model = model;
        }

        if let Some(secs) = var("SUPPORT_TRIAGE_LLM_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|_| ConfigError::InvalidValue {
                key: "SUPPORT_TRIAGE_LLM_TIMEOUT_SECS".to_string(),
                message: format!("'{secs}' is not a whole number of seconds"),
            })?;
            generation.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Configured backend, else `trained` when a persisted model exists.
    pub fn resolved_backend(&self) -> BackendKind {
        self.backend
            .unwrap_or_else(|| auto_backend(&self.model_path))
    }

    /// Warn about inputs the run will silently degrade without.
    pub fn log_missing_inputs(&self) {
        if !self.messages_path.is_file() {
            warn!(path = %self.messages_path.display(), "Message dataset not found");
        }
        if !self.patterns_path.is_file() {
            warn!(path = %self.patterns_path.display(), "Pattern file not found, no redaction rules");
        }
        if !self.kb_dir.is_dir() {
            warn!(path = %self.kb_dir.display(), "Knowledge base directory not found");
        }
        if self.generation.enabled && self.generation.api_key.is_none() {
            warn!("Generation requested but no API key configured, using templates");
        }
    }
}

fn auto_backend(model_path: &Path) -> BackendKind {
    if model_path.is_file() {
        BackendKind::Trained
    } else {
        BackendKind::Lookup
    }
}

/// `1`, `true` or `yes`, case-insensitive.
pub fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "1" | "true" | "yes")
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn from_vars(vars: &[(&str, &str)]) -> Result<PipelineConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_without_environment() {
        let config = from_vars(&[]).unwrap();
        assert_eq!(config.data_dir, PathBuf::from("data"));
        assert_eq!(config.messages_path, PathBuf::from("data/messages.csv"));
        assert_eq!(config.patterns_path, PathBuf::from("data/pii_patterns.yaml"));
        assert_eq!(config.kb_dir, PathBuf::from("data/kb"));
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
        assert!(config.backend.is_none());
        assert!(!config.generation.enabled);
        assert_eq!(config.generation.model, "gpt-4o-mini");
        assert_eq!(config.generation.timeout, Duration::from_secs(20));
        assert!(!config.generation.is_available());
    }

    #[test]
    fn environment_overrides() {
        let config = from_vars(&[
            ("SUPPORT_TRIAGE_DATA_DIR", "/srv/triage"),
            ("SUPPORT_TRIAGE_MODEL_PATH", "/tmp/model.json"),
            ("SUPPORT_TRIAGE_BACKEND", "mtl"),
            ("USE_LLM", "Yes"),
            ("OPENAI_API_KEY", "sk-test"),
            ("SUPPORT_TRIAGE_LLM_TIMEOUT_SECS", "5"),
        ])
        .unwrap();
        assert_eq!(config.kb_dir, PathBuf::from("/srv/triage/kb"));
        assert_eq!(config.model_path, PathBuf::from("/tmp/model.json"));
        assert_eq!(config.backend, Some(BackendKind::Trained));
        assert!(config.generation.is_available());
        assert_eq!(config.generation.timeout, Duration::from_secs(5));

        let llm = config.generation.llm_config().unwrap();
        assert_eq!(llm.api_key.expose_secret(), "sk-test");
        assert_eq!(llm.backend, LlmBackend::OpenAi);
    }

    #[test]
    fn key_without_opt_in_stays_disabled() {
        let config = from_vars(&[("OPENAI_API_KEY", "sk-test"), ("USE_LLM", "0")]).unwrap();
        assert!(!config.generation.is_available());
        assert!(config.generation.llm_config().is_none());
    }

    #[test]
    fn unknown_backend_name_falls_back_to_lookup() {
        let config = from_vars(&[("SUPPORT_TRIAGE_BACKEND", "neural")]).unwrap();
        assert_eq!(config.backend, Some(BackendKind::Lookup));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let err = from_vars(&[("SUPPORT_TRIAGE_LLM_TIMEOUT_SECS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("SUPPORT_TRIAGE_LLM_TIMEOUT_SECS"));
    }

    #[test]
    fn auto_backend_follows_model_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::with_data_dir(dir.path());
        config.model_path = dir.path().join("model.json");
        assert_eq!(config.resolved_backend(), BackendKind::Lookup);

        std::fs::write(&config.model_path, "{}").unwrap();
        assert_eq!(config.resolved_backend(), BackendKind::Trained);

        config.backend = Some(BackendKind::Lookup);
        assert_eq!(config.resolved_backend(), BackendKind::Lookup);
    }

    #[test]
    fn flags() {
        assert!(parse_flag("1"));
        assert!(parse_flag(" TRUE "));
        assert!(!parse_flag("on"));
        assert!(!parse_flag(""));
    }
}
