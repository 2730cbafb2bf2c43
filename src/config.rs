//! YAML configuration file support for the tokenviz pipeline.
//!
//! One file describes which inference engine to build and how the reply is
//! generated. The server points at it through `pipeline_config`; without a
//! file the built-in defaults apply.
//!
//! ## Example YAML Configuration
//!
//! ```yaml
//! version: "1.0"
//! name: "local llama"
//!
//! engine:
//!   mode: "llama-server"
//!   model_name: "Llama-3.2-1B-Instruct-Q4_K_M"
//!   base_url: "http://127.0.0.1:8080"
//!   # chat completions; omit when one server handles both
//!   generation_base_url: "http://127.0.0.1:8081"
//!   model_path: "models/Llama-3.2-1B-Instruct-Q4_K_M.gguf"
//!   model_url: "https://huggingface.co/bartowski/Llama-3.2-1B-Instruct-GGUF/resolve/main/Llama-3.2-1B-Instruct-Q4_K_M.gguf"
//!   request_timeout_secs: 120
//!   load_wait_ms: 5000
//!
//! generation:
//!   system_prompt: "Respond in one sentence, about 10 words."
//!   max_tokens: 512
//!   temperature: 0.7
//! ```
//!
//! ## Env vars to know
//!
//! - `TOKENVIZ_ENGINE_MODE` - override `engine.mode`
//! - `TOKENVIZ_ENGINE_BASE_URL` - override `engine.base_url`
//! - `TOKENVIZ_ENGINE_GENERATION_BASE_URL` - override `engine.generation_base_url`
//! - `TOKENVIZ_MODEL_PATH` - override `engine.model_path`

use std::fs;
use std::path::{Path, PathBuf};

use embed::{EngineConfig, GenerationConfig, MODE_LLAMA_SERVER, MODE_STUB};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading YAML configuration files
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("unsupported config version: {0}")]
    UnsupportedVersion(String),

    #[error("missing required field: {0}")]
    MissingField(String),
}

/// Top-level YAML configuration for the visualizer pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct TokenvizConfig {
    /// Configuration format version
    pub version: String,

    /// Optional configuration name/description
    #[serde(default)]
    pub name: Option<String>,

    /// Inference engine selection and connection details
    #[serde(default)]
    pub engine: EngineConfig,

    /// Reply generation parameters
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl TokenvizConfig {
    /// Load a YAML configuration file from the given path
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        let content = fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse YAML configuration from a string
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigLoadError> {
        let config: TokenvizConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Applies `TOKENVIZ_*` environment overrides, then re-validates.
    pub fn with_env_overrides(self) -> Result<Self, ConfigLoadError> {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from `lookup`, then re-validates.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigLoadError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = lookup("TOKENVIZ_ENGINE_MODE") {
            self.engine.mode = mode;
        }
        if let Some(url) = lookup("TOKENVIZ_ENGINE_BASE_URL") {
            self.engine.base_url = Some(url);
        }
        if let Some(url) = lookup("TOKENVIZ_ENGINE_GENERATION_BASE_URL") {
            self.engine.generation_base_url = Some(url);
        }
        if let Some(path) = lookup("TOKENVIZ_MODEL_PATH") {
            self.engine.model_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        match self.version.as_str() {
            "1.0" | "1" => Ok(()),
            v => Err(ConfigLoadError::UnsupportedVersion(v.to_string())),
        }?;

        validate_engine(&self.engine)?;
        validate_generation(&self.generation)?;
        Ok(())
    }
}

impl Default for TokenvizConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            name: None,
            engine: EngineConfig::default(),
            generation: GenerationConfig::default(),
        }
    }
}

fn validate_engine(cfg: &EngineConfig) -> Result<(), ConfigLoadError> {
    match cfg.mode.as_str() {
        MODE_LLAMA_SERVER => {
            if cfg.base_url.as_deref().map_or(true, |u| u.trim().is_empty()) {
                return Err(ConfigLoadError::MissingField("engine.base_url".into()));
            }
        }
        MODE_STUB => {
            if cfg.embedding_dim == 0 {
                return Err(ConfigLoadError::Validation(
                    "engine.embedding_dim must be >= 1".into(),
                ));
            }
        }
        other => {
            return Err(ConfigLoadError::Validation(format!(
                "engine.mode must be '{MODE_LLAMA_SERVER}' or '{MODE_STUB}', got '{other}'"
            )))
        }
    }
    if cfg.model_url.is_some() && cfg.model_path.is_none() {
        return Err(ConfigLoadError::MissingField(
            "engine.model_path (required with model_url)".into(),
        ));
    }
    if cfg.request_timeout_secs == 0 {
        return Err(ConfigLoadError::Validation(
            "engine.request_timeout_secs must be >= 1".into(),
        ));
    }
    Ok(())
}

fn validate_generation(cfg: &GenerationConfig) -> Result<(), ConfigLoadError> {
    if cfg.max_tokens == 0 {
        return Err(ConfigLoadError::Validation(
            "generation.max_tokens must be >= 1".into(),
        ));
    }
    if !(0.0..=2.0).contains(&cfg.temperature) {
        return Err(ConfigLoadError::Validation(format!(
            "generation.temperature must be within 0..=2, got {}",
            cfg.temperature
        )));
    }
    if cfg.system_prompt.trim().is_empty() {
        return Err(ConfigLoadError::MissingField("generation.system_prompt".into()));
    }
    Ok(())
}
