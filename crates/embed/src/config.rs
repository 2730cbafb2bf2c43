use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryConfig;

/// Engine backend that runs inference out of process on a llama.cpp server.
pub const MODE_LLAMA_SERVER: &str = "llama-server";
/// Deterministic in-process engine used by tests and demos.
pub const MODE_STUB: &str = "stub";

/// Runtime configuration describing which inference engine to build and how to reach it.
///
/// # Example
/// ```
/// use embed::EngineConfig;
///
/// let cfg = EngineConfig {
///     mode: "stub".into(),
///     embedding_dim: 64,
///     ..Default::default()
/// };
/// assert!(cfg.base_url.is_some());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Backend selector: `"llama-server"` (remote llama.cpp HTTP server) or `"stub"`.
    pub mode: String,
    /// Friendly label reported by `/health` and the startup log.
    pub model_name: String,
    /// Base URL of the llama.cpp server answering `/embedding`, `/tokenize` and
    /// `/detokenize` when [`mode`](Self::mode) is `"llama-server"`.
    pub base_url: Option<String>,
    /// Base URL of the llama.cpp server answering `/v1/chat/completions`.
    /// Falls back to [`base_url`](Self::base_url) when unset.
    ///
    /// A server started with `--embedding` refuses completions, so the usual
    /// deployment runs two servers on the same GGUF file: one plain, one with
    /// `--embedding --pooling none`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_base_url: Option<String>,
    /// Local GGUF file backing the engine. When set, loading fails unless the
    /// file exists or can be downloaded from [`model_url`](Self::model_url).
    pub model_path: Option<PathBuf>,
    /// Optional HTTPS URL downloaded into [`model_path`](Self::model_path) when it is missing.
    pub model_url: Option<String>,
    /// Per-request timeout for engine calls in seconds.
    pub request_timeout_secs: u64,
    /// Vector width produced by the stub engine.
    pub embedding_dim: usize,
    /// Upper bound a request waits for a load started by another request, in milliseconds.
    pub load_wait_ms: u64,
    /// Retry policy for the readiness check issued while loading.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mode: MODE_LLAMA_SERVER.into(),
            model_name: "Llama-3.2-1B-Instruct-Q4_K_M".into(),
            base_url: Some("http://127.0.0.1:8080".into()),
            generation_base_url: None,
            model_path: None,
            model_url: None,
            request_timeout_secs: 120,
            embedding_dim: 2048,
            load_wait_ms: 5_000,
            retry_config: None, // Uses defaults when None
        }
    }
}

impl EngineConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn load_wait(&self) -> Duration {
        Duration::from_millis(self.load_wait_ms)
    }

    /// URL used for reply generation: `generation_base_url`, else `base_url`.
    pub fn generation_url(&self) -> Option<&str> {
        self.generation_base_url
            .as_deref()
            .or(self.base_url.as_deref())
    }
}

/// Parameters of the short completion generated for every request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct GenerationConfig {
    /// System instruction constraining the completion style.
    pub system_prompt: String,
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            system_prompt: "Respond in one sentence, about 10 words.".into(),
            max_tokens: 512,
            temperature: 0.7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.mode, "llama-server");
        assert_eq!(cfg.base_url.as_deref(), Some("http://127.0.0.1:8080"));
        assert!(cfg.model_path.is_none());
        assert!(cfg.model_url.is_none());
        assert_eq!(cfg.request_timeout(), Duration::from_secs(120));
        assert_eq!(cfg.load_wait(), Duration::from_millis(5_000));
        assert_eq!(cfg.embedding_dim, 2048);
    }

    #[test]
    fn generation_url_falls_back_to_base_url() {
        let mut cfg = EngineConfig::default();
        assert_eq!(cfg.generation_url(), Some("http://127.0.0.1:8080"));

        cfg.generation_base_url = Some("http://127.0.0.1:8081".into());
        assert_eq!(cfg.generation_url(), Some("http://127.0.0.1:8081"));
        assert_eq!(cfg.base_url.as_deref(), Some("http://127.0.0.1:8080"));
    }

    #[test]
    fn config_partial_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"mode":"stub","embedding_dim":32}"#).unwrap();
        assert_eq!(cfg.mode, "stub");
        assert_eq!(cfg.embedding_dim, 32);
        assert_eq!(cfg.request_timeout_secs, 120);
    }

    #[test]
    fn generation_defaults_match_short_reply_style() {
        let cfg = GenerationConfig::default();
        assert!(cfg.system_prompt.contains("10 words"));
        assert_eq!(cfg.max_tokens, 512);
        assert!((cfg.temperature - 0.7).abs() < f32::EPSILON);
    }

    #[test]
    fn generation_serde_roundtrip() {
        let cfg = GenerationConfig {
            system_prompt: "Answer tersely.".into(),
            max_tokens: 32,
            temperature: 0.1,
        };
        let json = serde_json::to_string(&cfg).unwrap();
        let back: GenerationConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg, back);
    }
}
