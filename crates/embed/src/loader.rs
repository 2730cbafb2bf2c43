use async_trait::async_trait;
use std::sync::Arc;

use crate::assets::resolve_model_file;
use crate::config::{MODE_LLAMA_SERVER, MODE_STUB};
use crate::engine::{EngineLoader, InferenceEngine};
use crate::llama::LlamaServerEngine;
use crate::{EmbedError, EngineConfig, StubEngine};

/// Loader that builds the engine named by [`EngineConfig::mode`].
pub struct ConfigLoader {
    cfg: EngineConfig,
}

impl ConfigLoader {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }
}

#[async_trait]
impl EngineLoader for ConfigLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError> {
        if let Some(path) = resolve_model_file(&self.cfg).await? {
            tracing::info!(path = %path.display(), "model file ready");
        }

        match self.cfg.mode.as_str() {
            MODE_STUB => Ok(Arc::new(StubEngine::new(self.cfg.embedding_dim))),
            MODE_LLAMA_SERVER => Ok(Arc::new(LlamaServerEngine::connect(&self.cfg).await?)),
            other => Err(EmbedError::InvalidConfig(format!(
                "unknown engine mode '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_mode_loads_stub_engine() {
        let loader = ConfigLoader::new(EngineConfig {
            mode: "stub".into(),
            embedding_dim: 12,
            ..Default::default()
        });
        let engine = loader.load().await.unwrap();
        let info = engine.describe();
        assert_eq!(info.backend, "stub");
        assert_eq!(info.embedding_dim, Some(12));
    }

    #[tokio::test]
    async fn unknown_mode_is_invalid_config() {
        let loader = ConfigLoader::new(EngineConfig {
            mode: "onnx".into(),
            ..Default::default()
        });
        let err = loader.load().await.err().unwrap();
        assert!(matches!(err, EmbedError::InvalidConfig(_)));
    }

    #[tokio::test]
    async fn missing_model_file_fails_before_engine_build() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(EngineConfig {
            mode: "stub".into(),
            model_path: Some(dir.path().join("nope.gguf")),
            ..Default::default()
        });
        let err = loader.load().await.err().unwrap();
        assert!(matches!(err, EmbedError::ModelNotFound(_)));
    }
}
