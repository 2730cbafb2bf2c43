use crate::config::ServerConfig;
use crate::error::ServerResult;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Instant;
use tokenviz::{ModelService, TokenvizConfig};

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Engine and generation settings
    pub pipeline: Arc<TokenvizConfig>,

    /// Model lifecycle; the only path to the inference engine
    pub models: Arc<ModelService>,

    /// Render handle of the installed Prometheus recorder
    pub metrics: Option<PrometheusHandle>,

    started_at: Instant,
}

impl ServerState {
    /// Create new server state, reading the pipeline file named by the config.
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        let pipeline = match &config.pipeline_config {
            Some(path) => TokenvizConfig::from_file(path)?,
            None => TokenvizConfig::default(),
        }
        .with_env_overrides()?;

        let models = ModelService::from_config(pipeline.engine.clone());
        Ok(Self::with_service(config, pipeline, models))
    }

    /// State around an already built model service.
    pub fn with_service(
        config: ServerConfig,
        pipeline: TokenvizConfig,
        models: ModelService,
    ) -> Self {
        Self {
            config: Arc::new(config),
            pipeline: Arc::new(pipeline),
            models: Arc::new(models),
            metrics: None,
            started_at: Instant::now(),
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn pipeline_file_is_loaded() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"version: \"1.0\"\nengine:\n  mode: stub\n  embedding_dim: 16\n")
            .unwrap();
        let config = ServerConfig {
            pipeline_config: Some(file.path().to_path_buf()),
            ..Default::default()
        };

        let state = ServerState::new(config).unwrap();
        assert_eq!(state.pipeline.engine.mode, "stub");
        assert_eq!(state.pipeline.engine.embedding_dim, 16);
        assert!(!state.models.is_ready());
        assert!(state.metrics.is_none());
    }

    #[test]
    fn missing_pipeline_file_is_a_config_error() {
        let config = ServerConfig {
            pipeline_config: Some("/nonexistent/tokenviz.yaml".into()),
            ..Default::default()
        };
        let err = ServerState::new(config).err().unwrap();
        assert!(matches!(err, crate::ServerError::Config(_)));
    }
}
