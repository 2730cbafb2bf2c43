use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Server bind address
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds. Covers generation, so keep it generous.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum request body size in MB
    #[serde(default = "default_max_body_size_mb")]
    pub max_body_size_mb: usize,

    /// Longest accepted `input_text`, in characters
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    /// Enable CORS
    #[serde(default = "default_true")]
    pub enable_cors: bool,

    /// Log level, or any `EnvFilter` directive
    #[serde(default = "default_log_level")]
    pub log_level: String,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Metrics endpoint enabled
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,

    /// Load the model before accepting traffic and exit if that fails
    #[serde(default = "default_true")]
    pub eager_load: bool,

    /// Name reported by `/` and `/health`
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Optional YAML pipeline configuration (engine + generation)
    #[serde(default)]
    pub pipeline_config: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            port: default_port(),
            timeout_secs: default_timeout_secs(),
            max_body_size_mb: default_max_body_size_mb(),
            max_input_chars: default_max_input_chars(),
            enable_cors: default_true(),
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            metrics_enabled: default_true(),
            eager_load: default_true(),
            service_name: default_service_name(),
            pipeline_config: None,
        }
    }
}

impl ServerConfig {
    /// Load configuration from `.env`, an optional `server.*` file and
    /// `TOKENVIZ_SERVER__*` environment variables, in increasing priority.
    pub fn load() -> anyhow::Result<Self> {
        // A missing .env is the normal case outside development.
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("server").required(false))
            .add_source(config::Environment::with_prefix("TOKENVIZ_SERVER").separator("__"));

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(self.timeout_secs > 0, "timeout_secs must be >= 1");
        anyhow::ensure!(self.max_body_size_mb > 0, "max_body_size_mb must be >= 1");
        anyhow::ensure!(self.max_input_chars > 0, "max_input_chars must be >= 1");
        Ok(())
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> anyhow::Result<SocketAddr> {
        let addr_str = format!("{}:{}", self.bind_addr, self.port);
        Ok(addr_str.parse()?)
    }

    /// Get request timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get max body size in bytes
    pub fn max_body_size(&self) -> usize {
        self.max_body_size_mb * 1024 * 1024
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7860
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_body_size_mb() -> usize {
    1
}

fn default_max_input_chars() -> usize {
    2000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "GPT Visualizer".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.port, 7860);
        assert_eq!(cfg.timeout_secs, 120);
        assert_eq!(cfg.max_body_size_mb, 1);
        assert_eq!(cfg.max_input_chars, 2000);
        assert_eq!(cfg.log_format, LogFormat::Json);
        assert_eq!(cfg.service_name, "GPT Visualizer");
        assert!(cfg.enable_cors);
        assert!(cfg.metrics_enabled);
        assert!(cfg.eager_load);
        assert!(cfg.pipeline_config.is_none());
    }

    #[test]
    fn test_socket_addr() {
        let cfg = ServerConfig::default();
        let addr = cfg.socket_addr().unwrap();
        assert_eq!(addr.port(), 7860);
        assert!(addr.ip().is_unspecified());
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let cfg: ServerConfig = serde_json::from_str(
            r#"{"port": 9000, "log_format": "pretty", "pipeline_config": "tokenviz.yaml"}"#,
        )
        .unwrap();
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.log_format, LogFormat::Pretty);
        assert_eq!(cfg.pipeline_config, Some(PathBuf::from("tokenviz.yaml")));
        assert_eq!(cfg.max_input_chars, 2000);
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let cfg = ServerConfig {
            max_input_chars: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_sizes() {
        let cfg = ServerConfig::default();
        assert_eq!(cfg.max_body_size(), 1024 * 1024);
        assert_eq!(cfg.timeout(), Duration::from_secs(120));
    }
}
