//! tokenviz server - HTTP API for token embedding visualization
//!
//! Exposes the tokenviz pipeline over HTTP: a prompt goes in, and every token
//! of the prompt and of the model's short reply comes back as a point in a
//! shared 3D space.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use server::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     server::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! - `GET /` - API information
//! - `GET /health` - Liveness check with model status
//! - `GET /ready` - Readiness check (503 until the model is loaded)
//! - `GET /metrics` - Prometheus metrics
//! - `POST /api/visualize` - Visualize `{"input_text": "..."}`
//!
//! Errors use one body shape: `{"error": {"code": "...", "message": "..."}}`.

pub mod config;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;

pub use config::{LogFormat, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use server::{build_router, start_server};
pub use state::ServerState;
