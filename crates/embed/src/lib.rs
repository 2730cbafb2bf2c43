//! tokenviz inference seam
//!
//! Everything the visualizer needs from a language model lives behind the
//! [`InferenceEngine`] trait: a short chat completion, per-token hidden-state
//! vectors, and a tokenizer that can turn ids back into text. This crate owns
//! that trait, the engines implementing it, and the [`ModelService`] that loads
//! one engine per process and hands it out one request at a time.
//!
//! Engines:
//!
//! - **llama-server** - talks to a llama.cpp HTTP server started with
//!   `--embedding --pooling none`. This is the production path.
//! - **stub** - deterministic, in-process, no model file. Tests and demos use it.
//!
//! ## Quick example
//!
//! ```
//! use embed::{extract_token_embeddings, GenerationConfig, InferenceEngine, StubEngine};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let engine = StubEngine::new(16);
//!     let reply = engine
//!         .generate("Tell me about owls", &GenerationConfig::default())
//!         .await
//!         .unwrap();
//!     let tokens = extract_token_embeddings(&engine, &reply).await.unwrap();
//!     assert!(tokens.iter().all(|t| t.dim() == 16));
//! }
//! ```
//!
//! Tokens that are pure whitespace (and the BOS marker, which detokenizes to an
//! empty string) are dropped by the extractor, so every returned
//! [`TokenEmbedding`] carries visible text.

pub mod config;
pub mod engine;
pub mod error;
pub mod types;

// Resilience bits
pub mod retry;
mod serde_millis;

mod assets;
mod extract;
mod llama;
mod loader;
mod service;
mod stub;

pub use assets::{model_file_info, ModelFileInfo};
pub use config::{EngineConfig, GenerationConfig, MODE_LLAMA_SERVER, MODE_STUB};
pub use engine::{EngineLoader, InferenceEngine, TokenId};
pub use error::EmbedError;
pub use extract::{extract_token_embeddings, pair_and_filter};
pub use llama::LlamaServerEngine;
pub use loader::ConfigLoader;
pub use retry::RetryConfig;
pub use service::{EngineGuard, ModelService, ModelStatus};
pub use stub::{StubEngine, BOS_TOKEN};
pub use types::{format_vector, EngineInfo, TokenEmbedding};
