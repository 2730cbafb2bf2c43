//! The seam between tokenviz and whatever runs the language model.

use async_trait::async_trait;
use std::sync::Arc;

use crate::{EmbedError, EngineInfo, GenerationConfig};

/// Token identifier as assigned by the engine's tokenizer.
pub type TokenId = u32;

/// Operations tokenviz needs from a loaded language model.
///
/// Implementations are not required to support concurrent calls; the
/// [`ModelService`](crate::ModelService) hands out one engine guard at a time.
#[async_trait]
pub trait InferenceEngine: Send + Sync {
    /// Generates a completion for `prompt` under the given generation parameters.
    async fn generate(&self, prompt: &str, params: &GenerationConfig)
        -> Result<String, EmbedError>;

    /// Returns one embedding vector per token of `text`, in token order.
    async fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError>;

    /// Tokenizes `text` exactly as [`embed`](Self::embed) does.
    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, EmbedError>;

    /// Raw bytes of a single token. May be an incomplete UTF-8 sequence.
    async fn detokenize(&self, token: TokenId) -> Result<Vec<u8>, EmbedError>;

    fn describe(&self) -> EngineInfo;
}

/// Performs the one-time, potentially slow, construction of an engine.
#[async_trait]
pub trait EngineLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError>;
}
