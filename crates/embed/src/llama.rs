//! Engine backed by llama.cpp HTTP servers.
//!
//! Embeddings, tokenization and detokenization go to `base_url`, which must be
//! started with `--embedding --pooling none` so that `/embedding` returns one
//! vector per token instead of a pooled sentence vector. An embedding-mode
//! server refuses completions, so replies go to `generation_base_url`: a second
//! server on the same GGUF file started without `--embedding`.
//!
//! ```text
//! llama-server -m model.gguf --port 8080 --embedding --pooling none
//! llama-server -m model.gguf --port 8081
//! ```

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::OnceLock;
use std::time::Duration;

use crate::config::MODE_LLAMA_SERVER;
use crate::engine::{InferenceEngine, TokenId};
use crate::retry::{execute_with_retry_async, RetryConfig};
use crate::{EmbedError, EngineConfig, EngineInfo, GenerationConfig};

pub struct LlamaServerEngine {
    client: reqwest::Client,
    base_url: String,
    generation_url: String,
    model_name: String,
    dim: OnceLock<usize>,
}

#[derive(Deserialize)]
struct TokenizeResponse {
    tokens: Vec<TokenId>,
}

#[derive(Deserialize)]
struct DetokenizeResponse {
    content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingResponse {
    Batch(Vec<EmbeddingItem>),
    Single(EmbeddingItem),
}

#[derive(Deserialize)]
struct EmbeddingItem {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum EmbeddingValues {
    PerToken(Vec<Vec<f32>>),
    Pooled(Vec<f32>),
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

impl LlamaServerEngine {
    /// Builds the client and waits, with retry, until every configured server
    /// reports healthy.
    pub async fn connect(cfg: &EngineConfig) -> Result<Self, EmbedError> {
        let base_url = cfg
            .base_url
            .as_deref()
            .map(normalize_url)
            .ok_or_else(|| {
                EmbedError::InvalidConfig("base_url is required for llama-server mode".into())
            })?;
        let generation_url = cfg
            .generation_url()
            .map(normalize_url)
            .unwrap_or_else(|| base_url.clone());

        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| EmbedError::InvalidConfig(e.to_string()))?;

        let retry_cfg = cfg.retry_config.unwrap_or_default();
        wait_until_healthy(&client, &retry_cfg, &base_url).await?;
        if generation_url != base_url {
            wait_until_healthy(&client, &retry_cfg, &generation_url).await?;
        }

        Ok(Self {
            client,
            base_url,
            generation_url,
            model_name: cfg.model_name.clone(),
            dim: OnceLock::new(),
        })
    }

    async fn post_json(&self, base: &str, path: &str, body: Value) -> Result<Value, EmbedError> {
        let url = format!("{base}{path}");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| EmbedError::Engine(format!("request to {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(EmbedError::Engine(format!(
                "{path} returned {status}: {}",
                text.chars().take(200).collect::<String>()
            )));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EmbedError::Engine(format!("invalid JSON from {path}: {e}")))
    }
}

fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

/// Polls `{base_url}/health` with retry; a llama.cpp server answers 503 while loading.
async fn wait_until_healthy(
    client: &reqwest::Client,
    retry_cfg: &RetryConfig,
    base_url: &str,
) -> Result<(), EmbedError> {
    let health_url = format!("{base_url}/health");
    let outcome = execute_with_retry_async(retry_cfg, |_| {
        let client = client.clone();
        let url = health_url.clone();
        async move {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => Err(format!("health check returned {}", response.status())),
                Err(e) => Err(format!("connection to {url} failed: {e}")),
            }
        }
    })
    .await;

    let attempts = outcome.attempts;
    outcome.into_result().map_err(|e| {
        EmbedError::Unavailable(format!(
            "llama.cpp server at {base_url} not ready after {attempts} attempts: {e}"
        ))
    })?;
    tracing::info!(%base_url, attempts, "llama.cpp server is healthy");
    Ok(())
}

fn decode<T: serde::de::DeserializeOwned>(path: &str, value: Value) -> Result<T, EmbedError> {
    serde_json::from_value(value)
        .map_err(|e| EmbedError::Engine(format!("unexpected response shape from {path}: {e}")))
}

/// Extracts per-token vectors from an `/embedding` response.
///
/// A pooled response yields a single vector; the extractor then reports a count
/// mismatch against the token list.
fn parse_embedding_response(value: Value) -> Result<Vec<Vec<f32>>, EmbedError> {
    let item = match decode::<EmbeddingResponse>("/embedding", value)? {
        EmbeddingResponse::Batch(items) => items
            .into_iter()
            .next()
            .ok_or_else(|| EmbedError::Engine("/embedding returned no results".into()))?,
        EmbeddingResponse::Single(item) => item,
    };
    Ok(match item.embedding {
        EmbeddingValues::PerToken(rows) => rows,
        EmbeddingValues::Pooled(row) => vec![row],
    })
}

fn parse_chat_response(value: Value) -> Result<String, EmbedError> {
    let response: ChatResponse = decode("/v1/chat/completions", value)?;
    let content = response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .ok_or_else(|| EmbedError::Engine("chat completion returned no content".into()))?;
    Ok(content.trim().to_string())
}

#[async_trait]
impl InferenceEngine for LlamaServerEngine {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationConfig,
    ) -> Result<String, EmbedError> {
        let body = json!({
            "messages": [
                {"role": "system", "content": params.system_prompt},
                {"role": "user", "content": prompt},
            ],
            "max_tokens": params.max_tokens,
            "temperature": params.temperature,
        });
        let value = self.post_json(&self.generation_url, "/v1/chat/completions", body).await?;
        parse_chat_response(value)
    }

    async fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        let value = self.post_json(&self.base_url, "/embedding", json!({ "content": text })).await?;
        let rows = parse_embedding_response(value)?;
        if let Some(first) = rows.first() {
            let _ = self.dim.set(first.len());
        }
        Ok(rows)
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, EmbedError> {
        let value = self
            .post_json(&self.base_url, "/tokenize", json!({ "content": text, "add_special": true }))
            .await?;
        Ok(decode::<TokenizeResponse>("/tokenize", value)?.tokens)
    }

    async fn detokenize(&self, token: TokenId) -> Result<Vec<u8>, EmbedError> {
        let value = self
            .post_json(&self.base_url, "/detokenize", json!({ "tokens": [token] }))
            .await?;
        Ok(decode::<DetokenizeResponse>("/detokenize", value)?
            .content
            .into_bytes())
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: self.model_name.clone(),
            backend: MODE_LLAMA_SERVER.into(),
            embedding_dim: self.dim.get().copied(),
        }
    }
}
