use crate::engine::InferenceEngine;
use crate::{EmbedError, TokenEmbedding};

/// Produces the filtered, aligned token/embedding list for `text`.
///
/// Embeddings and token ids come from encodings of the identical text. Each token
/// is decoded on its own with invalid UTF-8 replaced by U+FFFD, and pairs whose
/// token is empty or whitespace-only (special tokens such as BOS) are dropped.
/// Any engine failure aborts the whole extraction.
pub async fn extract_token_embeddings(
    engine: &dyn InferenceEngine,
    text: &str,
) -> Result<Vec<TokenEmbedding>, EmbedError> {
    let vectors = engine.embed(text).await?;
    let token_ids = engine.tokenize(text).await?;
    if token_ids.len() != vectors.len() {
        return Err(EmbedError::CountMismatch {
            tokens: token_ids.len(),
            embeddings: vectors.len(),
        });
    }

    let mut tokens = Vec::with_capacity(token_ids.len());
    for id in token_ids {
        let bytes = engine.detokenize(id).await?;
        tokens.push(String::from_utf8_lossy(&bytes).into_owned());
    }

    let pairs = pair_and_filter(tokens, vectors)?;
    if let Some(first) = pairs.first() {
        tracing::debug!(token = %first.token, vector = %first.preview(), "first token embedding");
    }
    Ok(pairs)
}

/// Zips tokens with vectors by position and removes blank tokens from the paired list.
pub fn pair_and_filter(
    tokens: Vec<String>,
    vectors: Vec<Vec<f32>>,
) -> Result<Vec<TokenEmbedding>, EmbedError> {
    if tokens.len() != vectors.len() {
        return Err(EmbedError::CountMismatch {
            tokens: tokens.len(),
            embeddings: vectors.len(),
        });
    }

    let total = tokens.len();
    let pairs: Vec<TokenEmbedding> = tokens
        .into_iter()
        .zip(vectors)
        .map(|(token, vector)| TokenEmbedding { token, vector })
        .filter(|pair| !pair.is_blank())
        .collect();

    tracing::debug!(total, kept = pairs.len(), "filtered blank tokens");
    Ok(pairs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{EngineInfo, GenerationConfig, StubEngine};
    use async_trait::async_trait;

    fn strings(tokens: &[&str]) -> Vec<String> {
        tokens.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn filter_removes_whitespace_token_with_its_vector() {
        let tokens = strings(&["The", " cat", "  ", " sat"]);
        let vectors = vec![vec![0.0], vec![1.0], vec![2.0], vec![3.0]];

        let pairs = pair_and_filter(tokens, vectors).unwrap();

        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0], TokenEmbedding::new("The", vec![0.0]));
        assert_eq!(pairs[1], TokenEmbedding::new(" cat", vec![1.0]));
        assert_eq!(pairs[2], TokenEmbedding::new(" sat", vec![3.0]));
    }

    #[test]
    fn filter_removes_leading_empty_special_token() {
        let tokens = strings(&["", "Hello"]);
        let vectors = vec![vec![9.0, 9.0], vec![1.0, 2.0]];

        let pairs = pair_and_filter(tokens, vectors).unwrap();

        assert_eq!(pairs, vec![TokenEmbedding::new("Hello", vec![1.0, 2.0])]);
    }

    #[test]
    fn filter_keeps_literal_token_text() {
        let pairs = pair_and_filter(strings(&[" world "]), vec![vec![0.5]]).unwrap();
        assert_eq!(pairs[0].token, " world ");
    }

    #[test]
    fn pairing_rejects_length_mismatch() {
        let err = pair_and_filter(strings(&["a", "b"]), vec![vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            EmbedError::CountMismatch {
                tokens: 2,
                embeddings: 1
            }
        ));
    }

    #[tokio::test]
    async fn extract_with_stub_drops_bos_and_keeps_order() {
        let engine = StubEngine::new(16);
        let pairs = extract_token_embeddings(&engine, "Hello brave world")
            .await
            .unwrap();

        let tokens: Vec<&str> = pairs.iter().map(|p| p.token.as_str()).collect();
        assert_eq!(tokens, vec!["Hello", " brave", " world"]);
        assert!(pairs.iter().all(|p| p.dim() == 16));
    }

    /// Engine whose single token is a lone UTF-8 continuation byte.
    struct BrokenBytesEngine;

    #[async_trait]
    impl InferenceEngine for BrokenBytesEngine {
        async fn generate(&self, _: &str, _: &GenerationConfig) -> Result<String, EmbedError> {
            Ok(String::new())
        }
        async fn embed(&self, _: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(vec![vec![1.0, 2.0]])
        }
        async fn tokenize(&self, _: &str) -> Result<Vec<u32>, EmbedError> {
            Ok(vec![7])
        }
        async fn detokenize(&self, _: u32) -> Result<Vec<u8>, EmbedError> {
            Ok(vec![0x80])
        }
        fn describe(&self) -> EngineInfo {
            EngineInfo {
                name: "broken-bytes".into(),
                backend: "test".into(),
                embedding_dim: Some(2),
            }
        }
    }

    #[tokio::test]
    async fn extract_replaces_invalid_utf8() {
        let pairs = extract_token_embeddings(&BrokenBytesEngine, "x")
            .await
            .unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].token, "\u{FFFD}");
    }
}
