use async_trait::async_trait;
use fxhash::hash64;
use std::collections::HashMap;
use std::sync::RwLock;

use crate::engine::{InferenceEngine, TokenId};
use crate::{EmbedError, EngineInfo, GenerationConfig};

/// Id of the beginning-of-sequence marker prepended to every encoding. Decodes to `""`.
pub const BOS_TOKEN: TokenId = 1;

/// Deterministic engine used when mode is `"stub"` and throughout the test suites.
///
/// Tokenization splits text into word pieces that keep their leading whitespace
/// (`"Hello world"` -> `"Hello"`, `" world"`), with punctuation as single-character
/// pieces. Vectors are sinusoids derived from a hash of the piece, so the same
/// piece always embeds to the same vector.
pub struct StubEngine {
    dim: usize,
    vocab: RwLock<Vocab>,
}

#[derive(Default)]
struct Vocab {
    ids: HashMap<String, TokenId>,
    pieces: Vec<String>,
}

impl StubEngine {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            vocab: RwLock::new(Vocab {
                ids: HashMap::new(),
                // 0 = padding, 1 = BOS; both decode to nothing.
                pieces: vec![String::new(), String::new()],
            }),
        }
    }

    fn encode(&self, text: &str) -> Result<Vec<(TokenId, String)>, EmbedError> {
        let mut vocab = self
            .vocab
            .write()
            .map_err(|_| EmbedError::Engine("stub vocabulary lock poisoned".into()))?;
        let mut out = vec![(BOS_TOKEN, "<s>".to_string())];
        for piece in split_pieces(text) {
            let id = match vocab.ids.get(piece) {
                Some(id) => *id,
                None => {
                    let id = vocab.pieces.len() as TokenId;
                    vocab.pieces.push(piece.to_string());
                    vocab.ids.insert(piece.to_string(), id);
                    id
                }
            };
            out.push((id, piece.to_string()));
        }
        Ok(out)
    }

    fn piece_vector(&self, piece: &str) -> Vec<f32> {
        let h = hash64(piece.as_bytes());
        (0..self.dim)
            .map(|idx| ((h >> (idx % 32)) as f32 * 0.0001 + idx as f32 * 0.01).sin())
            .collect()
    }
}

#[async_trait]
impl InferenceEngine for StubEngine {
    async fn generate(
        &self,
        prompt: &str,
        params: &GenerationConfig,
    ) -> Result<String, EmbedError> {
        let topic: Vec<&str> = prompt.split_whitespace().take(4).collect();
        let reply = if topic.is_empty() {
            "I have nothing to add.".to_string()
        } else {
            format!("You mentioned {}, which sounds interesting.", topic.join(" "))
        };
        let limited: String = split_pieces(&reply)
            .into_iter()
            .take(params.max_tokens as usize)
            .collect();
        Ok(limited.trim().to_string())
    }

    async fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        Ok(self
            .encode(text)?
            .iter()
            .map(|(_, piece)| self.piece_vector(piece))
            .collect())
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<TokenId>, EmbedError> {
        Ok(self.encode(text)?.into_iter().map(|(id, _)| id).collect())
    }

    async fn detokenize(&self, token: TokenId) -> Result<Vec<u8>, EmbedError> {
        let vocab = self
            .vocab
            .read()
            .map_err(|_| EmbedError::Engine("stub vocabulary lock poisoned".into()))?;
        vocab
            .pieces
            .get(token as usize)
            .map(|piece| piece.as_bytes().to_vec())
            .ok_or_else(|| EmbedError::Engine(format!("unknown token id {token}")))
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: "stub".into(),
            backend: crate::config::MODE_STUB.into(),
            embedding_dim: Some(self.dim),
        }
    }
}

/// Splits text into pieces of (leading whitespace + word) or (leading whitespace + one symbol).
/// Trailing whitespace becomes a whitespace-only piece.
fn split_pieces(text: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut chars = text.char_indices().peekable();
    while let Some(&(start, _)) = chars.peek() {
        while chars.next_if(|(_, c)| c.is_whitespace()).is_some() {}
        match chars.peek() {
            Some((_, c)) if c.is_alphanumeric() => {
                while chars.next_if(|(_, c)| c.is_alphanumeric()).is_some() {}
            }
            Some(_) => {
                chars.next();
            }
            None => {}
        }
        let end = chars.peek().map(|&(i, _)| i).unwrap_or(text.len());
        pieces.push(&text[start..end]);
    }
    pieces
}
