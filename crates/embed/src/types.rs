use serde::{Deserialize, Serialize};

/// A decoded token paired with the embedding vector the engine produced for it.
///
/// Tokens and vectors travel as one record from the moment they are paired, so
/// filtering can never remove one without the other.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TokenEmbedding {
    /// Literal display text of the token, including any leading space.
    pub token: String,
    /// Embedding values, one per model hidden dimension.
    pub vector: Vec<f32>,
}

impl TokenEmbedding {
    pub fn new(token: impl Into<String>, vector: Vec<f32>) -> Self {
        Self {
            token: token.into(),
            vector,
        }
    }

    /// Dimension of [`vector`](Self::vector).
    pub fn dim(&self) -> usize {
        self.vector.len()
    }

    /// True when the token renders as nothing once surrounding whitespace is trimmed.
    pub fn is_blank(&self) -> bool {
        self.token.trim().is_empty()
    }

    /// Short human-readable rendering of the vector for debug logs.
    pub fn preview(&self) -> String {
        format_vector(&self.vector, 5)
    }
}

impl AsRef<[f32]> for TokenEmbedding {
    fn as_ref(&self) -> &[f32] {
        &self.vector
    }
}

/// Identity of a loaded engine, surfaced on health checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineInfo {
    pub name: String,
    pub backend: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_dim: Option<usize>,
}

/// Formats the first `show_first` values with four decimals followed by the full dimension,
/// e.g. `[0.1000, -0.2000, ...] (dim=2048)`.
pub fn format_vector(values: &[f32], show_first: usize) -> String {
    let head: Vec<String> = values
        .iter()
        .take(show_first)
        .map(|v| format!("{v:.4}"))
        .collect();
    if values.len() > show_first {
        format!("[{}, ...] (dim={})", head.join(", "), values.len())
    } else {
        format!("[{}] (dim={})", head.join(", "), values.len())
    }
}
