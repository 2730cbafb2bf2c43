use std::io;
use thiserror::Error;

/// Errors surfaced by engines, the extractor and the model service.
#[derive(Debug, Error)]
pub enum EmbedError {
    /// The model file could not be located locally and no download URL was provided.
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    /// Configuration is inconsistent (e.g., unknown mode or missing base URL).
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
    /// Unable to download the model file.
    #[error("download failed: {0}")]
    Download(String),
    /// The engine is not loaded and could not be brought to a ready state.
    #[error("model unavailable: {0}")]
    Unavailable(String),
    /// A generate/embed/tokenize/detokenize call failed.
    #[error("engine call failed: {0}")]
    Engine(String),
    /// Tokenization and embedding of the same text disagree on length.
    #[error("engine returned {embeddings} embeddings for {tokens} tokens")]
    CountMismatch { tokens: usize, embeddings: usize },
    /// Low-level IO failures while touching the filesystem.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl EmbedError {
    /// Whether the failure means the engine itself is not usable, as opposed to a
    /// failure of one call against a working engine.
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            EmbedError::Unavailable(_) | EmbedError::ModelNotFound(_) | EmbedError::Download(_)
        )
    }
}

impl Clone for EmbedError {
    fn clone(&self) -> Self {
        match self {
            EmbedError::ModelNotFound(s) => EmbedError::ModelNotFound(s.clone()),
            EmbedError::InvalidConfig(s) => EmbedError::InvalidConfig(s.clone()),
            EmbedError::Download(s) => EmbedError::Download(s.clone()),
            EmbedError::Unavailable(s) => EmbedError::Unavailable(s.clone()),
            EmbedError::Engine(s) => EmbedError::Engine(s.clone()),
            EmbedError::CountMismatch { tokens, embeddings } => EmbedError::CountMismatch {
                tokens: *tokens,
                embeddings: *embeddings,
            },
            EmbedError::Io(e) => EmbedError::Engine(format!("IO error occurred: {e}")),
        }
    }
}
