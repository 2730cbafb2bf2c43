//! Purpose-built engines and loaders shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokenviz::{
    EmbedError, EngineConfig, EngineInfo, EngineLoader, GenerationConfig, InferenceEngine,
    ModelService, StubEngine,
};

pub fn stub_service(dim: usize) -> ModelService {
    ModelService::from_config(EngineConfig {
        mode: "stub".into(),
        embedding_dim: dim,
        ..Default::default()
    })
}

/// Engine whose tokens and vectors are spelled out per text.
pub struct ScriptedEngine {
    reply: String,
    segments: HashMap<String, Vec<(Vec<u8>, Vec<f32>)>>,
    pieces: Mutex<Vec<Vec<u8>>>,
    generate_calls: AtomicUsize,
    fail_generate: bool,
    short_embeddings: bool,
}

impl ScriptedEngine {
    pub fn new(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            segments: HashMap::new(),
            pieces: Mutex::new(Vec::new()),
            generate_calls: AtomicUsize::new(0),
            fail_generate: false,
            short_embeddings: false,
        }
    }

    /// Scripts the tokens and vectors returned for `text`.
    pub fn with_segment(self, text: &str, tokens: Vec<(&str, Vec<f32>)>) -> Self {
        let tokens = tokens
            .into_iter()
            .map(|(piece, vector)| (piece.as_bytes().to_vec(), vector))
            .collect();
        self.with_raw_segment(text, tokens)
    }

    /// Like [`with_segment`](Self::with_segment) with raw token bytes.
    pub fn with_raw_segment(mut self, text: &str, tokens: Vec<(Vec<u8>, Vec<f32>)>) -> Self {
        self.segments.insert(text.to_string(), tokens);
        self
    }

    pub fn failing_generation(mut self) -> Self {
        self.fail_generate = true;
        self
    }

    /// Returns one embedding fewer than there are tokens.
    pub fn with_short_embeddings(mut self) -> Self {
        self.short_embeddings = true;
        self
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    fn segment(&self, text: &str) -> Result<&Vec<(Vec<u8>, Vec<f32>)>, EmbedError> {
        self.segments
            .get(text)
            .ok_or_else(|| EmbedError::Engine(format!("unscripted text {text:?}")))
    }
}

#[async_trait]
impl InferenceEngine for ScriptedEngine {
    async fn generate(
        &self,
        _prompt: &str,
        _params: &GenerationConfig,
    ) -> Result<String, EmbedError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generate {
            return Err(EmbedError::Engine("scripted generation failure".into()));
        }
        Ok(self.reply.clone())
    }

    async fn embed(&self, text: &str) -> Result<Vec<Vec<f32>>, EmbedError> {
        let mut vectors: Vec<Vec<f32>> = self
            .segment(text)?
            .iter()
            .map(|(_, v)| v.clone())
            .collect();
        if self.short_embeddings {
            vectors.pop();
        }
        Ok(vectors)
    }

    async fn tokenize(&self, text: &str) -> Result<Vec<u32>, EmbedError> {
        let segment = self.segment(text)?;
        let mut pieces = self.pieces.lock().unwrap();
        Ok(segment
            .iter()
            .map(|(bytes, _)| {
                pieces.push(bytes.clone());
                (pieces.len() - 1) as u32
            })
            .collect())
    }

    async fn detokenize(&self, token: u32) -> Result<Vec<u8>, EmbedError> {
        self.pieces
            .lock()
            .unwrap()
            .get(token as usize)
            .cloned()
            .ok_or_else(|| EmbedError::Engine(format!("unknown token {token}")))
    }

    fn describe(&self) -> EngineInfo {
        EngineInfo {
            name: "scripted".into(),
            backend: "test".into(),
            embedding_dim: None,
        }
    }
}

/// Loader that hands out a prepared engine, optionally after a delay.
///
/// While switched to failing it reports a missing model file instead.
pub struct StaticLoader {
    engine: Arc<dyn InferenceEngine>,
    delay: Duration,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl StaticLoader {
    pub fn new(engine: Arc<dyn InferenceEngine>) -> Arc<Self> {
        Self::with_delay(engine, Duration::ZERO)
    }

    pub fn with_delay(engine: Arc<dyn InferenceEngine>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            engine,
            delay,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        })
    }

    /// Like [`new`](Self::new) but every load fails until [`set_failing`](Self::set_failing).
    pub fn failing(engine: Arc<dyn InferenceEngine>) -> Arc<Self> {
        let loader = Self::new(engine);
        loader.set_failing(true);
        loader
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn stub(dim: usize, delay: Duration) -> Arc<Self> {
        Self::with_delay(Arc::new(StubEngine::new(dim)), delay)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for StaticLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(EmbedError::ModelNotFound("models/absent.gguf".into()));
        }
        Ok(Arc::clone(&self.engine))
    }
}

/// Loader that always fails as if the model file were missing.
#[derive(Default)]
pub struct FailingLoader {
    calls: AtomicUsize,
}

impl FailingLoader {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EngineLoader for FailingLoader {
    async fn load(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(EmbedError::ModelNotFound("models/absent.gguf".into()))
    }
}

pub fn service_for(engine: Arc<ScriptedEngine>) -> (ModelService, Arc<StaticLoader>) {
    let loader = StaticLoader::new(engine);
    let service = ModelService::new(loader.clone(), Duration::from_secs(5));
    (service, loader)
}

pub fn v(values: &[f32]) -> Vec<f32> {
    values.to_vec()
}
