//! Workspace umbrella crate for tokenviz.
//!
//! This crate stitches the inference seam (`embed`) and the joint projection
//! (`reduce`) into one call: [`visualize`] takes a prompt, asks the model for a
//! short reply, embeds every token of both, and returns one 3D point per token
//! with a flag saying which side of the conversation it came from.

pub mod config;

pub use config::{ConfigLoadError, TokenvizConfig};
pub use embed::{
    extract_token_embeddings, ConfigLoader, EmbedError, EngineConfig, EngineGuard, EngineInfo,
    EngineLoader, GenerationConfig, InferenceEngine, ModelService, ModelStatus, StubEngine,
    TokenEmbedding,
};
pub use reduce::{normalize_coordinates, reduce_joint, Projection, ReduceError, COMPONENTS};

use serde::Serialize;
use std::error::Error;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

/// One token placed in the shared 3D space.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenVisualization {
    pub token: String,
    /// Normalized coordinates, each in `[-1, 1]`.
    pub destination: [f64; COMPONENTS],
    pub is_input: bool,
}

/// Result of one [`visualize`] call: input tokens first, then output tokens.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Visualization {
    pub tokens: Vec<TokenVisualization>,
    pub generated_text: String,
    pub input_token_count: usize,
    pub output_token_count: usize,
    pub original_dim: usize,
    pub explained_variance: [f64; COMPONENTS],
}

/// Errors that can occur while turning a prompt into a visualization.
#[derive(Debug, Clone)]
pub enum PipelineError {
    EmptyInput,
    ModelUnavailable(String),
    Generation(EmbedError),
    Extraction(EmbedError),
    DegenerateInput { tokens: usize },
    DimensionalityMismatch { input: usize, output: usize },
    Reduction(ReduceError),
    Worker(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::EmptyInput => write!(f, "input text is empty"),
            PipelineError::ModelUnavailable(reason) => write!(f, "model unavailable: {reason}"),
            PipelineError::Generation(err) => write!(f, "text generation failed: {err}"),
            PipelineError::Extraction(err) => write!(f, "embedding extraction failed: {err}"),
            PipelineError::DegenerateInput { tokens } => write!(
                f,
                "only {tokens} visible tokens; at least {COMPONENTS} are needed to project"
            ),
            PipelineError::DimensionalityMismatch { input, output } => write!(
                f,
                "input embeddings are {input}-dimensional but output embeddings are {output}-dimensional"
            ),
            PipelineError::Reduction(err) => write!(f, "dimensionality reduction failed: {err}"),
            PipelineError::Worker(msg) => write!(f, "reduction worker failed: {msg}"),
        }
    }
}

impl Error for PipelineError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PipelineError::Generation(err) | PipelineError::Extraction(err) => Some(err),
            PipelineError::Reduction(err) => Some(err),
            PipelineError::EmptyInput
            | PipelineError::ModelUnavailable(_)
            | PipelineError::DegenerateInput { .. }
            | PipelineError::DimensionalityMismatch { .. }
            | PipelineError::Worker(_) => None,
        }
    }
}

impl From<ReduceError> for PipelineError {
    fn from(value: ReduceError) -> Self {
        match value {
            ReduceError::DegenerateInput { rows, .. } => {
                PipelineError::DegenerateInput { tokens: rows }
            }
            ReduceError::DimensionalityMismatch { input, output } => {
                PipelineError::DimensionalityMismatch { input, output }
            }
            other => PipelineError::Reduction(other),
        }
    }
}

impl PipelineError {
    /// Short message that is safe to show to a client.
    pub fn public_message(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput => "input_text is required",
            PipelineError::ModelUnavailable(_) => "Model is not loaded. Please try again later.",
            PipelineError::DegenerateInput { .. } => {
                "Input is too short to visualize. Please enter a longer sentence."
            }
            _ => "Failed to generate visualization.",
        }
    }

    /// Stable label used for the request outcome metric.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::EmptyInput => "empty_input",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::Generation(_) => "generation_error",
            PipelineError::Extraction(_) => "extraction_error",
            PipelineError::DegenerateInput { .. } => "degenerate_input",
            PipelineError::DimensionalityMismatch { .. } => "dimensionality_mismatch",
            PipelineError::Reduction(_) => "reduction_error",
            PipelineError::Worker(_) => "worker_error",
        }
    }
}

/// Renders `err` and all of its sources as `outer: inner: ...`.
pub fn error_chain(err: &dyn Error) -> String {
    let mut out = err.to_string();
    let mut source = err.source();
    while let Some(inner) = source {
        out.push_str(": ");
        out.push_str(&inner.to_string());
        source = inner.source();
    }
    out
}

/// Pipeline stages timed by [`PipelineMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Load,
    Generate,
    ExtractInput,
    ExtractOutput,
    Reduce,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Load => "load",
            Stage::Generate => "generate",
            Stage::ExtractInput => "extract_input",
            Stage::ExtractOutput => "extract_output",
            Stage::Reduce => "reduce",
        }
    }
}

/// Metrics observer for pipeline stages.
pub trait PipelineMetrics: Send + Sync {
    fn record_stage(&self, stage: Stage, latency: Duration, ok: bool);
    fn record_tokens(&self, segment: &'static str, count: usize);
    fn record_outcome(&self, outcome: &'static str, latency: Duration);
}

/// Forwards pipeline events to the global `metrics` recorder.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeMetrics;

impl PipelineMetrics for FacadeMetrics {
    fn record_stage(&self, stage: Stage, latency: Duration, ok: bool) {
        metrics::histogram!("tokenviz_stage_seconds", "stage" => stage.as_str())
            .record(latency.as_secs_f64());
        if !ok {
            metrics::counter!("tokenviz_stage_failures_total", "stage" => stage.as_str())
                .increment(1);
        }
    }

    fn record_tokens(&self, segment: &'static str, count: usize) {
        metrics::counter!("tokenviz_tokens_total", "segment" => segment).increment(count as u64);
    }

    fn record_outcome(&self, outcome: &'static str, latency: Duration) {
        metrics::counter!("tokenviz_requests_total", "outcome" => outcome).increment(1);
        metrics::histogram!("tokenviz_request_seconds").record(latency.as_secs_f64());
    }
}

/// Install or clear the global pipeline metrics recorder.
pub fn set_pipeline_metrics(recorder: Option<Arc<dyn PipelineMetrics>>) {
    let mut guard = metrics_lock()
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    *guard = recorder;
}

fn metrics_lock() -> &'static RwLock<Option<Arc<dyn PipelineMetrics>>> {
    static METRICS: OnceLock<RwLock<Option<Arc<dyn PipelineMetrics>>>> = OnceLock::new();
    METRICS.get_or_init(|| RwLock::new(None))
}

fn metrics_recorder() -> Option<Arc<dyn PipelineMetrics>> {
    let guard = metrics_lock()
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    guard.clone()
}

struct MetricsSpan {
    recorder: Arc<dyn PipelineMetrics>,
    start: Instant,
}

impl MetricsSpan {
    fn start() -> Option<Self> {
        metrics_recorder().map(|recorder| Self {
            recorder,
            start: Instant::now(),
        })
    }

    fn record_stage(self, stage: Stage, ok: bool) {
        self.recorder.record_stage(stage, self.start.elapsed(), ok);
    }

    fn record_outcome(self, outcome: &'static str) {
        self.recorder.record_outcome(outcome, self.start.elapsed());
    }
}

async fn timed<T, E, F>(stage: Stage, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let span = MetricsSpan::start();
    let out = fut.await;
    if let Some(span) = span {
        span.record_stage(stage, out.is_ok());
    }
    out
}

fn unavailable_reason(err: EmbedError) -> String {
    match err {
        EmbedError::Unavailable(reason) => reason,
        other => other.to_string(),
    }
}

/// Generates a reply to `input_text` and places every visible token of the
/// prompt and the reply in one normalized 3D space.
///
/// The engine is held exclusively from generation through both extractions and
/// released before the projection, which runs on a blocking worker. Any stage
/// failure aborts the whole request.
pub async fn visualize(
    service: &ModelService,
    input_text: &str,
    generation: &GenerationConfig,
) -> Result<Visualization, PipelineError> {
    let span = MetricsSpan::start();
    let result = run_pipeline(service, input_text, generation).await;

    match &result {
        Ok(vis) => {
            tracing::info!(
                input_tokens = vis.input_token_count,
                output_tokens = vis.output_token_count,
                dim = vis.original_dim,
                "visualization complete"
            );
        }
        Err(err @ PipelineError::DimensionalityMismatch { .. }) => {
            tracing::error!(error = %err, "input and output embeddings disagree on width; engine bug");
        }
        Err(err @ (PipelineError::EmptyInput | PipelineError::DegenerateInput { .. })) => {
            tracing::info!(error = %err, "request rejected");
        }
        Err(err @ PipelineError::ModelUnavailable(_)) => {
            tracing::warn!(error = %err, "model unavailable");
        }
        Err(err) => {
            tracing::error!(error = %error_chain(err), "visualization failed");
        }
    }

    if let Some(span) = span {
        let outcome = match &result {
            Ok(_) => "ok",
            Err(err) => err.kind(),
        };
        span.record_outcome(outcome);
    }
    result
}

async fn run_pipeline(
    service: &ModelService,
    input_text: &str,
    generation: &GenerationConfig,
) -> Result<Visualization, PipelineError> {
    if input_text.trim().is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    let engine = timed(Stage::Load, service.acquire())
        .await
        .map_err(|e| PipelineError::ModelUnavailable(unavailable_reason(e)))?;

    let generated = timed(Stage::Generate, engine.generate(input_text, generation))
        .await
        .map_err(PipelineError::Generation)?;
    let generated_text = generated.trim().to_string();
    tracing::info!(chars = generated_text.chars().count(), "generated completion");

    let input_tokens = timed(
        Stage::ExtractInput,
        extract_token_embeddings(&*engine, input_text),
    )
    .await
    .map_err(PipelineError::Extraction)?;
    let output_tokens = timed(
        Stage::ExtractOutput,
        extract_token_embeddings(&*engine, &generated_text),
    )
    .await
    .map_err(PipelineError::Extraction)?;
    drop(engine);

    let input_token_count = input_tokens.len();
    let output_token_count = output_tokens.len();
    tracing::info!(
        input_tokens = input_token_count,
        output_tokens = output_token_count,
        "extracted token embeddings"
    );
    if let Some(recorder) = metrics_recorder() {
        recorder.record_tokens("input", input_token_count);
        recorder.record_tokens("output", output_token_count);
    }

    if let (Some(a), Some(b)) = (input_tokens.first(), output_tokens.first()) {
        if a.dim() != b.dim() {
            return Err(PipelineError::DimensionalityMismatch {
                input: a.dim(),
                output: b.dim(),
            });
        }
    }
    let total = input_token_count + output_token_count;
    if total < COMPONENTS {
        return Err(PipelineError::DegenerateInput { tokens: total });
    }

    let reduce_span = MetricsSpan::start();
    let reduced = tokio::task::spawn_blocking(move || {
        let projection = reduce_joint(&input_tokens, &output_tokens)?;
        let coords = normalize_coordinates(&projection.points);
        Ok::<_, ReduceError>((input_tokens, output_tokens, projection, coords))
    })
    .await
    .map_err(|e| PipelineError::Worker(e.to_string()))?;
    if let Some(span) = reduce_span {
        span.record_stage(Stage::Reduce, reduced.is_ok());
    }
    let (input_tokens, output_tokens, projection, coords) = reduced?;

    let tokens = input_tokens
        .into_iter()
        .map(|t| (t.token, true))
        .chain(output_tokens.into_iter().map(|t| (t.token, false)))
        .zip(coords)
        .map(|((token, is_input), destination)| TokenVisualization {
            token,
            destination,
            is_input,
        })
        .collect();

    Ok(Visualization {
        tokens,
        generated_text,
        input_token_count,
        output_token_count,
        original_dim: projection.original_dim,
        explained_variance: projection.explained_variance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_errors_map_to_pipeline_variants() {
        let degenerate: PipelineError = ReduceError::DegenerateInput {
            rows: 2,
            required: 3,
        }
        .into();
        assert!(matches!(degenerate, PipelineError::DegenerateInput { tokens: 2 }));

        let mismatch: PipelineError = ReduceError::DimensionalityMismatch {
            input: 8,
            output: 16,
        }
        .into();
        assert!(matches!(
            mismatch,
            PipelineError::DimensionalityMismatch {
                input: 8,
                output: 16
            }
        ));

        let other: PipelineError = ReduceError::NonFinite { row: 4 }.into();
        assert!(matches!(other, PipelineError::Reduction(_)));
    }

    #[test]
    fn public_messages_hide_internals() {
        let err = PipelineError::Generation(EmbedError::Engine(
            "POST /v1/chat/completions returned 500: secret stack".into(),
        ));
        assert_eq!(err.public_message(), "Failed to generate visualization.");
        assert!(!err.public_message().contains("secret"));
        assert_eq!(
            PipelineError::ModelUnavailable("x".into()).public_message(),
            "Model is not loaded. Please try again later."
        );
    }

    #[test]
    fn error_chain_includes_sources() {
        let err = PipelineError::Extraction(EmbedError::CountMismatch {
            tokens: 3,
            embeddings: 2,
        });
        let chain = error_chain(&err);
        assert!(chain.starts_with("embedding extraction failed"));
        assert!(chain.contains("engine returned 2 embeddings for 3 tokens"));
    }

    #[test]
    fn unavailable_reason_strips_prefix() {
        assert_eq!(
            unavailable_reason(EmbedError::Unavailable("still loading".into())),
            "still loading"
        );
        assert!(unavailable_reason(EmbedError::Engine("boom".into())).contains("boom"));
    }

    #[test]
    fn stage_labels_are_stable() {
        assert_eq!(Stage::ExtractOutput.as_str(), "extract_output");
        assert_eq!(PipelineError::EmptyInput.kind(), "empty_input");
    }

    #[tokio::test]
    async fn visualize_hello_with_stub() {
        let service = ModelService::from_config(EngineConfig {
            mode: "stub".into(),
            embedding_dim: 32,
            ..Default::default()
        });
        let vis = visualize(&service, "Hello", &GenerationConfig::default())
            .await
            .unwrap();

        assert_eq!(vis.input_token_count, 1);
        assert!(vis.output_token_count >= 2);
        assert_eq!(vis.tokens.len(), vis.input_token_count + vis.output_token_count);
        assert_eq!(vis.tokens[0].token, "Hello");
        assert!(vis.tokens[0].is_input);
        assert!(vis.tokens[1..].iter().all(|t| !t.is_input));
        assert_eq!(vis.original_dim, 32);
    }
}
