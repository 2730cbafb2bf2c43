//! Pipeline metrics hooks. Kept in its own test binary because the recorder is
//! process-global.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use common::stub_service;
use tokenviz::{set_pipeline_metrics, visualize, GenerationConfig, PipelineMetrics, Stage};

#[derive(Default)]
struct RecordingMetrics {
    stages: Mutex<Vec<(&'static str, bool)>>,
    tokens: Mutex<Vec<(&'static str, usize)>>,
    outcomes: Mutex<Vec<&'static str>>,
}

impl PipelineMetrics for RecordingMetrics {
    fn record_stage(&self, stage: Stage, _latency: Duration, ok: bool) {
        self.stages.lock().unwrap().push((stage.as_str(), ok));
    }

    fn record_tokens(&self, segment: &'static str, count: usize) {
        self.tokens.lock().unwrap().push((segment, count));
    }

    fn record_outcome(&self, outcome: &'static str, _latency: Duration) {
        self.outcomes.lock().unwrap().push(outcome);
    }
}

#[tokio::test]
async fn metrics_recorder_tracks_pipeline_outcome() {
    let metrics = Arc::new(RecordingMetrics::default());
    set_pipeline_metrics(Some(metrics.clone()));

    let service = stub_service(16);
    let vis = visualize(&service, "count these words", &GenerationConfig::default())
        .await
        .unwrap();
    let _ = visualize(&service, "   ", &GenerationConfig::default()).await;

    set_pipeline_metrics(None);

    let stages: Vec<&str> = metrics.stages.lock().unwrap().iter().map(|(s, _)| *s).collect();
    assert_eq!(
        stages,
        vec!["load", "generate", "extract_input", "extract_output", "reduce"]
    );
    assert!(metrics.stages.lock().unwrap().iter().all(|(_, ok)| *ok));
    assert_eq!(
        *metrics.tokens.lock().unwrap(),
        vec![("input", vis.input_token_count), ("output", vis.output_token_count)]
    );
    assert_eq!(*metrics.outcomes.lock().unwrap(), vec!["ok", "empty_input"]);
}
