//! Process-wide owner of the inference engine.
//!
//! The engine is loaded at most once. Callers that arrive while a load is in
//! flight wait on a `watch` channel (bounded by `load_wait`) instead of starting
//! a second load, and a failed load is cached until [`ModelService::reset`].
//! Inference is serialized: [`ModelService::acquire`] hands out one
//! [`EngineGuard`] at a time.

use serde::Serialize;
use std::ops::Deref;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex, MutexGuard};

use crate::engine::{EngineLoader, InferenceEngine};
use crate::loader::ConfigLoader;
use crate::{EmbedError, EngineConfig, EngineInfo};

enum LoadState {
    NotLoaded,
    Loading,
    Ready(Arc<dyn InferenceEngine>),
    Failed(String),
}

impl LoadState {
    fn is_loading(&self) -> bool {
        matches!(self, LoadState::Loading)
    }

    fn settled(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError> {
        match self {
            LoadState::Ready(engine) => Ok(Arc::clone(engine)),
            LoadState::Failed(reason) => Err(EmbedError::Unavailable(reason.clone())),
            LoadState::NotLoaded => Err(EmbedError::Unavailable("model is not loaded".into())),
            LoadState::Loading => Err(EmbedError::Unavailable(
                "model is still loading, try again shortly".into(),
            )),
        }
    }
}

/// Public snapshot of the load state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ModelStatus {
    NotLoaded,
    Loading,
    Ready,
    Failed(String),
}

impl ModelStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelStatus::NotLoaded => "not_loaded",
            ModelStatus::Loading => "loading",
            ModelStatus::Ready => "ready",
            ModelStatus::Failed(_) => "failed",
        }
    }
}

/// Exclusive access to the engine for the lifetime of the guard.
pub struct EngineGuard<'a> {
    engine: Arc<dyn InferenceEngine>,
    _permit: MutexGuard<'a, ()>,
}

impl Deref for EngineGuard<'_> {
    type Target = dyn InferenceEngine;

    fn deref(&self) -> &Self::Target {
        self.engine.as_ref()
    }
}

pub struct ModelService {
    loader: Arc<dyn EngineLoader>,
    state: watch::Sender<LoadState>,
    inference: Mutex<()>,
    load_wait: Duration,
}

/// Puts the state back to `NotLoaded` if a load future is dropped before finishing.
struct LoadingReset<'a> {
    state: &'a watch::Sender<LoadState>,
    armed: bool,
}

impl Drop for LoadingReset<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.state.send_if_modified(|state| {
                if state.is_loading() {
                    *state = LoadState::NotLoaded;
                    true
                } else {
                    false
                }
            });
        }
    }
}

impl ModelService {
    pub fn new(loader: Arc<dyn EngineLoader>, load_wait: Duration) -> Self {
        let (state, _) = watch::channel(LoadState::NotLoaded);
        Self {
            loader,
            state,
            inference: Mutex::new(()),
            load_wait,
        }
    }

    /// Service whose loader builds the engine described by `cfg`.
    pub fn from_config(cfg: EngineConfig) -> Self {
        let load_wait = cfg.load_wait();
        Self::new(Arc::new(ConfigLoader::new(cfg)), load_wait)
    }

    pub fn status(&self) -> ModelStatus {
        match &*self.state.borrow() {
            LoadState::NotLoaded => ModelStatus::NotLoaded,
            LoadState::Loading => ModelStatus::Loading,
            LoadState::Ready(_) => ModelStatus::Ready,
            LoadState::Failed(reason) => ModelStatus::Failed(reason.clone()),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(&*self.state.borrow(), LoadState::Ready(_))
    }

    pub fn engine_info(&self) -> Option<EngineInfo> {
        match &*self.state.borrow() {
            LoadState::Ready(engine) => Some(engine.describe()),
            _ => None,
        }
    }

    /// Brings the engine to the ready state, loading it on first use.
    ///
    /// Returns `EmbedError::Unavailable` if the load fails, failed earlier, or is
    /// still running in another task after `load_wait`.
    pub async fn ensure_loaded(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError> {
        let mut claimed = false;
        self.state.send_if_modified(|state| {
            if matches!(state, LoadState::NotLoaded) {
                *state = LoadState::Loading;
                claimed = true;
                true
            } else {
                false
            }
        });
        if claimed {
            return self.run_load().await;
        }

        let mut rx = self.state.subscribe();
        let settled = match tokio::time::timeout(self.load_wait, rx.wait_for(|state| !state.is_loading())).await
        {
            Ok(Ok(state)) => state.settled(),
            Ok(Err(_)) => Err(EmbedError::Unavailable("model service shut down".into())),
            Err(_) => {
                tracing::warn!(wait_ms = self.load_wait.as_millis() as u64, "gave up waiting for model load");
                LoadState::Loading.settled()
            }
        };
        settled
    }

    async fn run_load(&self) -> Result<Arc<dyn InferenceEngine>, EmbedError> {
        let mut reset = LoadingReset {
            state: &self.state,
            armed: true,
        };
        tracing::info!("model not loaded, loading now");
        let started = Instant::now();
        let outcome = self.loader.load().await;
        reset.armed = false;

        match outcome {
            Ok(engine) => {
                let info = engine.describe();
                tracing::info!(
                    model = %info.name,
                    backend = %info.backend,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "model loading completed"
                );
                self.state.send_replace(LoadState::Ready(Arc::clone(&engine)));
                Ok(engine)
            }
            Err(err) => {
                tracing::error!(error = %err, "model load failed");
                let reason = err.to_string();
                self.state.send_replace(LoadState::Failed(reason.clone()));
                Err(EmbedError::Unavailable(reason))
            }
        }
    }

    /// Loads the engine if needed and waits for exclusive use of it.
    pub async fn acquire(&self) -> Result<EngineGuard<'_>, EmbedError> {
        let engine = self.ensure_loaded().await?;
        let permit = self.inference.lock().await;
        Ok(EngineGuard {
            engine,
            _permit: permit,
        })
    }

    /// Clears a cached load failure so the next caller retries. Returns whether a
    /// failure was cleared.
    pub fn reset(&self) -> bool {
        self.state.send_if_modified(|state| {
            if matches!(state, LoadState::Failed(_)) {
                *state = LoadState::NotLoaded;
                true
            } else {
                false
            }
        })
    }
}
