use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use crate::{EmbedError, EngineConfig};

/// Size and location of the model file, reported on `/health` and at startup.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ModelFileInfo {
    pub name: String,
    pub path: String,
    pub size_mb: f64,
}

/// Ensures the configured model file exists locally, downloading it when a URL is provided.
///
/// Returns `Ok(None)` when no model file is configured (e.g. the stub engine, or a
/// llama.cpp server that manages its own weights).
pub(crate) async fn resolve_model_file(cfg: &EngineConfig) -> Result<Option<PathBuf>, EmbedError> {
    let Some(target) = cfg.model_path.as_deref() else {
        return Ok(None);
    };

    if tokio::fs::try_exists(target).await? {
        tracing::info!(path = %target.display(), "using existing model file");
        return Ok(Some(target.to_path_buf()));
    }

    match cfg.model_url.as_deref() {
        Some(url) => {
            tracing::info!(url, path = %target.display(), "model file missing, downloading");
            download_to_path(target, url).await?;
            Ok(Some(target.to_path_buf()))
        }
        None => Err(EmbedError::ModelNotFound(target.display().to_string())),
    }
}

/// Downloads `url` into `target`, creating parent directories as needed.
async fn download_to_path(target: &Path, url: &str) -> Result<(), EmbedError> {
    if let Some(parent) = target.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }

    let response = reqwest::get(url)
        .await
        .map_err(|e| EmbedError::Download(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(EmbedError::Download(format!(
            "unexpected status {status} while fetching {url}"
        )));
    }

    // Stream into a sibling temp file so a partial download never looks complete.
    let partial = target.with_extension("part");
    let written = match stream_to_file(response, &partial).await {
        Ok(written) => written,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    if let Err(e) = tokio::fs::rename(&partial, target).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e.into());
    }
    tracing::info!(path = %target.display(), bytes = written, "model download completed");
    Ok(())
}

/// Copies the response body chunk by chunk; memory use stays at one chunk.
async fn stream_to_file(mut response: reqwest::Response, path: &Path) -> Result<u64, EmbedError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| EmbedError::Download(e.to_string()))?
    {
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;
    Ok(written)
}

/// Metadata for the configured model file, if one is configured and present.
pub fn model_file_info(cfg: &EngineConfig) -> Option<ModelFileInfo> {
    let path = cfg.model_path.as_deref()?;
    let meta = std::fs::metadata(path).ok()?;
    Some(ModelFileInfo {
        name: path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| cfg.model_name.clone()),
        path: path.display().to_string(),
        size_mb: meta.len() as f64 / (1024.0 * 1024.0),
    })
}
