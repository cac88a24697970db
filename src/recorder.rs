//! Acquisition-side recorders driven by the polling bridge

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to write session manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// The local start/stop transition the bridge triggers
#[async_trait]
pub trait Recorder: Send {
    /// Begin recording. `store_path` is the directory requested by the
    /// controller, if it set one.
    async fn start(&mut self, store_path: Option<String>) -> Result<(), RecorderError>;

    async fn stop(&mut self) -> Result<(), RecorderError>;
}

/// Current time in milliseconds since the Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Manifest written into every session directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionManifest {
    pub started_at_ms: u64,
    pub stopped_at_ms: Option<u64>,
    pub requested_path: Option<String>,
}

/// Records each session into its own timestamped directory.
///
/// Sessions go under the controller-supplied path when one is set, otherwise
/// under `default_dir`. The manifest is the only file it owns; the sample
/// writer is expected to fill the directory.
pub struct SessionRecorder {
    default_dir: PathBuf,
    active: Option<(PathBuf, SessionManifest)>,
}

impl SessionRecorder {
    pub fn new(default_dir: impl Into<PathBuf>) -> Self {
        Self {
            default_dir: default_dir.into(),
            active: None,
        }
    }

    /// Directory of the session in progress
    pub fn session_dir(&self) -> Option<&Path> {
        self.active.as_ref().map(|(dir, _)| dir.as_path())
    }

    async fn write_manifest(dir: &Path, manifest: &SessionManifest) -> Result<(), RecorderError> {
        let bytes = serde_json::to_vec_pretty(manifest)?;
        tokio::fs::write(dir.join("session.json"), bytes).await?;
        Ok(())
    }
}

#[async_trait]
impl Recorder for SessionRecorder {
    async fn start(&mut self, store_path: Option<String>) -> Result<(), RecorderError> {
        if let Some((dir, _)) = &self.active {
            return Err(RecorderError::Other(format!(
                "session already active in {}",
                dir.display()
            )));
        }

        let base = store_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.default_dir.clone());
        let started_at_ms = now_ms();
        let dir = base.join(format!("session_{}", started_at_ms));
        tokio::fs::create_dir_all(&dir).await?;

        let manifest = SessionManifest {
            started_at_ms,
            stopped_at_ms: None,
            requested_path: store_path,
        };
        Self::write_manifest(&dir, &manifest).await?;

        info!("Recording session started in {}", dir.display());
        self.active = Some((dir, manifest));
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RecorderError> {
        let Some((dir, mut manifest)) = self.active.take() else {
            return Ok(());
        };
        manifest.stopped_at_ms = Some(now_ms());
        Self::write_manifest(&dir, &manifest).await?;
        info!("Recording session in {} stopped", dir.display());
        Ok(())
    }
}
