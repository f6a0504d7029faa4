//! The download handle shared between callers, backends and the completion
//! dispatcher.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::state::{DownloadState, StateSnapshot, clamp_progress};
use super::{DownloadConfig, DownloadStatus};
use crate::backend::BackendId;

/// Backend-side half of a download.
///
/// Each backend variant supplies one implementation; the [`Download`] only
/// sees this interface.
#[async_trait]
pub(crate) trait TransferJob: Send + Sync + fmt::Debug {
    /// Identifier assigned by the native service, if any.
    fn backend_id(&self) -> Option<BackendId>;

    /// Live progress, or `None` to fall back to the last recorded value.
    fn progress(&self) -> Option<f32>;

    /// Polls the backend for completion and settles the state if finished.
    async fn check_finished(&self, cancel: &CancellationToken);

    /// Releases the backend-side resource. Never fails.
    async fn release(&self);
}

/// Job with no backend-side resource, used when a start never reached the
/// backend.
#[derive(Debug, Default)]
pub(crate) struct DetachedJob;

#[async_trait]
impl TransferJob for DetachedJob {
    fn backend_id(&self) -> Option<BackendId> {
        None
    }

    fn progress(&self) -> Option<f32> {
        None
    }

    async fn check_finished(&self, _cancel: &CancellationToken) {}

    async fn release(&self) {}
}

/// Serializable overview of a download, for listings and CLI output.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadSummary {
    /// Source URL.
    pub url: String,
    /// Destination relative to the storage root.
    pub destination_path: PathBuf,
    /// Current status.
    pub status: DownloadStatus,
    /// Failure message when failed.
    pub error: Option<String>,
    /// Progress in `[0, 1]`.
    pub progress: f32,
    /// Native service identifier, absent for direct downloads.
    pub backend_id: Option<BackendId>,
}

/// A single download, from start (or recovery) until disposal.
///
/// Handles are shared as `Arc<Download>`. Status only moves from
/// `Downloading` to `Done` or `Failed`, once.
pub struct Download {
    config: DownloadConfig,
    final_path: PathBuf,
    temp_path: PathBuf,
    state: Arc<DownloadState>,
    cancel: CancellationToken,
    job: Box<dyn TransferJob>,
    disposed: AtomicBool,
}

impl fmt::Debug for Download {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Download")
            .field("url", &self.config.url.as_str())
            .field("destination_path", &self.config.destination_path)
            .field("status", &self.status())
            .field("backend_id", &self.backend_id())
            .finish_non_exhaustive()
    }
}

impl Download {
    pub(crate) fn new(
        config: DownloadConfig,
        final_path: PathBuf,
        temp_path: PathBuf,
        state: Arc<DownloadState>,
        cancel: CancellationToken,
        job: Box<dyn TransferJob>,
    ) -> Self {
        Self {
            config,
            final_path,
            temp_path,
            state,
            cancel,
            job,
            disposed: AtomicBool::new(false),
        }
    }

    /// The configuration this download was started (or recovered) with.
    #[must_use]
    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// Destination relative to the storage root; the registry key.
    #[must_use]
    pub fn destination_path(&self) -> &Path {
        &self.config.destination_path
    }

    /// Absolute path the finished file ends up at.
    #[must_use]
    pub fn final_path(&self) -> &Path {
        &self.final_path
    }

    /// Absolute path of the in-progress file.
    #[must_use]
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Identifier assigned by the native service, absent for direct downloads.
    #[must_use]
    pub fn backend_id(&self) -> Option<BackendId> {
        self.job.backend_id()
    }

    #[must_use]
    pub fn status(&self) -> DownloadStatus {
        self.state.status()
    }

    /// Failure message; only present once the status is `Failed`.
    #[must_use]
    pub fn error(&self) -> Option<String> {
        self.state.snapshot().error
    }

    /// True while the download is still `Downloading`.
    #[must_use]
    pub fn keep_waiting(&self) -> bool {
        self.state.is_downloading()
    }

    /// Advisory progress in `[0, 1]`.
    ///
    /// `Done` always reports 1.0 and `Failed` the last value seen before the
    /// failure.
    #[must_use]
    pub fn progress(&self) -> f32 {
        let snapshot = self.state.snapshot();
        match snapshot.status {
            DownloadStatus::Done => 1.0,
            DownloadStatus::Failed => snapshot.progress,
            DownloadStatus::Downloading => match self.job.progress() {
                Some(live) => {
                    let live = clamp_progress(live);
                    self.state.record_progress(live);
                    live
                }
                None => snapshot.progress,
            },
        }
    }

    /// Current state without querying the backend.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        self.state.snapshot()
    }

    #[must_use]
    pub fn summary(&self) -> DownloadSummary {
        let progress = self.progress();
        let snapshot = self.state.snapshot();
        DownloadSummary {
            url: self.config.url.to_string(),
            destination_path: self.config.destination_path.clone(),
            status: snapshot.status,
            error: snapshot.error,
            progress,
            backend_id: self.backend_id(),
        }
    }

    /// Waits until the download reaches `Done` or `Failed`.
    pub async fn wait(&self) -> DownloadStatus {
        self.state.wait_terminal().await
    }

    /// Asks the backend whether the transfer finished and settles the
    /// status if so. A no-op once the download is terminal.
    #[instrument(skip(self), fields(destination = %self.config.destination_path.display()))]
    pub async fn check_finished(&self) {
        if !self.state.is_downloading() {
            return;
        }
        self.job.check_finished(&self.cancel).await;
    }

    /// Cancels any in-flight work and removes the backend-side job.
    ///
    /// Best-effort and idempotent: removal errors are swallowed and a second
    /// call does nothing.
    #[instrument(skip(self), fields(destination = %self.config.destination_path.display()))]
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.cancel.cancel();
        self.job.release().await;
        debug!(status = %self.status(), "download disposed");
    }

    /// Returns true once [`dispose`](Self::dispose) has been called.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}
