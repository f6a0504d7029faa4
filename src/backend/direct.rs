//! Direct fallback backend: an ordinary in-process HTTP download.
//!
//! Used when no platform download service is available. The transfer lives
//! and dies with this process, so there is nothing to persist or recover.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{BackendId, BackendKind, DownloadBackend, HttpClient};
use crate::download::{Download, DownloadConfig, DownloadError, DownloadState, TransferJob};
use crate::storage::StorageRoot;

/// Backend that fetches over HTTP inside this process.
#[derive(Debug, Clone)]
pub struct DirectBackend {
    client: HttpClient,
    storage: StorageRoot,
}

impl DirectBackend {
    /// Creates a direct backend writing under `storage`.
    #[must_use]
    pub fn new(client: HttpClient, storage: StorageRoot) -> Self {
        Self { client, storage }
    }
}

#[async_trait]
impl DownloadBackend for DirectBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Direct
    }

    fn is_persistent(&self) -> bool {
        false
    }

    #[instrument(skip(self, config), fields(url = %config.url, destination = %config.destination_path.display()))]
    async fn start(&self, config: DownloadConfig) -> Arc<Download> {
        let final_path = self.storage.resolve(&config.destination_path);
        let temp_path = self.storage.resolve(&config.temp_path());
        let state = Arc::new(DownloadState::downloading());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(run_transfer(
            self.client.clone(),
            config.clone(),
            final_path.clone(),
            Arc::clone(&state),
            cancel.clone(),
        ));
        debug!("direct download started");

        Arc::new(Download::new(
            config,
            final_path,
            temp_path,
            state,
            cancel,
            Box::new(DirectJob {
                task: Mutex::new(Some(task)),
            }),
        ))
    }

    async fn recreate(&self, _id: BackendId) -> Option<Arc<Download>> {
        None
    }

    async fn poll_all(&self) {}
}

/// The spawned transfer task; settles the state inline.
#[derive(Debug)]
struct DirectJob {
    task: Mutex<Option<JoinHandle<()>>>,
}

#[async_trait]
impl TransferJob for DirectJob {
    fn backend_id(&self) -> Option<BackendId> {
        None
    }

    fn progress(&self) -> Option<f32> {
        None
    }

    async fn check_finished(&self, _cancel: &CancellationToken) {}

    async fn release(&self) {
        let task = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            // The token is already cancelled, so this returns promptly and
            // guarantees nothing is written after disposal completes.
            if let Err(error) = task.await {
                debug!(error = %error, "direct transfer task ended abnormally");
            }
        }
    }
}

async fn run_transfer(
    client: HttpClient,
    config: DownloadConfig,
    final_path: PathBuf,
    state: Arc<DownloadState>,
    cancel: CancellationToken,
) {
    let fetched = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(DownloadError::Cancelled),
        body = client.fetch(&config.url, &config.request_headers, |progress| {
            state.record_progress(progress);
        }) => body,
    };

    let body = match fetched {
        Ok(body) if !cancel.is_cancelled() => body,
        Ok(_) => {
            settle_failed(&state, &config, &DownloadError::Cancelled);
            return;
        }
        Err(error) => {
            settle_failed(&state, &config, &error);
            return;
        }
    };

    match write_body(&final_path, &body).await {
        Ok(()) => {
            if state.mark_done() {
                info!(
                    url = %config.url,
                    path = %final_path.display(),
                    bytes = body.len(),
                    "download complete"
                );
            }
        }
        Err(error) => settle_failed(&state, &config, &error),
    }
}

fn settle_failed(state: &DownloadState, config: &DownloadConfig, error: &DownloadError) {
    if error.is_cancelled() {
        debug!(url = %config.url, "direct download cancelled");
    } else {
        warn!(url = %config.url, error = %error, "direct download failed");
    }
    state.mark_failed(error.to_string());
}

async fn write_body(final_path: &Path, body: &[u8]) -> Result<(), DownloadError> {
    if let Some(parent) = final_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::io(parent, e))?;
    }
    tokio::fs::write(final_path, body)
        .await
        .map_err(|e| DownloadError::io(final_path, e))
}
