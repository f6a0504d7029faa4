//! Adapter over the platform's persistent download service.
//!
//! Every call into the service goes through the process-wide
//! [`NativeCallGate`] and runs on the blocking pool. Completion is pushed by
//! the service as an anonymous "some job finished" signal; a dispatcher task
//! reacts by checking every tracked download that is still in progress.
//!
//! # Finalization
//!
//! The service writes into `<destination>.part`. When a job reports success
//! the temp file is moved over the destination (replacing any old file) and
//! only then is the download marked `Done`. A missing temp file is not an
//! error: the move is skipped and the download still completes.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::platform::{BackendId, FinishState, PlatformDownloadService, PlatformJob};
use super::{BackendKind, DownloadBackend, NativeCallGate};
use crate::download::{
    DetachedJob, Download, DownloadConfig, DownloadError, DownloadState, TransferJob,
};
use crate::storage::StorageRoot;

type Tracked = DashMap<BackendId, Weak<Download>>;

/// Backend that delegates transfers to a [`PlatformDownloadService`].
pub struct NativeBackend {
    service: Arc<dyn PlatformDownloadService>,
    storage: StorageRoot,
    gate: NativeCallGate,
    tracked: Arc<Tracked>,
    dispatcher: JoinHandle<()>,
}

impl std::fmt::Debug for NativeBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeBackend")
            .field("storage", &self.storage)
            .field("tracked", &self.tracked.len())
            .finish_non_exhaustive()
    }
}

impl Drop for NativeBackend {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

impl NativeBackend {
    /// Creates the adapter using the process-wide call gate and registers
    /// the completion callback with the service.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NativeBackend`] if the service refuses the
    /// completion callback.
    pub async fn new(
        service: Arc<dyn PlatformDownloadService>,
        storage: StorageRoot,
    ) -> Result<Self, DownloadError> {
        Self::with_gate(service, storage, NativeCallGate::global()).await
    }

    /// Like [`new`](Self::new) with an explicit gate.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::NativeBackend`] if the service refuses the
    /// completion callback.
    pub async fn with_gate(
        service: Arc<dyn PlatformDownloadService>,
        storage: StorageRoot,
        gate: NativeCallGate,
    ) -> Result<Self, DownloadError> {
        let wake = Arc::new(Notify::new());
        let tracked: Arc<Tracked> = Arc::new(DashMap::new());

        let callback_wake = Arc::clone(&wake);
        let callback_service = Arc::clone(&service);
        gate.run(&CancellationToken::new(), move || {
            // Runs on whatever thread the service picks: only signal.
            callback_service
                .set_completion_callback(Arc::new(move || callback_wake.notify_one()))
                .map_err(DownloadError::from)
        })
        .await?;

        let dispatcher = tokio::spawn(dispatch_completions(wake, Arc::clone(&tracked)));
        debug!(root = %storage.path().display(), "native download backend ready");

        Ok(Self {
            service,
            storage,
            gate,
            tracked,
            dispatcher,
        })
    }

    /// Number of live downloads the completion dispatcher watches.
    #[must_use]
    pub fn tracked_count(&self) -> usize {
        self.tracked
            .iter()
            .filter(|entry| entry.value().strong_count() > 0)
            .count()
    }

    fn track(&self, id: BackendId, download: &Arc<Download>) {
        self.tracked.insert(id, Arc::downgrade(download));
    }

    fn attach(
        &self,
        id: BackendId,
        handle: Arc<dyn PlatformJob>,
        config: DownloadConfig,
        final_path: PathBuf,
        temp_path: PathBuf,
    ) -> Arc<Download> {
        let state = Arc::new(DownloadState::downloading());
        let job = NativeJob {
            id,
            handle,
            gate: self.gate.clone(),
            state: Arc::clone(&state),
            final_path: final_path.clone(),
            temp_path: temp_path.clone(),
            tracked: Arc::downgrade(&self.tracked),
        };
        let download = Arc::new(Download::new(
            config,
            final_path,
            temp_path,
            state,
            CancellationToken::new(),
            Box::new(job),
        ));
        self.track(id, &download);
        download
    }
}

#[async_trait]
impl DownloadBackend for NativeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Native
    }

    fn is_persistent(&self) -> bool {
        true
    }

    #[instrument(skip(self, config), fields(url = %config.url, destination = %config.destination_path.display()))]
    async fn start(&self, config: DownloadConfig) -> Arc<Download> {
        let final_path = self.storage.resolve(&config.destination_path);
        let temp_path = self.storage.resolve(&config.temp_path());

        match self.start_job(&config, &final_path, &temp_path).await {
            Ok((id, handle)) => {
                info!(backend_id = id, "native download started");
                self.attach(id, handle, config, final_path, temp_path)
            }
            Err(error) => {
                warn!(error = %error, "native download could not be started");
                let state = Arc::new(DownloadState::downloading());
                state.mark_failed(error.to_string());
                Arc::new(Download::new(
                    config,
                    final_path,
                    temp_path,
                    state,
                    CancellationToken::new(),
                    Box::new(DetachedJob),
                ))
            }
        }
    }

    #[instrument(skip(self))]
    async fn recreate(&self, id: BackendId) -> Option<Arc<Download>> {
        let service = Arc::clone(&self.service);
        let attached = self
            .gate
            .run(&CancellationToken::new(), move || {
                let Some(handle) = service.recreate(id)? else {
                    return Ok(None);
                };
                let url = handle.download_url()?;
                let destination_uri = handle.destination_uri()?;
                Ok(Some((handle, url, destination_uri)))
            })
            .await;

        let (handle, url, destination_uri) = match attached {
            Ok(Some(found)) => found,
            Ok(None) => {
                warn!("native service no longer knows this download; dropping it");
                return None;
            }
            Err(error) => {
                warn!(error = %error, "failed to recreate native download; dropping it");
                return None;
            }
        };

        let url = match Url::parse(&url) {
            Ok(url) => url,
            Err(error) => {
                warn!(url = %url, error = %error, "recovered download has an invalid URL; dropping it");
                return None;
            }
        };
        let (relative, temp_path) = match self.storage.locate_destination_uri(&destination_uri) {
            Ok(located) => located,
            Err(error) => {
                warn!(uri = %destination_uri, error = %error, "recovered download has an unusable destination; dropping it");
                return None;
            }
        };

        let final_path = self.storage.resolve(&relative);
        let download = self.attach(
            id,
            handle,
            DownloadConfig::new(url, relative),
            final_path,
            temp_path,
        );
        debug!(destination = %download.destination_path().display(), "native download recreated");

        // The job may have finished while no process was running.
        download.check_finished().await;
        Some(download)
    }

    async fn poll_all(&self) {
        for download in pending_downloads(&self.tracked) {
            download.check_finished().await;
        }
    }
}

impl NativeBackend {
    async fn start_job(
        &self,
        config: &DownloadConfig,
        final_path: &Path,
        temp_path: &Path,
    ) -> Result<(BackendId, Arc<dyn PlatformJob>), DownloadError> {
        let url = config.url.to_string();
        let destination_uri = self.storage.destination_uri(&config.destination_path)?;
        let flags = config.policy.network_flags();
        let headers: Vec<(String, String)> = config
            .request_headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        let service = Arc::clone(&self.service);
        let final_path = final_path.to_path_buf();
        let temp_path = temp_path.to_path_buf();

        self.gate
            .run(&CancellationToken::new(), move || {
                prepare_clean_start(&final_path, &temp_path)?;

                let handle = service.create(&url, &destination_uri)?;
                handle.set_allow_metered(flags.allow_metered)?;
                handle.set_allow_roaming(flags.allow_roaming)?;
                for (name, value) in &headers {
                    handle.add_request_header(name, value)?;
                }
                let id = handle.start()?;
                Ok((id, handle))
            })
            .await
    }
}

/// Backend-side half of a native download.
struct NativeJob {
    id: BackendId,
    handle: Arc<dyn PlatformJob>,
    gate: NativeCallGate,
    state: Arc<DownloadState>,
    final_path: PathBuf,
    temp_path: PathBuf,
    tracked: Weak<Tracked>,
}

impl std::fmt::Debug for NativeJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeJob")
            .field("id", &self.id)
            .field("temp_path", &self.temp_path)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TransferJob for NativeJob {
    fn backend_id(&self) -> Option<BackendId> {
        Some(self.id)
    }

    fn progress(&self) -> Option<f32> {
        // Never wait here: if another native call is running, report the
        // last known value instead.
        self.gate
            .try_run(|| self.handle.progress())
            .and_then(Result::ok)
    }

    async fn check_finished(&self, cancel: &CancellationToken) {
        let handle = Arc::clone(&self.handle);
        let state = Arc::clone(&self.state);
        let final_path = self.final_path.clone();
        let temp_path = self.temp_path.clone();
        let id = self.id;

        let outcome = self
            .gate
            .run(cancel, move || {
                // Another check may have settled it while this one queued.
                if !state.is_downloading() {
                    return Ok(());
                }
                match handle.check_finished()? {
                    FinishState::Pending => {}
                    FinishState::Success => match finalize(&temp_path, &final_path) {
                        Ok(moved) => {
                            state.mark_done();
                            info!(backend_id = id, moved, path = %final_path.display(), "download complete");
                        }
                        Err(error) => {
                            warn!(backend_id = id, error = %error, "failed to move finished download into place");
                            state.mark_failed(error.to_string());
                        }
                    },
                    FinishState::Failure => {
                        let message = handle.error().unwrap_or_else(|error| error.to_string());
                        warn!(backend_id = id, error = %message, "native download failed");
                        state.mark_failed(message);
                    }
                }
                Ok(())
            })
            .await;

        match outcome {
            Ok(()) => {}
            Err(DownloadError::Cancelled) => {
                debug!(backend_id = id, "completion check cancelled");
            }
            Err(error) => {
                warn!(backend_id = id, error = %error, "completion check failed");
                self.state.mark_failed(error.to_string());
            }
        }
    }

    async fn release(&self) {
        if let Some(tracked) = self.tracked.upgrade() {
            tracked.remove(&self.id);
        }
        let handle = Arc::clone(&self.handle);
        // The download's own token is already cancelled; removal must still run.
        let removed = self
            .gate
            .run(&CancellationToken::new(), move || {
                handle.remove().map_err(DownloadError::from)
            })
            .await;
        if let Err(error) = removed {
            debug!(backend_id = self.id, error = %error, "ignoring native remove failure");
        }
    }
}

/// Listens for completion signals and checks every pending download.
async fn dispatch_completions(wake: Arc<Notify>, tracked: Arc<Tracked>) {
    loop {
        wake.notified().await;
        let pending = pending_downloads(&tracked);
        debug!(pending = pending.len(), "completion signal received");
        for download in pending {
            download.check_finished().await;
        }
    }
}

/// Live downloads still in progress; prunes entries whose download is gone.
fn pending_downloads(tracked: &Tracked) -> Vec<Arc<Download>> {
    tracked.retain(|_, download| download.strong_count() > 0);
    tracked
        .iter()
        .filter_map(|entry| entry.value().upgrade())
        .filter(|download| download.keep_waiting())
        .collect()
}

/// Removes leftovers from earlier attempts so the service starts clean.
fn prepare_clean_start(final_path: &Path, temp_path: &Path) -> Result<(), DownloadError> {
    remove_if_exists(final_path)?;
    remove_if_exists(temp_path)?;
    if let Some(parent) = temp_path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| DownloadError::io(parent, e))?;
    }
    Ok(())
}

/// Moves the temp file over the final path. Returns whether a move happened.
fn finalize(temp_path: &Path, final_path: &Path) -> Result<bool, DownloadError> {
    match temp_path.try_exists() {
        Ok(true) => {}
        Ok(false) => return Ok(false),
        Err(e) => return Err(DownloadError::io(temp_path, e)),
    }
    remove_if_exists(final_path)?;
    std::fs::rename(temp_path, final_path).map_err(|e| DownloadError::io(final_path, e))?;
    Ok(true)
}

fn remove_if_exists(path: &Path) -> Result<(), DownloadError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::io(path, e)),
    }
}
