//! The set of active downloads and its persistence across restarts.
//!
//! # Overview
//!
//! A [`DownloadRegistry`] owns every [`Download`] keyed by its destination
//! path. With a persistent backend the backend ids of all tracked downloads
//! are written to a line-delimited file under the storage root after every
//! change; on first access the file is read back, every id is re-attached
//! through the backend, and ids that can no longer be recovered are dropped
//! and the file rewritten.
//!
//! # Example
//!
//! ```ignore
//! use bgdl_core::{DownloadRegistry, RegistrySettings};
//!
//! let mut registry = DownloadRegistry::from_settings(&settings, Some(service)).await?;
//! for download in registry.downloads().await {
//!     println!("{} {}", download.destination_path().display(), download.status());
//! }
//! ```

mod persistence;

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::backend::{
    BackendKind, DirectBackend, DownloadBackend, HttpClient, NativeBackend,
    PlatformDownloadService,
};
use crate::download::{
    Download, DownloadConfig, DownloadError, PERSISTED_IDS_FILE_NAME, normalize_destination,
};
use crate::settings::RegistrySettings;
use crate::storage::StorageRoot;

use persistence::IdStore;

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Invalid request or backend construction failure.
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// A download for this destination is already tracked.
    #[error("a download to {path} is already tracked")]
    AlreadyPresent {
        /// The destination path.
        path: PathBuf,
    },

    /// The identifier file could not be written.
    #[error("failed to persist download ids to {path}: {source}")]
    Persist {
        /// The identifier file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

/// Tracks active downloads and persists their backend identifiers.
///
/// The registry is a single logical owner: methods take `&mut self` and
/// callers share it behind their own lock if needed. Downloads are loaded
/// lazily on first access.
#[derive(Debug)]
pub struct DownloadRegistry {
    backend: Arc<dyn DownloadBackend>,
    storage: StorageRoot,
    store: IdStore,
    downloads: Option<HashMap<PathBuf, Arc<Download>>>,
}

impl DownloadRegistry {
    /// Creates a registry over an already chosen backend.
    #[must_use]
    pub fn new(backend: Arc<dyn DownloadBackend>, storage: StorageRoot) -> Self {
        let store = IdStore::new(storage.path().join(PERSISTED_IDS_FILE_NAME));
        Self {
            backend,
            storage,
            store,
            downloads: None,
        }
    }

    /// Creates a registry from settings, using the native backend when a
    /// platform service is supplied and the direct HTTP backend otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Download`] if the platform service refuses
    /// the completion callback.
    pub async fn from_settings(
        settings: &RegistrySettings,
        service: Option<Arc<dyn PlatformDownloadService>>,
    ) -> Result<Self, RegistryError> {
        let storage = StorageRoot::new(&settings.storage_root);
        let backend: Arc<dyn DownloadBackend> = match service {
            Some(service) => Arc::new(NativeBackend::new(service, storage.clone()).await?),
            None => Arc::new(DirectBackend::new(
                HttpClient::new_with_timeouts(
                    settings.connect_timeout_secs,
                    settings.read_timeout_secs,
                ),
                storage.clone(),
            )),
        };
        info!(
            backend = %backend.kind(),
            root = %storage.path().display(),
            "download registry ready"
        );

        Ok(Self {
            backend,
            storage,
            store: IdStore::new(settings.persisted_ids_path()),
            downloads: None,
        })
    }

    /// The backend variant chosen at construction.
    #[must_use]
    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Location of the identifier file.
    #[must_use]
    pub fn persisted_ids_path(&self) -> &Path {
        self.store.path()
    }

    /// Reads the identifier file and re-attaches every id through the
    /// backend.
    ///
    /// Ids that cannot be recovered are dropped and the surviving set is
    /// written back immediately. Returns an empty map for a non-persistent
    /// backend.
    #[instrument(skip(self), fields(backend = %self.backend.kind()))]
    pub async fn load_all(&self) -> HashMap<PathBuf, Arc<Download>> {
        let mut downloads = HashMap::new();
        if !self.backend.is_persistent() {
            return downloads;
        }

        let ids = match self.store.read_ids().await {
            Ok(ids) => ids,
            Err(error) => {
                warn!(path = %self.store.path().display(), error = %error, "failed to read download ids");
                return downloads;
            }
        };

        let requested = ids.len();
        for id in ids {
            let Some(download) = self.backend.recreate(id).await else {
                continue;
            };
            match downloads.entry(download.destination_path().to_path_buf()) {
                Entry::Vacant(slot) => {
                    slot.insert(download);
                }
                Entry::Occupied(existing) => {
                    warn!(
                        backend_id = id,
                        destination = %existing.key().display(),
                        "duplicate recovered download for destination; removing it"
                    );
                    download.dispose().await;
                }
            }
        }

        info!(requested, recovered = downloads.len(), "recovered persisted downloads");
        if let Err(error) = self.save_all(downloads.values()).await {
            warn!(error = %error, "failed to rewrite download ids after recovery");
        }
        downloads
    }

    /// Writes the backend ids of `downloads`, replacing the file, or deletes
    /// it when there is nothing to record. Does nothing for a non-persistent
    /// backend.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Persist`] if the file cannot be written or
    /// removed.
    pub async fn save_all<'a>(
        &self,
        downloads: impl IntoIterator<Item = &'a Arc<Download>>,
    ) -> Result<(), RegistryError> {
        if !self.backend.is_persistent() {
            return Ok(());
        }
        let ids: Vec<_> = downloads
            .into_iter()
            .filter_map(|download| download.backend_id())
            .collect();
        self.store
            .write_ids(&ids)
            .await
            .map_err(|source| RegistryError::Persist {
                path: self.store.path().to_path_buf(),
                source,
            })
    }

    /// Starts a download and records it.
    ///
    /// The returned download may already be `Failed` if the backend refused
    /// the job. A persistence failure is logged, not returned: the download
    /// itself is running.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Download`] for an invalid URL or destination
    /// and [`RegistryError::AlreadyPresent`] if the destination is taken.
    #[instrument(skip(self, config), fields(url = %config.url, destination = %config.destination_path.display()))]
    pub async fn start(
        &mut self,
        mut config: DownloadConfig,
    ) -> Result<Arc<Download>, RegistryError> {
        // The field is public; configs built as literals skip `new`.
        config.destination_path = normalize_destination(&config.destination_path);
        config.validate()?;
        let final_path = self.storage.resolve(&config.destination_path);
        if tokio::fs::metadata(&final_path)
            .await
            .is_ok_and(|meta| meta.is_dir())
        {
            return Err(DownloadError::invalid_destination(
                config.destination_path,
                "destination is an existing directory",
            )
            .into());
        }

        let backend = Arc::clone(&self.backend);
        let downloads = self.ensure_loaded().await;
        if downloads.contains_key(&config.destination_path) {
            return Err(RegistryError::AlreadyPresent {
                path: config.destination_path,
            });
        }

        let download = backend.start(config).await;
        downloads.insert(
            download.destination_path().to_path_buf(),
            Arc::clone(&download),
        );
        self.persist_or_warn().await;
        Ok(download)
    }

    /// Starts a download of `url` into `destination` with the default
    /// policy and no extra headers.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start), plus an invalid URL.
    pub async fn start_url(
        &mut self,
        url: &str,
        destination: impl Into<PathBuf>,
    ) -> Result<Arc<Download>, RegistryError> {
        let config = DownloadConfig::parse(url, destination)?;
        self.start(config).await
    }

    /// All tracked downloads, in no particular order.
    pub async fn downloads(&mut self) -> Vec<Arc<Download>> {
        self.ensure_loaded().await.values().cloned().collect()
    }

    /// The download writing to `destination`, if tracked.
    pub async fn get(&mut self, destination: &Path) -> Option<Arc<Download>> {
        let key = normalize_destination(destination);
        self.ensure_loaded().await.get(&key).cloned()
    }

    /// Runs a completion check on every tracked download still in progress.
    pub async fn poll(&mut self) {
        self.ensure_loaded().await;
        self.backend.poll_all().await;
    }

    /// Disposes the download writing to `destination` and forgets it.
    ///
    /// Returns `false` when nothing was tracked for that path.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::Persist`] if the identifier file cannot be
    /// rewritten; the download is disposed regardless.
    #[instrument(skip(self), fields(destination = %destination.display()))]
    pub async fn dispose(&mut self, destination: &Path) -> Result<bool, RegistryError> {
        let key = normalize_destination(destination);
        let Some(download) = self.ensure_loaded().await.remove(&key) else {
            debug!("no tracked download to dispose");
            return Ok(false);
        };
        download.dispose().await;
        self.persist().await?;
        Ok(true)
    }

    async fn ensure_loaded(&mut self) -> &mut HashMap<PathBuf, Arc<Download>> {
        if self.downloads.is_none() {
            let loaded = self.load_all().await;
            self.downloads = Some(loaded);
        }
        self.downloads.get_or_insert_with(HashMap::new)
    }

    async fn persist(&self) -> Result<(), RegistryError> {
        match &self.downloads {
            Some(downloads) => self.save_all(downloads.values()).await,
            None => Ok(()),
        }
    }

    async fn persist_or_warn(&self) {
        if let Err(error) = self.persist().await {
            warn!(error = %error, "failed to persist download ids");
        }
    }
}
