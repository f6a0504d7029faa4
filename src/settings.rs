//! Settings used to build a [`DownloadRegistry`](crate::DownloadRegistry).

use std::path::{Path, PathBuf};

use crate::download::{CONNECT_TIMEOUT_SECS, PERSISTED_IDS_FILE_NAME, READ_TIMEOUT_SECS};

/// Construction settings for the registry and its backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistrySettings {
    /// Application-private directory all destinations are relative to.
    pub storage_root: PathBuf,
    /// Name of the identifier file inside the storage root.
    pub persisted_file_name: String,
    /// Connect timeout for the direct backend.
    pub connect_timeout_secs: u64,
    /// Whole-request timeout for the direct backend.
    pub read_timeout_secs: u64,
}

impl RegistrySettings {
    /// Settings with default file name and timeouts.
    #[must_use]
    pub fn new(storage_root: impl Into<PathBuf>) -> Self {
        Self {
            storage_root: storage_root.into(),
            persisted_file_name: PERSISTED_IDS_FILE_NAME.to_string(),
            connect_timeout_secs: CONNECT_TIMEOUT_SECS,
            read_timeout_secs: READ_TIMEOUT_SECS,
        }
    }

    #[must_use]
    pub fn with_timeouts(mut self, connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        self.connect_timeout_secs = connect_timeout_secs;
        self.read_timeout_secs = read_timeout_secs;
        self
    }

    #[must_use]
    pub fn with_persisted_file_name(mut self, name: impl Into<String>) -> Self {
        self.persisted_file_name = name.into();
        self
    }

    /// Full path of the identifier file.
    #[must_use]
    pub fn persisted_ids_path(&self) -> PathBuf {
        Path::new(&self.storage_root).join(&self.persisted_file_name)
    }
}
