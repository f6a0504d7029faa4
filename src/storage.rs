//! Application-private storage root and the path conventions built on it.
//!
//! Destinations are always stored relative to the root. The native service
//! only knows absolute `file://` URIs of the temp file, so recovery after a
//! restart maps such a URI back to the relative destination here.

use std::path::{Path, PathBuf};

use url::Url;

use crate::download::{DownloadError, TEMP_FILE_SUFFIX};

/// Returns `path` with the temp-file suffix appended.
#[must_use]
pub fn temp_path_for(path: &Path) -> PathBuf {
    let mut raw = path.as_os_str().to_os_string();
    raw.push(TEMP_FILE_SUFFIX);
    PathBuf::from(raw)
}

/// The directory every download destination is relative to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageRoot {
    root: PathBuf,
}

impl StorageRoot {
    /// Creates a storage root, making relative paths absolute against the
    /// current directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    /// Absolute path of the root.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Joins a relative destination onto the root.
    #[must_use]
    pub fn resolve(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    /// `file://` URI of the temp file for `relative`, as handed to the
    /// native service.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidDestination`] if the resolved path
    /// cannot be expressed as a file URI.
    pub fn destination_uri(&self, relative: &Path) -> Result<String, DownloadError> {
        let temp = self.resolve(&temp_path_for(relative));
        Url::from_file_path(&temp)
            .map(String::from)
            .map_err(|()| DownloadError::invalid_destination(temp, "not representable as a file URI"))
    }

    /// Recovers `(relative destination, absolute temp path)` from a
    /// destination URI reported by the native service.
    ///
    /// The URI must point inside this root and end with the temp suffix;
    /// anything else is rejected rather than guessed at.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidDestination`] when the URI is not a
    /// file URI under the root or lacks the temp suffix.
    pub fn locate_destination_uri(&self, uri: &str) -> Result<(PathBuf, PathBuf), DownloadError> {
        let temp = match Url::parse(uri) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map_err(|()| DownloadError::invalid_destination(uri, "not a local file URI"))?,
            Ok(_) => {
                return Err(DownloadError::invalid_destination(uri, "not a file URI"));
            }
            Err(_) => PathBuf::from(uri),
        };

        let relative_temp = temp
            .strip_prefix(&self.root)
            .map_err(|_| DownloadError::invalid_destination(&temp, "outside the storage root"))?;
        let relative_temp = relative_temp
            .to_str()
            .ok_or_else(|| DownloadError::invalid_destination(&temp, "path is not valid UTF-8"))?;
        let relative = relative_temp
            .strip_suffix(TEMP_FILE_SUFFIX)
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| DownloadError::invalid_destination(&temp, "missing temp-file suffix"))?;

        Ok((PathBuf::from(relative), temp))
    }
}
