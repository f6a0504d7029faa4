//! Error types for the download module.
//!
//! Every failure that happens during an active transfer is converted into the
//! terminal `Failed` status using the display string of one of these errors.
//! Callers never see the variants of a running download directly; they are
//! surfaced as structured errors only from validation at registry entry.

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::PlatformError;

/// Errors that can occur while starting, running or finalizing a download.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The native download service reported a failure or a bridge call threw.
    #[error("native download backend error: {message}")]
    NativeBackend {
        /// Message reported by the native service.
        message: String,
    },

    /// Local file system error (create directory, write, move, delete).
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The operation was aborted because the download was disposed.
    #[error("download cancelled")]
    Cancelled,

    /// The provided URL is malformed or not absolute.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The destination path cannot be used for a download.
    #[error("invalid destination {path}: {reason}")]
    InvalidDestination {
        /// The rejected destination path.
        path: PathBuf,
        /// Why the path was rejected.
        reason: &'static str,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a native backend error.
    pub fn native(message: impl Into<String>) -> Self {
        Self::NativeBackend {
            message: message.into(),
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an invalid destination error.
    pub fn invalid_destination(path: impl Into<PathBuf>, reason: &'static str) -> Self {
        Self::InvalidDestination {
            path: path.into(),
            reason,
        }
    }

    /// Returns true when the error is the expected result of disposal.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<PlatformError> for DownloadError {
    fn from(error: PlatformError) -> Self {
        Self::native(error.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://example.com/file.bin");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://example.com/file.bin"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://example.com/file.bin", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(
            msg.contains("https://example.com/file.bin"),
            "Expected URL in: {msg}"
        );
    }

    #[test]
    fn test_download_error_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = DownloadError::io(PathBuf::from("/tmp/test.bin"), io_error);
        let msg = error.to_string();
        assert!(msg.contains("/tmp/test.bin"), "Expected path in: {msg}");
        assert!(msg.contains("access denied"), "Expected cause in: {msg}");
    }

    #[test]
    fn test_download_error_from_platform_error_keeps_message() {
        let error: DownloadError = PlatformError::new("start", "quota exceeded").into();
        let msg = error.to_string();
        assert!(matches!(error, DownloadError::NativeBackend { .. }));
        assert!(msg.contains("quota exceeded"), "Expected cause in: {msg}");
        assert!(msg.contains("start"), "Expected operation in: {msg}");
    }

    #[test]
    fn test_download_error_cancelled_is_cancelled() {
        assert!(DownloadError::Cancelled.is_cancelled());
        assert!(!DownloadError::native("boom").is_cancelled());
    }

    #[test]
    fn test_download_error_invalid_destination_display() {
        let error = DownloadError::invalid_destination("../escape.bin", "must stay inside the storage root");
        let msg = error.to_string();
        assert!(msg.contains("../escape.bin"), "Expected path in: {msg}");
        assert!(msg.contains("storage root"), "Expected reason in: {msg}");
    }
}
