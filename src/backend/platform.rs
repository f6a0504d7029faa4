//! Interface of the platform-provided persistent download service.
//!
//! The service runs transfers outside this process and survives its death.
//! Its calls are synchronous and must never run concurrently; the
//! [`NativeBackend`](super::NativeBackend) enforces that through the
//! [`NativeCallGate`](super::NativeCallGate). Implementations bind to the
//! actual platform (and hold whatever platform context `start` and
//! `recreate` need).

use std::sync::Arc;

use thiserror::Error;

/// Identifier the native service assigns to a job.
pub type BackendId = i64;

/// Callback the service invokes, with no arguments, whenever any job
/// finishes. It may be called from any thread.
pub type CompletionCallback = Arc<dyn Fn() + Send + Sync>;

/// Tri-state completion result of a native job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishState {
    /// Still transferring.
    Pending,
    /// Finished successfully; the temp file holds the content.
    Success,
    /// Finished with an error; see [`PlatformJob::error`].
    Failure,
}

impl FinishState {
    /// Maps the service's integer convention: `1` success, negative failure,
    /// anything else pending.
    #[must_use]
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => Self::Success,
            c if c < 0 => Self::Failure,
            _ => Self::Pending,
        }
    }
}

/// A failed call into the native service.
#[derive(Debug, Error)]
#[error("{operation} failed: {message}")]
pub struct PlatformError {
    /// Name of the service call that failed.
    pub operation: &'static str,
    /// Message reported by the service.
    pub message: String,
}

impl PlatformError {
    /// Creates a platform error for `operation`.
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Entry points of the native download service.
pub trait PlatformDownloadService: Send + Sync {
    /// Creates a job downloading `url` into the file at `destination_uri`.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the service rejects the job.
    fn create(&self, url: &str, destination_uri: &str)
    -> Result<Arc<dyn PlatformJob>, PlatformError>;

    /// Re-attaches to a job started by an earlier process.
    ///
    /// Returns `Ok(None)` when the service no longer knows `id`.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the lookup itself fails.
    fn recreate(&self, id: BackendId) -> Result<Option<Arc<dyn PlatformJob>>, PlatformError>;

    /// Installs the process-wide completion callback, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns a [`PlatformError`] if the callback cannot be registered.
    fn set_completion_callback(&self, callback: CompletionCallback) -> Result<(), PlatformError>;
}

/// One job inside the native download service.
#[allow(clippy::missing_errors_doc)]
pub trait PlatformJob: Send + Sync {
    fn set_allow_metered(&self, allow: bool) -> Result<(), PlatformError>;

    fn set_allow_roaming(&self, allow: bool) -> Result<(), PlatformError>;

    /// Adds one header entry; repeated names produce repeated entries.
    fn add_request_header(&self, name: &str, value: &str) -> Result<(), PlatformError>;

    /// Starts the transfer and returns its identifier.
    fn start(&self) -> Result<BackendId, PlatformError>;

    fn download_url(&self) -> Result<String, PlatformError>;

    /// URI of the file the service writes into.
    fn destination_uri(&self) -> Result<String, PlatformError>;

    fn check_finished(&self) -> Result<FinishState, PlatformError>;

    /// Failure description, meaningful after [`FinishState::Failure`].
    fn error(&self) -> Result<String, PlatformError>;

    /// Progress in `[0, 1]`. Expected to be cheap.
    fn progress(&self) -> Result<f32, PlatformError>;

    /// Discards the job and the service's bookkeeping for it.
    fn remove(&self) -> Result<(), PlatformError>;
}
