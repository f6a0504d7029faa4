//! Transfer backends.
//!
//! A [`DownloadBackend`] is chosen once, when the registry is built:
//!
//! - [`NativeBackend`] - adapter over a [`PlatformDownloadService`] that keeps
//!   transferring after this process dies and can be re-attached by id
//! - [`DirectBackend`] - in-process HTTP fetch used when no platform service
//!   exists; nothing survives a restart
//!
//! Call sites never branch on the variant; they go through the trait.

mod direct;
mod gate;
mod http;
mod native;
mod platform;

pub use direct::DirectBackend;
pub use gate::NativeCallGate;
pub use http::HttpClient;
pub use native::NativeBackend;
pub use platform::{
    BackendId, CompletionCallback, FinishState, PlatformDownloadService, PlatformError,
    PlatformJob,
};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::download::{Download, DownloadConfig};

/// Which backend variant is in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Platform persistent download service.
    Native,
    /// In-process HTTP fetch.
    Direct,
}

impl BackendKind {
    /// Returns the string representation used in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Direct => "direct",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Capability interface implemented by both backend variants.
#[async_trait]
pub trait DownloadBackend: Send + Sync + fmt::Debug {
    /// The variant this backend implements.
    fn kind(&self) -> BackendKind;

    /// Whether downloads survive a restart and their ids should be persisted.
    fn is_persistent(&self) -> bool;

    /// Starts a transfer for an already validated `config`.
    ///
    /// Always returns a download: if the backend refuses the job, the
    /// download comes back already `Failed` with the reason.
    async fn start(&self, config: DownloadConfig) -> Arc<Download>;

    /// Re-attaches to a job started by an earlier process.
    ///
    /// Returns `None` when the job cannot be recovered; the caller drops it.
    async fn recreate(&self, id: BackendId) -> Option<Arc<Download>>;

    /// Runs a completion check on every tracked download still in progress.
    async fn poll_all(&self);
}
