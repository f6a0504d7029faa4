//! Process-wide serialization of calls into the native download service.
//!
//! The native service is not reentrant: across the whole process at most one
//! call may be executing at a time, whichever download it belongs to. Every
//! call goes through a [`NativeCallGate`], a single-permit FIFO semaphore.
//!
//! Calls run on Tokio's blocking pool. The permit is moved into the blocking
//! closure, so it is released exactly when the native call returns, on every
//! path. A caller that is cancelled stops waiting immediately, but the gate
//! stays closed until the abandoned call has actually finished.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock};

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::download::DownloadError;

static GLOBAL_GATE: LazyLock<NativeCallGate> = LazyLock::new(NativeCallGate::new);

/// Mutual exclusion for native service calls.
///
/// Clones share the same permit.
#[derive(Debug, Clone)]
pub struct NativeCallGate {
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for NativeCallGate {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeCallGate {
    /// Creates an independent gate.
    ///
    /// Production code should use [`global`](Self::global); separate gates
    /// are only sound when they guard separate service instances.
    #[must_use]
    pub fn new() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(1)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// The gate shared by the whole process.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL_GATE.clone()
    }

    /// Highest number of calls ever observed executing at once (0 or 1).
    #[must_use]
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Runs `op` on the blocking pool once the gate is free.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Cancelled`] if `cancel` fires while waiting
    /// for the gate or for the call, a native backend error if the call
    /// panicked, or whatever `op` returns.
    pub async fn run<T, F>(&self, cancel: &CancellationToken, op: F) -> Result<T, DownloadError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<T, DownloadError> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(DownloadError::Cancelled),
            acquired = Arc::clone(&self.permits).acquire_owned() => {
                acquired.map_err(|_| DownloadError::native("native call gate closed"))?
            }
        };

        let in_flight = Arc::clone(&self.in_flight);
        let peak = Arc::clone(&self.peak);
        let worker = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let _call = InFlightCall::enter(&in_flight, &peak);
            op()
        });

        tokio::select! {
            biased;
            joined = worker => joined.unwrap_or_else(|error| {
                Err(DownloadError::native(format!("native call panicked: {error}")))
            }),
            () = cancel.cancelled() => Err(DownloadError::Cancelled),
        }
    }

    /// Runs `op` inline if the gate is free right now, without waiting.
    ///
    /// Meant for cheap reads that have a cached fallback.
    pub fn try_run<T>(&self, op: impl FnOnce() -> T) -> Option<T> {
        let _permit = self.permits.try_acquire().ok()?;
        let _call = InFlightCall::enter(&self.in_flight, &self.peak);
        Some(op())
    }
}

struct InFlightCall<'a> {
    in_flight: &'a AtomicUsize,
}

impl<'a> InFlightCall<'a> {
    fn enter(in_flight: &'a AtomicUsize, peak: &AtomicUsize) -> Self {
        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self { in_flight }
    }
}

impl Drop for InFlightCall<'_> {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
