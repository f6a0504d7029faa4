//! Download status and the terminal-once state machine.
//!
//! `Downloading` is the only non-terminal state. Transitions to `Done` or
//! `Failed` happen at most once; every later attempt is ignored. The state is
//! held in a `tokio::sync::watch` channel so waiters can be woken when the
//! download settles.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Status of a download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    /// Transfer in progress (initial state).
    Downloading,
    /// Transfer finished and the file is at its final path.
    Done,
    /// Transfer failed; an error message is available.
    Failed,
}

impl DownloadStatus {
    /// Returns the string representation used in logs and summaries.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Downloading => "downloading",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Downloading)
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Point-in-time view of a download's state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateSnapshot {
    /// Current status.
    pub status: DownloadStatus,
    /// Failure message, only set when `status` is `Failed`.
    pub error: Option<String>,
    /// Last known progress in `[0, 1]`.
    pub progress: f32,
}

#[derive(Debug)]
pub(crate) struct DownloadState {
    tx: watch::Sender<StateSnapshot>,
}

impl DownloadState {
    pub(crate) fn downloading() -> Self {
        let (tx, _rx) = watch::channel(StateSnapshot {
            status: DownloadStatus::Downloading,
            error: None,
            progress: 0.0,
        });
        Self { tx }
    }

    pub(crate) fn snapshot(&self) -> StateSnapshot {
        self.tx.borrow().clone()
    }

    pub(crate) fn status(&self) -> DownloadStatus {
        self.tx.borrow().status
    }

    pub(crate) fn is_downloading(&self) -> bool {
        self.status() == DownloadStatus::Downloading
    }

    /// Returns false when the download had already settled.
    pub(crate) fn mark_done(&self) -> bool {
        self.tx.send_if_modified(|state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = DownloadStatus::Done;
            state.progress = 1.0;
            true
        })
    }

    /// Returns false when the download had already settled.
    pub(crate) fn mark_failed(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.tx.send_if_modified(|state| {
            if state.status.is_terminal() {
                return false;
            }
            state.status = DownloadStatus::Failed;
            state.error = Some(message);
            true
        })
    }

    /// Progress is only recorded while downloading.
    pub(crate) fn record_progress(&self, progress: f32) {
        let progress = clamp_progress(progress);
        self.tx.send_if_modified(|state| {
            if state.status.is_terminal() || (state.progress - progress).abs() < f32::EPSILON {
                return false;
            }
            state.progress = progress;
            true
        });
    }

    pub(crate) async fn wait_terminal(&self) -> DownloadStatus {
        let mut rx = self.tx.subscribe();
        match rx.wait_for(|state| state.status.is_terminal()).await {
            Ok(state) => state.status,
            // Unreachable while `self` holds the sender.
            Err(_) => self.status(),
        }
    }
}

pub(crate) fn clamp_progress(progress: f32) -> f32 {
    if progress.is_nan() {
        0.0
    } else {
        progress.clamp(0.0, 1.0)
    }
}
