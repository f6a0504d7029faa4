//! Download data model and lifecycle.
//!
//! This module defines what a download *is*, independent of the backend
//! that carries it out.
//!
//! # Features
//!
//! - Immutable [`DownloadConfig`] with URL, relative destination, headers and
//!   connectivity [`DownloadPolicy`]
//! - Terminal-once status machine (`Downloading` → `Done` | `Failed`)
//! - [`Download`] handle exposing status, error, progress and disposal
//! - Structured [`DownloadError`] taxonomy converted to failure messages
//!
//! # Example
//!
//! ```no_run
//! use bgdl_core::{DownloadConfig, DownloadPolicy, DownloadRegistry, RegistrySettings};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = RegistrySettings::new("/var/lib/myapp");
//! let mut registry = DownloadRegistry::from_settings(&settings, None).await?;
//! let config = DownloadConfig::parse("https://example.com/pack.bin", "packs/pack.bin")?
//!     .with_policy(DownloadPolicy::WifiOnly);
//! let download = registry.start(config).await?;
//! let status = download.wait().await;
//! println!("{}: {status}", download.destination_path().display());
//! # Ok(())
//! # }
//! ```

mod config;
mod constants;
mod error;
mod handle;
mod state;

pub use config::{DownloadConfig, DownloadPolicy, NetworkFlags, RequestHeaders};
pub use constants::{
    CONNECT_TIMEOUT_SECS, PERSISTED_IDS_FILE_NAME, READ_TIMEOUT_SECS, TEMP_FILE_SUFFIX,
};
pub use error::DownloadError;
pub use handle::{Download, DownloadSummary};
pub use state::{DownloadStatus, StateSnapshot};

pub(crate) use config::normalize_destination;
pub(crate) use handle::{DetachedJob, TransferJob};
pub(crate) use state::DownloadState;
