//! Background Download Core Library
//!
//! This library manages long-running, resumable file downloads that survive
//! process restarts. Transfers are delegated to a platform-native persistent
//! download service when one is available, or to an in-process HTTP fetch
//! otherwise.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`download`] - Download configuration, state machine and handle
//! - [`backend`] - Native service adapter, direct HTTP fallback, call gate
//! - [`registry`] - Active download set and identifier persistence
//! - [`storage`] - Application-private storage root and path mapping
//! - [`settings`] - Registry construction settings

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod download;
pub mod registry;
pub mod settings;
pub mod storage;

// Re-export commonly used types
pub use backend::{
    BackendId, BackendKind, CompletionCallback, DirectBackend, DownloadBackend, FinishState,
    HttpClient, NativeBackend, NativeCallGate, PlatformDownloadService, PlatformError, PlatformJob,
};
pub use download::{
    CONNECT_TIMEOUT_SECS, Download, DownloadConfig, DownloadError, DownloadPolicy, DownloadStatus,
    DownloadSummary, NetworkFlags, READ_TIMEOUT_SECS, RequestHeaders, StateSnapshot,
    TEMP_FILE_SUFFIX,
};
pub use registry::{DownloadRegistry, RegistryError};
pub use settings::RegistrySettings;
pub use storage::StorageRoot;
