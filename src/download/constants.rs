//! Constants for the download module (temp files, persistence, timeouts).

/// Suffix appended to the destination path while a transfer is in flight.
///
/// Load-bearing: native destination URIs are parsed back by stripping it,
/// and successful completion moves `<path>.part` onto `<path>`.
pub const TEMP_FILE_SUFFIX: &str = ".part";

/// Name of the persisted backend-identifier file under the storage root.
pub const PERSISTED_IDS_FILE_NAME: &str = "background_downloads.dl";

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes for large files).
pub const READ_TIMEOUT_SECS: u64 = 300;
