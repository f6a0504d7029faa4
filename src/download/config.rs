//! Caller-supplied download configuration.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::Url;

use super::DownloadError;
use crate::storage::temp_path_for;

/// Network policy controlling whether a transfer may use metered or roaming
/// connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadPolicy {
    /// Unmetered, non-roaming connections only.
    WifiOnly,
    /// Metered connections allowed, roaming is not.
    #[default]
    AllowMetered,
    /// Any connection, including roaming.
    AlwaysAllow,
}

/// Independent connectivity flags understood by the native service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkFlags {
    /// Transfer may run over a metered connection.
    pub allow_metered: bool,
    /// Transfer may run while roaming.
    pub allow_roaming: bool,
}

impl DownloadPolicy {
    /// Returns the config-file / CLI representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WifiOnly => "wifi_only",
            Self::AllowMetered => "allow_metered",
            Self::AlwaysAllow => "always_allow",
        }
    }

    /// Translates the policy into the native service's two flags.
    #[must_use]
    pub fn network_flags(self) -> NetworkFlags {
        let (allow_metered, allow_roaming) = match self {
            Self::WifiOnly => (false, false),
            Self::AllowMetered => (true, false),
            Self::AlwaysAllow => (true, true),
        };
        NetworkFlags {
            allow_metered,
            allow_roaming,
        }
    }
}

impl fmt::Display for DownloadPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DownloadPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "wifi_only" => Ok(Self::WifiOnly),
            "allow_metered" => Ok(Self::AllowMetered),
            "always_allow" => Ok(Self::AlwaysAllow),
            _ => Err(format!(
                "invalid download policy: {s} (expected wifi_only, allow_metered or always_allow)"
            )),
        }
    }
}

/// Request headers as a name to ordered-values mapping.
///
/// Every value is sent as its own header entry; values are never
/// comma-joined. Names compare case-insensitively, insertion order is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    entries: Vec<(String, Vec<String>)>,
}

impl RequestHeaders {
    /// Creates an empty header set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a value to `name`, keeping any values already present.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self
            .entries
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(&name))
        {
            Some((_, values)) => values.push(value),
            None => self.entries.push((name, vec![value])),
        }
    }

    /// Returns the values recorded for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> &[String] {
        self.entries
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map_or(&[], |(_, values)| values.as_slice())
    }

    /// Iterates `(name, value)` pairs, one per header entry to send.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().flat_map(|(name, values)| {
            values
                .iter()
                .map(move |value| (name.as_str(), value.as_str()))
        })
    }

    /// Number of distinct header names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no headers are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<N: Into<String>, V: Into<String>> FromIterator<(N, V)> for RequestHeaders {
    fn from_iter<I: IntoIterator<Item = (N, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.append(name, value);
        }
        headers
    }
}

/// Immutable description of one download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadConfig {
    /// Absolute source URL.
    pub url: Url,
    /// Destination relative to the application-private storage root.
    pub destination_path: PathBuf,
    /// Extra request headers.
    pub request_headers: RequestHeaders,
    /// Connectivity policy.
    pub policy: DownloadPolicy,
}

impl DownloadConfig {
    /// Creates a config with the default policy and no headers.
    ///
    /// `.` components and repeated separators are dropped from
    /// `destination_path`, so `./a.bin` and `a.bin` name the same download.
    #[must_use]
    pub fn new(url: Url, destination_path: impl Into<PathBuf>) -> Self {
        Self {
            url,
            destination_path: normalize_destination(&destination_path.into()),
            request_headers: RequestHeaders::new(),
            policy: DownloadPolicy::default(),
        }
    }

    /// Parses `url` and builds a config for `destination_path`.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] when `url` is not an absolute URL.
    pub fn parse(url: &str, destination_path: impl Into<PathBuf>) -> Result<Self, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        let config = Self::new(parsed, destination_path);
        config.validate_url()?;
        Ok(config)
    }

    /// Replaces the connectivity policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DownloadPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Appends one request header value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request_headers.append(name, value);
        self
    }

    /// Relative path of the in-progress file (`destination_path` + `.part`).
    #[must_use]
    pub fn temp_path(&self) -> PathBuf {
        temp_path_for(&self.destination_path)
    }

    /// Checks the URL and destination before anything touches the backend.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::InvalidUrl`] for URLs that cannot carry a
    /// path, and [`DownloadError::InvalidDestination`] for empty, absolute or
    /// root-escaping destinations.
    pub fn validate(&self) -> Result<(), DownloadError> {
        self.validate_url()?;
        validate_relative_destination(&self.destination_path)
    }

    fn validate_url(&self) -> Result<(), DownloadError> {
        if self.url.cannot_be_a_base() {
            return Err(DownloadError::invalid_url(self.url.as_str()));
        }
        Ok(())
    }
}

/// Rebuilds `path` from its components without `.` entries.
pub(crate) fn normalize_destination(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn validate_relative_destination(path: &Path) -> Result<(), DownloadError> {
    if path.as_os_str().is_empty() {
        return Err(DownloadError::invalid_destination(path, "path is empty"));
    }
    let mut has_file_component = false;
    for component in path.components() {
        match component {
            Component::Normal(_) => has_file_component = true,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(DownloadError::invalid_destination(
                    path,
                    "must stay inside the storage root",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(DownloadError::invalid_destination(
                    path,
                    "must be relative to the storage root",
                ));
            }
        }
    }
    if !has_file_component {
        return Err(DownloadError::invalid_destination(path, "path names no file"));
    }
    Ok(())
}
