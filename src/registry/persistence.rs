//! Line-delimited identifier file.
//!
//! One backend id per line. A missing file means no downloads; the file is
//! deleted rather than left empty.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::backend::BackendId;

#[derive(Debug, Clone)]
pub(crate) struct IdStore {
    path: PathBuf,
}

impl IdStore {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every id in file order. Blank lines are skipped and lines that
    /// do not parse are logged and dropped.
    pub(crate) async fn read_ids(&self) -> io::Result<Vec<BackendId>> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        let ids = contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| match line.parse::<BackendId>() {
                Ok(id) => Some(id),
                Err(error) => {
                    warn!(line, error = %error, path = %self.path.display(), "skipping malformed download id");
                    None
                }
            })
            .collect();
        Ok(ids)
    }

    /// Replaces the file with `ids`, or removes it when `ids` is empty.
    pub(crate) async fn write_ids(&self, ids: &[BackendId]) -> io::Result<()> {
        if ids.is_empty() {
            return match tokio::fs::remove_file(&self.path).await {
                Ok(()) => {
                    debug!(path = %self.path.display(), "removed empty download id file");
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            };
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut contents = String::new();
        for id in ids {
            contents.push_str(&id.to_string());
            contents.push('\n');
        }
        tokio::fs::write(&self.path, contents).await?;
        debug!(path = %self.path.display(), count = ids.len(), "persisted download ids");
        Ok(())
    }
}
