//! Integration tests for identifier persistence and recovery across
//! registry restarts.

mod support;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bgdl_core::{DownloadRegistry, DownloadStatus, NativeBackend, NativeCallGate, StorageRoot};
use support::mock_platform::MockPlatform;
use tempfile::TempDir;

/// A fresh registry on the same mock service simulates a process restart.
async fn open_registry(dir: &TempDir, platform: &MockPlatform) -> DownloadRegistry {
    let storage = StorageRoot::new(dir.path());
    let backend = NativeBackend::with_gate(platform.service(), storage.clone(), NativeCallGate::new())
        .await
        .expect("native backend should build");
    DownloadRegistry::new(Arc::new(backend), storage)
}

fn persisted_ids(registry: &DownloadRegistry) -> Vec<i64> {
    match std::fs::read_to_string(registry.persisted_ids_path()) {
        Ok(raw) => raw.lines().map(|line| line.parse().unwrap()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn test_restart_recovers_started_downloads() {
    let dir = TempDir::new().unwrap();
    let platform = MockPlatform::new();

    let mut started = HashSet::new();
    {
        let mut registry = open_registry(&dir, &platform).await;
        for name in ["a.bin", "b.bin", "nested/c.bin"] {
            let download = registry
                .start_url(&format!("https://example.com/{name}"), name)
                .await
                .unwrap();
            started.insert(download.backend_id().unwrap());
        }
        let saved: HashSet<_> = persisted_ids(&registry).into_iter().collect();
        assert_eq!(saved, started);
    }

    let mut registry = open_registry(&dir, &platform).await;
    let downloads = registry.downloads().await;
    let recovered: HashSet<_> = downloads
        .iter()
        .map(|download| download.backend_id().unwrap())
        .collect();
    assert_eq!(recovered, started);

    let nested = registry.get(Path::new("nested/c.bin")).await.unwrap();
    assert_eq!(nested.config().url.as_str(), "https://example.com/nested/c.bin");
    assert_eq!(nested.status(), DownloadStatus::Downloading);
    assert_eq!(nested.temp_path(), dir.path().join("nested/c.bin.part"));
}

#[tokio::test]
async fn test_stale_id_is_dropped_and_file_rewritten() {
    let dir = TempDir::new().unwrap();
    let platform = MockPlatform::new();

    let (kept_a, lost, kept_c) = {
        let mut registry = open_registry(&dir, &platform).await;
        let a = registry.start_url("https://example.com/a", "a.bin").await.unwrap();
        let b = registry.start_url("https://example.com/b", "b.bin").await.unwrap();
        let c = registry.start_url("https://example.com/c", "c.bin").await.unwrap();
        (
            a.backend_id().unwrap(),
            b.backend_id().unwrap(),
            c.backend_id().unwrap(),
        )
    };
    platform.forget(lost);

    let mut registry = open_registry(&dir, &platform).await;
    assert_eq!(registry.downloads().await.len(), 2);
    assert!(registry.get(Path::new("b.bin")).await.is_none());
    let persisted: HashSet<_> = persisted_ids(&registry).into_iter().collect();
    assert_eq!(persisted, HashSet::from([kept_a, kept_c]));
}

#[tokio::test]
async fn test_recreate_errors_and_foreign_destinations_are_dropped() {
    let dir = TempDir::new().unwrap();
    let platform = MockPlatform::new();

    let broken = platform.insert_job(
        "https://example.com/x",
        &format!("file://{}/x.bin.part", dir.path().display()),
    );
    platform.break_recreate(broken);
    let outside = platform.insert_job("https://example.com/y", "file:///somewhere/else/y.bin.part");
    let no_suffix = platform.insert_job(
        "https://example.com/z",
        &format!("file://{}/z.bin", dir.path().display()),
    );
    std::fs::write(
        dir.path().join("background_downloads.dl"),
        format!("{broken}\n{outside}\n\n{no_suffix}\ngarbage\n"),
    )
    .unwrap();

    let mut registry = open_registry(&dir, &platform).await;
    assert!(registry.downloads().await.is_empty());
    assert!(
        !registry.persisted_ids_path().exists(),
        "an empty id set deletes the file"
    );
}

#[tokio::test]
async fn test_recovery_settles_downloads_finished_while_away() {
    let dir = TempDir::new().unwrap();
    let platform = MockPlatform::new();

    let (done_id, failed_id) = {
        let mut registry = open_registry(&dir, &platform).await;
        let done = registry.start_url("https://example.com/d", "done.bin").await.unwrap();
        let failed = registry
            .start_url("https://example.com/f", "failed.bin")
            .await
            .unwrap();
        (done.backend_id().unwrap(), failed.backend_id().unwrap())
    };
    platform.complete(done_id, b"finished offline");
    platform.fail(failed_id, "connection lost");

    let mut registry = open_registry(&dir, &platform).await;
    let done = registry.get(Path::new("done.bin")).await.unwrap();
    let failed = registry.get(Path::new("failed.bin")).await.unwrap();

    assert_eq!(done.status(), DownloadStatus::Done);
    assert_eq!(
        std::fs::read(dir.path().join("done.bin")).unwrap(),
        b"finished offline"
    );
    assert_eq!(failed.status(), DownloadStatus::Failed);
    assert_eq!(failed.error().as_deref(), Some("connection lost"));

    // Terminal downloads stay tracked until the caller disposes them.
    assert_eq!(persisted_ids(&registry).len(), 2);
    assert!(registry.dispose(Path::new("done.bin")).await.unwrap());
    assert!(registry.dispose(Path::new("failed.bin")).await.unwrap());
    assert!(!registry.persisted_ids_path().exists());
    assert_eq!(platform.job_count(), 0);
}

#[tokio::test]
async fn test_poll_settles_without_callback() {
    let dir = TempDir::new().unwrap();
    let platform = MockPlatform::new();
    let mut registry = open_registry(&dir, &platform).await;
    let download = registry.start_url("https://example.com/p", "p.bin").await.unwrap();

    platform.complete(download.backend_id().unwrap(), b"polled");
    registry.poll().await;

    let status = tokio::time::timeout(Duration::from_secs(5), download.wait())
        .await
        .unwrap();
    assert_eq!(status, DownloadStatus::Done);
}

#[tokio::test]
async fn test_duplicate_destination_rejected_after_recovery() {
    let dir = TempDir::new().unwrap();
    let platform = MockPlatform::new();
    {
        let mut registry = open_registry(&dir, &platform).await;
        registry.start_url("https://example.com/a", "a.bin").await.unwrap();
    }

    let mut registry = open_registry(&dir, &platform).await;
    let again = registry.start_url("https://example.com/a", "a.bin").await;
    assert!(matches!(
        again,
        Err(bgdl_core::RegistryError::AlreadyPresent { .. })
    ));
}
