//! Bucket storage on the local filesystem.
//!
//! Layout under the storage root:
//!
//! ```text
//! buckets/bucket-<name>/index.json   bucket name, creation time, entry metadata
//! buckets/bucket-<name>/<n>.body     response body of entry n
//! staging/                           commits being written
//! trash/                             buckets being removed
//! ```
//!
//! A bucket is ready only once its directory, index included, has been
//! renamed into `buckets/`. Anything left in `staging/` or `trash/` by an
//! interrupted process is swept when the storage is opened.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::models::CapturedResponse;

use super::{BucketEntry, CacheStorage, PruneOutcome};

const BUCKETS_DIR: &str = "buckets";
const STAGING_DIR: &str = "staging";
const TRASH_DIR: &str = "trash";
const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BucketIndex {
    name: String,
    created_at: DateTime<Utc>,
    entries: Vec<IndexEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexEntry {
    key: String,
    url: String,
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body_file: String,
    fetched_at: DateTime<Utc>,
}

pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// Open (or create) storage rooted at `root`, sweeping leftovers of
    /// interrupted commits and deletes.
    pub fn new(root: PathBuf) -> Result<Self, CacheError> {
        for dir in [BUCKETS_DIR, STAGING_DIR, TRASH_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| CacheError::io(&path, e))?;
        }

        let storage = Self { root };
        storage.sweep(STAGING_DIR);
        storage.sweep(TRASH_DIR);
        Ok(storage)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sweep(&self, dir: &str) {
        let path = self.root.join(dir);
        let Ok(entries) = std::fs::read_dir(&path) else {
            return;
        };
        for entry in entries.flatten() {
            let leftover = entry.path();
            match std::fs::remove_dir_all(&leftover) {
                Ok(()) => debug!(path = %leftover.display(), "Removed leftover bucket directory"),
                Err(e) => warn!(path = %leftover.display(), error = %e, "Failed to remove leftover bucket directory"),
            }
        }
    }

    fn bucket_dir(&self, name: &str) -> PathBuf {
        self.root.join(BUCKETS_DIR).join(dir_name(name))
    }

    fn scratch_dir(&self, area: &str, name: &str) -> PathBuf {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        let unique = format!(
            "{}-{}-{}",
            dir_name(name),
            Utc::now().timestamp_nanos_opt().unwrap_or_default(),
            COUNTER.fetch_add(1, Ordering::Relaxed)
        );
        self.root.join(area).join(unique)
    }

    async fn write_staged(
        &self,
        staging: &Path,
        name: &str,
        created_at: DateTime<Utc>,
        entries: Vec<BucketEntry>,
    ) -> Result<(), CacheError> {
        tokio::fs::create_dir_all(staging)
            .await
            .map_err(|e| CacheError::io(staging, e))?;

        let mut index = BucketIndex {
            name: name.to_string(),
            created_at,
            entries: Vec::with_capacity(entries.len()),
        };

        for (i, (key, response)) in entries.into_iter().enumerate() {
            let body_file = format!("{:04}.body", i);
            let body_path = staging.join(&body_file);
            tokio::fs::write(&body_path, &response.body)
                .await
                .map_err(|e| CacheError::io(&body_path, e))?;

            index.entries.push(IndexEntry {
                key,
                url: response.url,
                status: response.status,
                status_text: response.status_text,
                headers: response.headers,
                body_file,
                fetched_at: response.fetched_at,
            });
        }

        // Index last: a directory without one is never treated as a bucket.
        let index_path = staging.join(INDEX_FILE);
        let contents = serde_json::to_vec_pretty(&index)?;
        tokio::fs::write(&index_path, contents)
            .await
            .map_err(|e| CacheError::io(&index_path, e))?;
        Ok(())
    }

    /// Move a bucket directory out of `buckets/` into the trash.
    async fn set_aside(&self, dir: &Path, name: &str) -> Result<PathBuf, CacheError> {
        let trash = self.scratch_dir(TRASH_DIR, name);
        tokio::fs::rename(dir, &trash)
            .await
            .map_err(|e| CacheError::io(dir, e))?;
        Ok(trash)
    }

    async fn empty_trash(&self, trash: &Path) {
        if let Err(e) = tokio::fs::remove_dir_all(trash).await {
            // Already out of buckets/; swept on next open.
            warn!(path = %trash.display(), error = %e, "Failed to remove discarded bucket");
        }
    }

    /// Move a bucket directory out of `buckets/` and remove it.
    async fn discard(&self, dir: &Path, name: &str) -> Result<(), CacheError> {
        let trash = self.set_aside(dir, name).await?;
        self.empty_trash(&trash).await;
        Ok(())
    }

    /// Rename a staged bucket into `target`. Whatever was at `target` is
    /// only removed once the new directory is in place, and is put back if
    /// the rename fails.
    async fn swap_in(&self, staging: &Path, target: &Path, name: &str) -> Result<(), CacheError> {
        let previous = if tokio::fs::try_exists(target).await.unwrap_or(false) {
            Some(self.set_aside(target, name).await?)
        } else {
            None
        };

        if let Err(e) = tokio::fs::rename(staging, target).await {
            if let Some(ref old) = previous {
                if let Err(restore) = tokio::fs::rename(old, target).await {
                    warn!(path = %target.display(), error = %restore, "Failed to restore previous bucket");
                }
            }
            return Err(CacheError::io(target, e));
        }

        if let Some(old) = previous {
            self.empty_trash(&old).await;
        }
        Ok(())
    }
}

async fn remove_staging(staging: &Path) {
    if let Err(e) = tokio::fs::remove_dir_all(staging).await {
        debug!(path = %staging.display(), error = %e, "Failed to clean staging directory");
    }
}

/// Directory name for a bucket. Percent-encoded so any bucket name maps to
/// a single safe path component.
fn dir_name(name: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(name.as_bytes()).collect();
    format!("bucket-{}", encoded)
}

async fn read_index(dir: &Path) -> Result<Option<BucketIndex>, CacheError> {
    let path = dir.join(INDEX_FILE);
    match tokio::fs::read(&path).await {
        Ok(contents) => Ok(Some(serde_json::from_slice(&contents)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

#[async_trait]
impl CacheStorage for DiskStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let buckets_dir = self.root.join(BUCKETS_DIR);
        let mut dirs = tokio::fs::read_dir(&buckets_dir)
            .await
            .map_err(|e| CacheError::io(&buckets_dir, e))?;

        let mut found = Vec::new();
        while let Some(entry) = dirs
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&buckets_dir, e))?
        {
            match read_index(&entry.path()).await {
                Ok(Some(index)) => found.push((index.created_at, index.name)),
                Ok(None) => debug!(path = %entry.path().display(), "Skipping directory without index"),
                Err(e) => warn!(path = %entry.path().display(), error = %e, "Skipping unreadable bucket"),
            }
        }

        found.sort();
        Ok(found.into_iter().map(|(_, name)| name).collect())
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(read_index(&self.bucket_dir(name)).await?.is_some())
    }

    async fn commit(&self, name: &str, entries: Vec<BucketEntry>) -> Result<(), CacheError> {
        let target = self.bucket_dir(name);
        let previous = read_index(&target).await.ok().flatten();
        let created_at = previous
            .as_ref()
            .map(|index| index.created_at)
            .unwrap_or_else(Utc::now);

        let staging = self.scratch_dir(STAGING_DIR, name);
        let staged = match self.write_staged(&staging, name, created_at, entries).await {
            Ok(()) => self.swap_in(&staging, &target, name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = staged {
            remove_staging(&staging).await;
            return Err(e);
        }

        debug!(bucket = name, replaced = previous.is_some(), "Committed bucket");
        Ok(())
    }

    async fn match_entry(&self, name: &str, key: &str) -> Result<Option<CapturedResponse>, CacheError> {
        let dir = self.bucket_dir(name);
        let Some(index) = read_index(&dir).await? else {
            return Ok(None);
        };
        let Some(entry) = index.entries.into_iter().find(|e| e.key == key) else {
            return Ok(None);
        };

        let body_path = dir.join(&entry.body_file);
        let body = tokio::fs::read(&body_path)
            .await
            .map_err(|e| CacheError::io(&body_path, e))?;

        Ok(Some(CapturedResponse {
            url: entry.url,
            status: entry.status,
            status_text: entry.status_text,
            headers: entry.headers,
            body: Bytes::from(body),
            fetched_at: entry.fetched_at,
        }))
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>, CacheError> {
        let index = read_index(&self.bucket_dir(name))
            .await?
            .ok_or_else(|| CacheError::BucketNotFound(name.to_string()))?;
        Ok(index.entries.into_iter().map(|e| e.key).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let dir = self.bucket_dir(name);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Ok(false);
        }
        self.discard(&dir, name).await?;
        Ok(true)
    }

    /// Removes every directory under `buckets/` other than `keep`'s,
    /// including ones whose index is missing or unreadable. Those are
    /// reported by directory name.
    async fn prune(&self, keep: &str) -> Result<PruneOutcome, CacheError> {
        let buckets_dir = self.root.join(BUCKETS_DIR);
        let keep_dir = dir_name(keep);
        let mut dirs = tokio::fs::read_dir(&buckets_dir)
            .await
            .map_err(|e| CacheError::io(&buckets_dir, e))?;

        let mut stale = Vec::new();
        while let Some(entry) = dirs
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&buckets_dir, e))?
        {
            let dir = entry.file_name().to_string_lossy().into_owned();
            if dir == keep_dir {
                continue;
            }
            let path = entry.path();
            let label = match read_index(&path).await {
                Ok(Some(index)) => index.name,
                Ok(None) => dir,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Pruning unreadable bucket");
                    dir
                }
            };
            stale.push((label, path));
        }

        let removals = stale.into_iter().map(|(label, path)| async move {
            let result = self.discard(&path, &label).await;
            (label, result)
        });

        let mut outcome = PruneOutcome::default();
        for (label, result) in join_all(removals).await {
            match result {
                Ok(()) => outcome.removed.push(label),
                Err(e) => outcome.failed.push((label, e)),
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn entry(key: &str, body: &str) -> BucketEntry {
        let response = CapturedResponse::new(key, 200, body.to_string())
            .with_header("content-type", "text/html");
        (key.to_string(), response)
    }

    #[tokio::test]
    async fn test_commit_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
            storage
                .commit("disktools-v2.0", vec![entry("https://a/", "home"), entry("https://a/js", "js")])
                .await
                .unwrap();
        }

        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        assert_eq!(storage.keys().await.unwrap(), vec!["disktools-v2.0"]);

        let hit = storage
            .match_entry("disktools-v2.0", "https://a/")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&hit.body[..], b"home");
        assert_eq!(hit.status, 200);
        assert_eq!(hit.header("Content-Type"), Some("text/html"));
        assert_eq!(
            storage.entry_keys("disktools-v2.0").await.unwrap(),
            vec!["https://a/", "https://a/js"]
        );
    }

    #[tokio::test]
    async fn test_miss_and_missing_bucket() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage.commit("v2.0", vec![entry("https://a/", "home")]).await.unwrap();

        assert!(storage.match_entry("v2.0", "https://a/other").await.unwrap().is_none());
        assert!(storage.match_entry("v9.9", "https://a/").await.unwrap().is_none());
        assert!(!storage.has("v9.9").await.unwrap());
        assert!(matches!(
            storage.entry_keys("v9.9").await.unwrap_err(),
            CacheError::BucketNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_keys_ordered_by_creation() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage.commit("zeta", vec![]).await.unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        storage.commit("alpha", vec![]).await.unwrap();
        // Recommitting keeps the original creation time.
        storage.commit("zeta", vec![entry("https://a/", "again")]).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["zeta", "alpha"]);
    }

    #[tokio::test]
    async fn test_recommit_replaces_whole_bucket() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage
            .commit("v2.0", vec![entry("https://a/", "old"), entry("https://a/gone", "x")])
            .await
            .unwrap();
        storage.commit("v2.0", vec![entry("https://a/", "new")]).await.unwrap();

        let hit = storage.match_entry("v2.0", "https://a/").await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"new");
        assert!(storage.match_entry("v2.0", "https://a/gone").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage.commit("v1.0", vec![entry("https://a/", "x")]).await.unwrap();
        storage.commit("v2.0", vec![]).await.unwrap();

        assert!(storage.delete("v1.0").await.unwrap());
        assert!(!storage.delete("v1.0").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["v2.0"]);
        assert!(storage.match_entry("v1.0", "https://a/").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_directory_without_index_is_not_a_bucket() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        std::fs::create_dir_all(storage.bucket_dir("half-written")).unwrap();

        assert!(storage.keys().await.unwrap().is_empty());
        assert!(!storage.has("half-written").await.unwrap());
    }

    #[tokio::test]
    async fn test_open_sweeps_leftover_staging() {
        let dir = TempDir::new().unwrap();
        let leftover = dir.path().join(STAGING_DIR).join("bucket-v2.0-123-1");
        std::fs::create_dir_all(&leftover).unwrap();
        std::fs::write(leftover.join("0000.body"), b"partial").unwrap();

        let _storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        assert!(!leftover.exists());
    }

    #[tokio::test]
    async fn test_failed_swap_restores_previous_bucket() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage.commit("v2.0", vec![entry("https://a/", "old")]).await.unwrap();

        let missing = storage.scratch_dir(STAGING_DIR, "v2.0");
        let err = storage
            .swap_in(&missing, &storage.bucket_dir("v2.0"), "v2.0")
            .await
            .unwrap_err();

        assert!(matches!(err, CacheError::Io { .. }));
        let hit = storage.match_entry("v2.0", "https://a/").await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"old");
        assert_eq!(std::fs::read_dir(dir.path().join(TRASH_DIR)).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_prune_removes_unreadable_buckets() {
        let dir = TempDir::new().unwrap();
        let storage = DiskStorage::new(dir.path().to_path_buf()).unwrap();
        storage.commit("v1.0", vec![entry("https://a/", "old")]).await.unwrap();
        storage.commit("v1.5", vec![]).await.unwrap();
        storage.commit("v2.0", vec![entry("https://a/", "new")]).await.unwrap();
        std::fs::write(storage.bucket_dir("v1.0").join(INDEX_FILE), b"{not json").unwrap();
        std::fs::create_dir_all(storage.bucket_dir("half-written")).unwrap();

        // The corrupt bucket is invisible to listing but still on disk.
        assert_eq!(storage.keys().await.unwrap(), vec!["v1.5", "v2.0"]);

        let outcome = storage.prune("v2.0").await.unwrap();

        let mut removed = outcome.removed.clone();
        removed.sort();
        assert_eq!(removed, vec!["bucket-half-written", "bucket-v1.0", "v1.5"]);
        assert!(outcome.failed.is_empty());
        assert!(!storage.bucket_dir("v1.0").exists());
        assert!(!storage.bucket_dir("half-written").exists());
        assert_eq!(storage.keys().await.unwrap(), vec!["v2.0"]);
        let hit = storage.match_entry("v2.0", "https://a/").await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"new");
    }

    #[test]
    fn test_dir_name_is_single_component() {
        assert_eq!(dir_name("disktools-v2.0"), "bucket-disktools-v2.0");
        assert_eq!(dir_name("a/b"), "bucket-a%2Fb");
        assert_eq!(dir_name(".."), "bucket-..");
    }
}
