//! Versioned cache buckets.
//!
//! A bucket is a named set of URL → response entries. Buckets are written
//! whole: [`CacheStorage::commit`] makes a bucket ready with exactly the
//! given entries or leaves storage untouched. Entries are never updated or
//! removed one at a time; a bucket only goes away through
//! [`CacheStorage::delete`].
//!
//! - `DiskStorage` persists buckets under a directory.
//! - `MemoryStorage` keeps them in process.

pub mod disk;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;

use crate::error::CacheError;
use crate::models::CapturedResponse;

pub use disk::DiskStorage;
pub use memory::MemoryStorage;

/// An entry about to be committed: its lookup key and captured response.
pub type BucketEntry = (String, CapturedResponse);

/// What a [`CacheStorage::prune`] pass removed and what it could not.
#[derive(Debug, Default)]
pub struct PruneOutcome {
    pub removed: Vec<String>,
    pub failed: Vec<(String, CacheError)>,
}

#[async_trait]
pub trait CacheStorage: Send + Sync {
    /// Names of all ready buckets, oldest first.
    async fn keys(&self) -> Result<Vec<String>, CacheError>;

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        Ok(self.keys().await?.iter().any(|k| k == name))
    }

    /// Atomically make `name` a ready bucket holding exactly `entries`,
    /// replacing any earlier bucket of the same name.
    async fn commit(&self, name: &str, entries: Vec<BucketEntry>) -> Result<(), CacheError>;

    /// Look up one entry. `Ok(None)` for a miss or a missing bucket.
    async fn match_entry(&self, name: &str, key: &str) -> Result<Option<CapturedResponse>, CacheError>;

    /// Entry keys of a bucket in the order they were committed.
    async fn entry_keys(&self, name: &str) -> Result<Vec<String>, CacheError>;

    /// Remove a bucket. Returns false if there was nothing to remove.
    async fn delete(&self, name: &str) -> Result<bool, CacheError>;

    /// Remove everything stored except the bucket `keep`. Deletes run
    /// concurrently and one failure does not stop the others.
    async fn prune(&self, keep: &str) -> Result<PruneOutcome, CacheError> {
        let stale = self.keys().await?.into_iter().filter(|name| name != keep);
        let deletions = stale.map(|name| async move {
            let result = self.delete(&name).await;
            (name, result)
        });

        let mut outcome = PruneOutcome::default();
        for (name, result) in join_all(deletions).await {
            match result {
                Ok(true) => outcome.removed.push(name),
                Ok(false) => {}
                Err(e) => outcome.failed.push((name, e)),
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl<T: CacheStorage + ?Sized> CacheStorage for Arc<T> {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        (**self).keys().await
    }

    async fn has(&self, name: &str) -> Result<bool, CacheError> {
        (**self).has(name).await
    }

    async fn commit(&self, name: &str, entries: Vec<BucketEntry>) -> Result<(), CacheError> {
        (**self).commit(name, entries).await
    }

    async fn match_entry(&self, name: &str, key: &str) -> Result<Option<CapturedResponse>, CacheError> {
        (**self).match_entry(name, key).await
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>, CacheError> {
        (**self).entry_keys(name).await
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        (**self).delete(name).await
    }

    async fn prune(&self, keep: &str) -> Result<PruneOutcome, CacheError> {
        (**self).prune(keep).await
    }
}
