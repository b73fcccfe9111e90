use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::CacheError;
use crate::models::CapturedResponse;

use super::{BucketEntry, CacheStorage};

#[derive(Debug)]
struct Bucket {
    name: String,
    entries: Vec<BucketEntry>,
}

/// In-process bucket storage. Nothing survives the process.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    buckets: RwLock<Vec<Bucket>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStorage for MemoryStorage {
    async fn keys(&self) -> Result<Vec<String>, CacheError> {
        let buckets = self.buckets.read().await;
        Ok(buckets.iter().map(|b| b.name.clone()).collect())
    }

    async fn commit(&self, name: &str, entries: Vec<BucketEntry>) -> Result<(), CacheError> {
        let mut buckets = self.buckets.write().await;
        match buckets.iter_mut().find(|b| b.name == name) {
            // Keeps its place in creation order; contents are swapped whole.
            Some(existing) => existing.entries = entries,
            None => buckets.push(Bucket {
                name: name.to_string(),
                entries,
            }),
        }
        Ok(())
    }

    async fn match_entry(&self, name: &str, key: &str) -> Result<Option<CapturedResponse>, CacheError> {
        let buckets = self.buckets.read().await;
        Ok(buckets
            .iter()
            .find(|b| b.name == name)
            .and_then(|b| b.entries.iter().find(|(k, _)| k == key))
            .map(|(_, response)| response.clone()))
    }

    async fn entry_keys(&self, name: &str) -> Result<Vec<String>, CacheError> {
        let buckets = self.buckets.read().await;
        buckets
            .iter()
            .find(|b| b.name == name)
            .map(|b| b.entries.iter().map(|(k, _)| k.clone()).collect())
            .ok_or_else(|| CacheError::BucketNotFound(name.to_string()))
    }

    async fn delete(&self, name: &str) -> Result<bool, CacheError> {
        let mut buckets = self.buckets.write().await;
        let before = buckets.len();
        buckets.retain(|b| b.name != name);
        Ok(buckets.len() != before)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, body: &str) -> BucketEntry {
        (key.to_string(), CapturedResponse::new(key, 200, body.to_string()))
    }

    #[tokio::test]
    async fn test_commit_and_match() {
        let storage = MemoryStorage::new();
        storage
            .commit("v2.0", vec![entry("https://a/", "home"), entry("https://a/js", "js")])
            .await
            .unwrap();

        let hit = storage.match_entry("v2.0", "https://a/").await.unwrap().unwrap();
        assert_eq!(&hit.body[..], b"home");
        assert!(storage.match_entry("v2.0", "https://a/css").await.unwrap().is_none());
        assert!(storage.match_entry("v1.0", "https://a/").await.unwrap().is_none());
        assert_eq!(
            storage.entry_keys("v2.0").await.unwrap(),
            vec!["https://a/", "https://a/js"]
        );
    }

    #[tokio::test]
    async fn test_keys_in_creation_order_and_delete() {
        let storage = MemoryStorage::new();
        storage.commit("v1.0", vec![]).await.unwrap();
        storage.commit("v2.0", vec![]).await.unwrap();
        storage.commit("v1.0", vec![entry("https://a/", "new")]).await.unwrap();

        assert_eq!(storage.keys().await.unwrap(), vec!["v1.0", "v2.0"]);
        assert!(storage.has("v2.0").await.unwrap());

        assert!(storage.delete("v1.0").await.unwrap());
        assert!(!storage.delete("v1.0").await.unwrap());
        assert_eq!(storage.keys().await.unwrap(), vec!["v2.0"]);
    }

    #[tokio::test]
    async fn test_recommit_replaces_whole_bucket() {
        let storage = MemoryStorage::new();
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
    async fn test_entry_keys_of_missing_bucket() {
        let storage = MemoryStorage::new();
        let err = storage.entry_keys("nope").await.unwrap_err();
        assert!(matches!(err, CacheError::BucketNotFound(name) if name == "nope"));
    }
}
