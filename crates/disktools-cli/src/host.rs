//! Wires configuration, storage and the network into one cache manager and
//! keeps the registration record in step with it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use disktools_core::{
    CacheConfig, CacheStorage, Config, DiskStorage, Fetcher, HttpFetcher, OfflineCacheManager,
    OfflineFetcher, Registration, RegistrationRecord,
};
use tracing::{debug, info};

pub type Manager = OfflineCacheManager<Arc<dyn Fetcher>, Arc<DiskStorage>>;

/// Settings a command line invocation can override.
#[derive(Debug, Default)]
pub struct HostOptions {
    pub config_path: Option<PathBuf>,
    pub origin: Option<String>,
    pub cache_name: Option<String>,
    pub storage_dir: Option<PathBuf>,
    pub offline: bool,
}

pub struct Host {
    pub manager: Manager,
    storage: Arc<DiskStorage>,
    registration: Registration,
}

impl Host {
    pub async fn open(options: HostOptions) -> Result<Self> {
        let config = match options.config_path {
            Some(ref path) => Config::load_from(path)?,
            None => Config::load()?,
        };
        let cache_config =
            config.cache_config(options.origin.as_deref(), options.cache_name.as_deref())?;

        let storage_dir = match options.storage_dir {
            Some(dir) => dir,
            None => config.storage_dir()?,
        };
        let storage = Arc::new(
            DiskStorage::new(storage_dir.clone())
                .with_context(|| format!("Failed to open cache storage at {}", storage_dir.display()))?,
        );

        let fetcher: Arc<dyn Fetcher> = if options.offline {
            info!("Running without network access");
            Arc::new(OfflineFetcher)
        } else {
            Arc::new(HttpFetcher::new(config.request_timeout()).context("Failed to build HTTP client")?)
        };

        let mut registration = Registration::new(storage_dir);
        registration.load()?;
        let state = registration.state_for(&cache_config);
        debug!(bucket = cache_config.cache_name(), %state, "Resuming cache manager");

        let manager = OfflineCacheManager::resume(cache_config, fetcher, storage.clone(), state).await?;

        Ok(Self {
            manager,
            storage,
            registration,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        self.manager.config()
    }

    pub fn storage_root(&self) -> &Path {
        self.storage.root()
    }

    pub fn registration(&self) -> Option<&RegistrationRecord> {
        self.registration.data.as_ref()
    }

    /// Record the manager's current state for the next run.
    pub fn persist(&mut self) -> Result<()> {
        self.registration
            .update(RegistrationRecord::new(self.manager.config(), self.manager.state()));
        self.registration.save()
    }

    /// Delete every bucket and forget the registration.
    pub async fn clear(&mut self) -> Result<Vec<String>> {
        let mut removed = Vec::new();
        for name in self.storage.keys().await? {
            if self.storage.delete(&name).await? {
                removed.push(name);
            }
        }
        self.registration.clear()?;
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use disktools_core::LifecycleState;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> HostOptions {
        HostOptions {
            config_path: Some(dir.path().join("config.json")),
            origin: Some("https://disktools.app".to_string()),
            cache_name: Some("disktools-v2.0".to_string()),
            storage_dir: Some(dir.path().join("store")),
            offline: true,
        }
    }

    #[tokio::test]
    async fn test_open_without_registration_is_uninstalled() {
        let dir = TempDir::new().unwrap();
        let host = Host::open(options(&dir)).await.unwrap();

        assert_eq!(host.manager.state(), LifecycleState::Uninstalled);
        assert_eq!(host.config().manifest().len(), 15);
        assert!(host.registration().is_none());
        assert_eq!(host.storage_root(), dir.path().join("store"));
    }

    #[tokio::test]
    async fn test_offline_install_fails_and_clear_empties_storage() {
        let dir = TempDir::new().unwrap();
        let mut host = Host::open(options(&dir)).await.unwrap();

        assert!(host.manager.install().await.is_err());
        host.persist().unwrap();
        assert_eq!(
            host.registration().map(|r| r.state),
            Some(LifecycleState::Uninstalled)
        );

        let removed = host.clear().await.unwrap();
        assert!(removed.is_empty());
        assert!(host.registration().is_none());
    }
}
