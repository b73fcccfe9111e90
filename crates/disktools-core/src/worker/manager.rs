//! The offline cache manager.
//!
//! Drives one versioned bucket through install → activate, then answers
//! intercepted requests from that bucket before falling back to the
//! network. Cache misses are never written back: the bucket only changes
//! when a whole new version is installed.

use futures::future::try_join_all;
use serde::Serialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::models::{CapturedResponse, FetchRequest, ServedResponse};
use crate::net::{FetchError, Fetcher};
use crate::storage::{BucketEntry, CacheStorage};

use super::LifecycleState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub bucket: String,
    pub entries: usize,
    pub bytes: u64,
}

/// A stale bucket that could not be removed during activation.
/// `bucket` is `None` when the bucket list itself could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupFailure {
    pub bucket: Option<String>,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub current: String,
    pub deleted: Vec<String>,
    pub failures: Vec<CleanupFailure>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationReport {
    pub install: InstallReport,
    pub activation: ActivationReport,
}

pub struct OfflineCacheManager<F, S> {
    config: CacheConfig,
    fetcher: F,
    storage: S,
    state: LifecycleState,
}

impl<F: Fetcher, S: CacheStorage> OfflineCacheManager<F, S> {
    pub fn new(config: CacheConfig, fetcher: F, storage: S) -> Self {
        Self {
            config,
            fetcher,
            storage,
            state: LifecycleState::Uninstalled,
        }
    }

    /// Re-enter a previously persisted state. Falls back to `Uninstalled`
    /// when the current bucket is no longer in storage.
    pub async fn resume(
        config: CacheConfig,
        fetcher: F,
        storage: S,
        state: LifecycleState,
    ) -> Result<Self, CacheError> {
        let state = if state != LifecycleState::Uninstalled
            && !storage.has(config.cache_name()).await?
        {
            warn!(bucket = config.cache_name(), %state, "Bucket missing, starting uninstalled");
            LifecycleState::Uninstalled
        } else {
            state
        };

        Ok(Self {
            config,
            fetcher,
            storage,
            state,
        })
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Fetch every manifest URL and commit them as the current bucket.
    ///
    /// All-or-nothing: if any fetch fails or returns a non-2xx status,
    /// nothing is committed and the state is left as it was.
    pub async fn install(&mut self) -> Result<InstallReport, CacheError> {
        if !self.state.can_install() {
            return Err(CacheError::InvalidState {
                action: "install",
                state: self.state,
            });
        }

        let name = self.config.cache_name();
        info!(bucket = name, urls = self.config.manifest().len(), "Installing offline cache");

        let fetches = self
            .config
            .manifest()
            .iter()
            .map(|url| self.fetch_for_install(url));
        let entries = match try_join_all(fetches).await {
            Ok(entries) => entries,
            Err(e) => {
                let transport = matches!(&e, CacheError::InstallFailure { source, .. } if source.is_transport());
                warn!(bucket = name, error = %e, transport, "Install aborted");
                return Err(e);
            }
        };

        let report = InstallReport {
            bucket: name.to_string(),
            entries: entries.len(),
            bytes: entries.iter().map(|(_, r)| r.body.len() as u64).sum(),
        };

        self.storage.commit(name, entries).await?;
        self.state = LifecycleState::Installed;

        info!(bucket = name, entries = report.entries, bytes = report.bytes, "Offline cache installed");
        Ok(report)
    }

    async fn fetch_for_install(&self, url: &Url) -> Result<BucketEntry, CacheError> {
        let request = FetchRequest::get(url.clone());
        let response = self
            .fetcher
            .fetch(&request)
            .await
            .map_err(|source| CacheError::InstallFailure {
                url: url.to_string(),
                source,
            })?;

        if !response.is_ok() {
            return Err(CacheError::InstallFailure {
                url: url.to_string(),
                source: FetchError::from_status(url.as_str(), response.status, &response.body),
            });
        }

        debug!(url = %url, bytes = response.body.len(), "Fetched manifest entry");
        Ok((request.cache_key(), response))
    }

    /// Take control of requests and delete every bucket that is not the
    /// current version. Deletion is best-effort: failures are logged and
    /// reported but never block activation.
    pub async fn activate(&mut self) -> Result<ActivationReport, CacheError> {
        if !self.state.can_activate() {
            return Err(CacheError::InvalidState {
                action: "activate",
                state: self.state,
            });
        }

        let current = self.config.cache_name().to_string();
        let mut report = ActivationReport {
            current: current.clone(),
            deleted: Vec::new(),
            failures: Vec::new(),
        };

        match self.storage.prune(&current).await {
            Ok(outcome) => {
                for name in outcome.removed {
                    info!(bucket = %name, "Deleted stale cache bucket");
                    report.deleted.push(name);
                }
                for (name, e) in outcome.failed {
                    warn!(bucket = %name, error = %e, "Failed to delete stale cache bucket");
                    report.failures.push(CleanupFailure {
                        bucket: Some(name),
                        error: e.to_string(),
                    });
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to list cache buckets for cleanup");
                report.failures.push(CleanupFailure {
                    bucket: None,
                    error: e.to_string(),
                });
            }
        }

        self.state = LifecycleState::Active;
        info!(bucket = %current, deleted = report.deleted.len(), "Offline cache active");
        Ok(report)
    }

    /// First registration with no prior manager: install, then activate
    /// straight away. Registering a version that is already active does
    /// nothing and returns `None`.
    pub async fn register(&mut self) -> Result<Option<RegistrationReport>, CacheError> {
        if self.state.is_active() {
            debug!(bucket = self.config.cache_name(), "Already active, nothing to register");
            return Ok(None);
        }
        let install = self.install().await?;
        let activation = self.activate().await?;
        Ok(Some(RegistrationReport { install, activation }))
    }

    /// Answer an intercepted request: the stored response on a hit, a live
    /// fetch on a miss. Network failures are returned unchanged.
    pub async fn handle_fetch(&self, request: &FetchRequest) -> Result<ServedResponse, CacheError> {
        if !self.state.is_active() {
            debug!(url = %request.url, state = %self.state, "Not controlling requests, passing through");
            return self.passthrough(request).await;
        }

        if request.is_cacheable() {
            let key = request.cache_key();
            match self.storage.match_entry(self.config.cache_name(), &key).await {
                Ok(Some(response)) => {
                    debug!(url = %key, navigation = request.is_navigation, "Cache hit");
                    return Ok(ServedResponse::from_cache(response));
                }
                Ok(None) => debug!(url = %key, navigation = request.is_navigation, "Cache miss"),
                Err(e) => warn!(url = %key, error = %e, "Cache lookup failed, using network"),
            }
        }

        self.passthrough(request).await
    }

    async fn passthrough(&self, request: &FetchRequest) -> Result<ServedResponse, CacheError> {
        let response = self.fetcher.fetch(request).await?;
        Ok(ServedResponse::from_network(response))
    }

    /// Look a path or URL up in the current bucket without touching the
    /// network.
    pub async fn match_cache(&self, path_or_url: &str) -> Result<Option<CapturedResponse>, CacheError> {
        let url = self.config.resolve(path_or_url)?;
        let key = FetchRequest::get(url).cache_key();
        self.storage.match_entry(self.config.cache_name(), &key).await
    }

    pub async fn list_caches(&self) -> Result<Vec<String>, CacheError> {
        self.storage.keys().await
    }

    /// Keys stored in the current bucket, in manifest order.
    pub async fn cached_urls(&self) -> Result<Vec<String>, CacheError> {
        self.storage.entry_keys(self.config.cache_name()).await
    }
}
