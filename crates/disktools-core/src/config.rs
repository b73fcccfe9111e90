//! Configuration for the offline cache manager.
//!
//! [`CacheConfig`] is the immutable value handed to the manager at
//! construction: origin, bucket name and resolved manifest. [`Config`] is the
//! user's persisted settings file, stored at
//! `~/.config/disktools/config.json`, from which a `CacheConfig` is built.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CacheError;
use crate::models::request::cache_key;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "disktools";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Bucket name shipped with the site. Bump it to invalidate every cached
/// entry on the next activation.
pub const DEFAULT_CACHE_NAME: &str = "disktools-v2.0";

/// Pages and assets pre-cached at install.
pub const DEFAULT_MANIFEST: &[&str] = &[
    "/",
    "/static/css/main.css",
    "/static/css/animations.css",
    "/static/js/main.js",
    "/static/js/animations.js",
    "/tools/gpa-calculator",
    "/tools/pomodoro-timer",
    "/tools/unit-converter",
    "/tools/study-planner",
    "/tools/assignment-tracker",
    "/tools/pdf-toolkit",
    "/tools/word-counter",
    "/tools/password-manager",
    "/tools/flashcard-maker",
    "/tools/note-taking",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    origin: Url,
    cache_name: String,
    manifest: Vec<Url>,
}

impl CacheConfig {
    pub fn new<I, P>(origin: &str, cache_name: impl Into<String>, manifest: I) -> Result<Self, CacheError>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let origin = Url::parse(origin)
            .map_err(|e| CacheError::Config(format!("invalid origin {:?}: {}", origin, e)))?;
        if origin.cannot_be_a_base() {
            return Err(CacheError::Config(format!(
                "origin {} cannot resolve relative paths",
                origin
            )));
        }

        let cache_name = validate_cache_name(cache_name.into())?;

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for entry in manifest {
            let url = resolve_against(&origin, entry.as_ref())?;
            // A bulk add of the same request twice is invalid.
            if !seen.insert(cache_key(&url)) {
                return Err(CacheError::Config(format!(
                    "duplicate manifest entry {}",
                    url
                )));
            }
            resolved.push(url);
        }

        Ok(Self {
            origin,
            cache_name,
            manifest: resolved,
        })
    }

    /// The site's shipped bucket name and manifest for `origin`.
    pub fn disktools(origin: &str) -> Result<Self, CacheError> {
        Self::new(origin, DEFAULT_CACHE_NAME, DEFAULT_MANIFEST.iter().copied())
    }

    /// Same origin and manifest under a new bucket name.
    pub fn with_cache_name(&self, cache_name: impl Into<String>) -> Result<Self, CacheError> {
        Ok(Self {
            origin: self.origin.clone(),
            cache_name: validate_cache_name(cache_name.into())?,
            manifest: self.manifest.clone(),
        })
    }

    pub fn origin(&self) -> &Url {
        &self.origin
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    pub fn manifest(&self) -> &[Url] {
        &self.manifest
    }

    /// Resolve a path (or absolute URL) against the origin, fragment removed.
    pub fn resolve(&self, path_or_url: &str) -> Result<Url, CacheError> {
        resolve_against(&self.origin, path_or_url)
    }
}

fn validate_cache_name(name: String) -> Result<String, CacheError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(CacheError::Config("cache name must not be empty".to_string()));
    }
    if trimmed != name {
        return Err(CacheError::Config(format!(
            "cache name {:?} has surrounding whitespace",
            name
        )));
    }
    Ok(name)
}

fn resolve_against(origin: &Url, path_or_url: &str) -> Result<Url, CacheError> {
    let mut url = origin
        .join(path_or_url)
        .map_err(|e| CacheError::Config(format!("cannot resolve {:?}: {}", path_or_url, e)))?;
    url.set_fragment(None);
    Ok(url)
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Config {
    pub origin: Option<String>,
    pub cache_name: Option<String>,
    pub manifest: Option<Vec<String>>,
    pub request_timeout_secs: Option<u64>,
    pub storage_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Where buckets and the registration record live.
    pub fn storage_dir(&self) -> Result<PathBuf> {
        if let Some(ref dir) = self.storage_dir {
            return Ok(dir.clone());
        }
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Build the manager's configuration. Overrides win over file values,
    /// file values win over the shipped defaults.
    pub fn cache_config(
        &self,
        origin_override: Option<&str>,
        cache_name_override: Option<&str>,
    ) -> Result<CacheConfig> {
        let origin = origin_override
            .or(self.origin.as_deref())
            .ok_or_else(|| anyhow::anyhow!("No origin configured; pass --origin or set it in the config file"))?;
        let cache_name = cache_name_override
            .or(self.cache_name.as_deref())
            .unwrap_or(DEFAULT_CACHE_NAME);

        let config = match self.manifest {
            Some(ref manifest) => CacheConfig::new(origin, cache_name, manifest),
            None => CacheConfig::new(origin, cache_name, DEFAULT_MANIFEST.iter().copied()),
        };
        config.context("Invalid cache configuration")
    }
}
