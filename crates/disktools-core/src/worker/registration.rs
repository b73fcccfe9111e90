use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CacheConfig;

use super::LifecycleState;

/// Registration file name in the storage directory
const REGISTRATION_FILE: &str = "registration.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationRecord {
    pub cache_name: String,
    pub origin: String,
    pub state: LifecycleState,
    pub updated_at: DateTime<Utc>,
}

impl RegistrationRecord {
    pub fn new(config: &CacheConfig, state: LifecycleState) -> Self {
        Self {
            cache_name: config.cache_name().to_string(),
            origin: config.origin().to_string(),
            state,
            updated_at: Utc::now(),
        }
    }

    /// Whether this record was written for the same origin and version.
    pub fn matches(&self, config: &CacheConfig) -> bool {
        self.cache_name == config.cache_name() && self.origin == config.origin().as_str()
    }
}

/// The lifecycle state a host persisted for its manager between runs.
pub struct Registration {
    dir: PathBuf,
    pub data: Option<RegistrationRecord>,
}

impl Registration {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir, data: None }
    }

    /// Read the record written by an earlier run. Returns false when there
    /// is none.
    pub fn load(&mut self) -> Result<bool> {
        let path = self.registration_path();
        let contents = match std::fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };
        let record = serde_json::from_str(&contents)
            .with_context(|| format!("Corrupt registration record at {}", path.display()))?;
        self.data = Some(record);
        Ok(true)
    }

    /// Write the current record, if any. The storage directory is created
    /// on first save.
    pub fn save(&self) -> Result<()> {
        let Some(ref record) = self.data else {
            return Ok(());
        };
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        let path = self.registration_path();
        std::fs::write(&path, serde_json::to_vec_pretty(record)?)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    /// Forget the record in memory and on disk.
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.registration_path();
        match std::fs::remove_file(&path) {
            Err(e) if e.kind() != ErrorKind::NotFound => {
                Err(e).with_context(|| format!("Failed to remove {}", path.display()))
            }
            _ => Ok(()),
        }
    }

    pub fn update(&mut self, data: RegistrationRecord) {
        self.data = Some(data);
    }

    /// State to resume `config` in. A record for another version or origin
    /// means the manager starts over.
    pub fn state_for(&self, config: &CacheConfig) -> LifecycleState {
        self.data
            .as_ref()
            .filter(|record| record.matches(config))
            .map(|record| record.state)
            .unwrap_or_default()
    }

    fn registration_path(&self) -> PathBuf {
        self.dir.join(REGISTRATION_FILE)
    }
}
