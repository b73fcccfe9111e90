use std::path::PathBuf;

use thiserror::Error;

use crate::net::FetchError;
use crate::worker::LifecycleState;

#[derive(Error, Debug)]
pub enum CacheError {
    /// A manifest URL could not be fetched, or came back with a non-2xx
    /// status. Nothing from the install attempt is kept.
    #[error("Install failed fetching {url}: {source}")]
    InstallFailure {
        url: String,
        #[source]
        source: FetchError,
    },

    /// A cache-miss passthrough failed. Surfaced to the requester as-is.
    #[error(transparent)]
    Network(#[from] FetchError),

    #[error("Storage I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt bucket index: {0}")]
    Index(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: LifecycleState,
    },

    #[error("Cache bucket not found: {0}")]
    BucketNotFound(String),
}

impl CacheError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CacheError::Io {
            path: path.into(),
            source,
        }
    }
}
