//! Core library for disktools.
//!
//! Keeps the DiskTools site usable without a network connection: a fixed
//! manifest of pages and assets is fetched into one versioned cache bucket,
//! intercepted requests are answered from that bucket when possible, and
//! older buckets are dropped when a new version activates.

pub mod config;
pub mod error;
pub mod models;
pub mod net;
pub mod storage;
pub mod worker;

pub use config::{CacheConfig, Config, DEFAULT_CACHE_NAME, DEFAULT_MANIFEST};
pub use error::CacheError;
pub use models::{CapturedResponse, FetchRequest, Method, ResponseSource, ServedResponse};
pub use net::{FetchError, Fetcher, HttpFetcher, OfflineFetcher};
pub use storage::{CacheStorage, DiskStorage, MemoryStorage, PruneOutcome};
pub use worker::{
    ActivationReport, CleanupFailure, InstallReport, LifecycleState, OfflineCacheManager,
    Registration, RegistrationRecord, RegistrationReport,
};
