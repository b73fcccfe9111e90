//! Offline cache lifecycle.
//!
//! The [`OfflineCacheManager`] moves through three states, each transition
//! driven by an explicit call whose returned future is the completion
//! signal:
//!
//! - `install()`  Uninstalled → Installed (bulk fetch + atomic commit)
//! - `activate()` Installed → Active (stale buckets deleted, best-effort)
//! - `handle_fetch()` in Active: cache first, then network
//!
//! [`Registration`] persists the reached state so a host can resume.

pub mod lifecycle;
pub mod manager;
pub mod registration;

pub use lifecycle::LifecycleState;
pub use manager::{
    ActivationReport, CleanupFailure, InstallReport, OfflineCacheManager, RegistrationReport,
};
pub use registration::{Registration, RegistrationRecord};
