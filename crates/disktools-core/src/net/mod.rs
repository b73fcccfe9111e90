//! Network access for the cache manager.
//!
//! The manager only ever talks to the network through the [`Fetcher`]
//! trait: once per manifest URL at install time, and once per cache miss.
//! `HttpFetcher` is the real implementation; `OfflineFetcher` stands in for
//! a disconnected host.

pub mod client;
pub mod error;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{CapturedResponse, FetchRequest};

pub use client::{HttpFetcher, OfflineFetcher};
pub use error::FetchError;

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Issue the request. Any status code is a successful fetch; only a
    /// failure to get a response at all is an error.
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, FetchError>;
}

#[async_trait]
impl<T: Fetcher + ?Sized> Fetcher for Arc<T> {
    async fn fetch(&self, request: &FetchRequest) -> Result<CapturedResponse, FetchError> {
        (**self).fetch(request).await
    }
}
