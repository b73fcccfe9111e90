use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A full response captured off the wire: status, headers and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedResponse {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    /// Header pairs in the order received. Repeated names are kept.
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    pub fetched_at: DateTime<Utc>,
}

impl CapturedResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            status_text: String::new(),
            headers: Vec::new(),
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Status in the 200-299 range.
    pub fn is_ok(&self) -> bool {
        (200..=299).contains(&self.status)
    }

    /// First header value with a case-insensitive name match.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseSource {
    Cache,
    Network,
}

impl std::fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseSource::Cache => write!(f, "cache"),
            ResponseSource::Network => write!(f, "network"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: CapturedResponse,
    pub source: ResponseSource,
}

impl ServedResponse {
    pub fn from_cache(response: CapturedResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Cache,
        }
    }

    pub fn from_network(response: CapturedResponse) -> Self {
        Self {
            response,
            source: ResponseSource::Network,
        }
    }

    pub fn is_cache_hit(&self) -> bool {
        self.source == ResponseSource::Cache
    }
}
