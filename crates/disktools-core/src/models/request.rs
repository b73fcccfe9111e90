use reqwest::Method;
use url::Url;

/// An intercepted page or resource request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: Url,
    pub method: Method,
    pub is_navigation: bool,
}

impl FetchRequest {
    /// A plain GET for a subresource.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            is_navigation: false,
        }
    }

    /// A top-level page navigation.
    pub fn navigate(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            is_navigation: true,
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Key used to look the request up in a bucket.
    /// Scheme, host, path and query; the fragment never reaches the network
    /// so it is never part of the key.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }

    /// Only GET requests are ever answered from a bucket.
    pub fn is_cacheable(&self) -> bool {
        self.method == Method::GET
    }
}

pub(crate) fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_drops_fragment_keeps_query() {
        let url = Url::parse("https://disktools.app/tools/word-counter?lang=en#stats").unwrap();
        let request = FetchRequest::get(url);
        assert_eq!(
            request.cache_key(),
            "https://disktools.app/tools/word-counter?lang=en"
        );
    }

    #[test]
    fn test_only_get_is_cacheable() {
        let url = Url::parse("https://disktools.app/").unwrap();
        assert!(FetchRequest::navigate(url.clone()).is_cacheable());
        assert!(!FetchRequest::get(url).with_method(Method::POST).is_cacheable());
    }
}
