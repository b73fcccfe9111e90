use thiserror::Error;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network unreachable: {0}")]
    Unreachable(String),

    #[error("Bad response status {status} for {url}: {body}")]
    BadStatus { url: String, status: u16, body: String },
}

/// Maximum length for response bodies carried in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &text[..end], body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        FetchError::BadStatus {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }

    /// True when no response was received at all.
    pub fn is_transport(&self) -> bool {
        !matches!(self, FetchError::BadStatus { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_keeps_short_body() {
        let err = FetchError::from_status("https://disktools.app/", 404, b"not here");
        match err {
            FetchError::BadStatus { url, status, body } => {
                assert_eq!(url, "https://disktools.app/");
                assert_eq!(status, 404);
                assert_eq!(body, "not here");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn test_from_status_truncates_long_body() {
        let body = vec![b'x'; 2000];
        let err = FetchError::from_status("https://disktools.app/big", 500, &body);
        let message = err.to_string();
        assert!(message.contains("truncated, 2000 total bytes"));
        assert!(message.len() < 700);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let body = "é".repeat(400);
        let truncated = FetchError::truncate_body(body.as_bytes());
        assert!(truncated.starts_with('é'));
        assert!(truncated.contains("truncated"));
    }

    #[test]
    fn test_is_transport() {
        assert!(FetchError::Unreachable("offline".into()).is_transport());
        assert!(!FetchError::from_status("u", 503, b"").is_transport());
    }
}
