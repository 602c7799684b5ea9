use thiserror::Error;

/// Errors surfaced by the request executor and the data manager.
///
/// Cloneable so a single failure can be handed to every caller that joined a
/// coalesced request.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Request aborted")]
    Aborted,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Offline - request queued for replay (queue id {id})")]
    Queued { id: u64 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl FetchError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status {
            400..=599 => FetchError::Http {
                status,
                body: truncated,
            },
            _ => FetchError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Transient failures (connection problems, 5xx) are worth another attempt.
    /// Timeouts, aborts and 4xx responses are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, FetchError::Queued { .. })
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    /// Request-building failures are bad URLs and undecodable bodies are bad
    /// responses. Everything else is a connection problem; deadlines are
    /// enforced by the executor, not by reqwest.
    fn from(e: reqwest::Error) -> Self {
        if e.is_builder() {
            FetchError::InvalidUrl(e.to_string())
        } else if e.is_decode() {
            FetchError::InvalidResponse(e.to_string())
        } else {
            FetchError::Network(e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(FetchError::Network("reset".into()).is_retryable());
        assert!(FetchError::from_status(503, "").is_retryable());
        assert!(!FetchError::from_status(404, "").is_retryable());
        assert!(!FetchError::Timeout { after_ms: 10 }.is_retryable());
        assert!(!FetchError::Aborted.is_retryable());
        assert!(!FetchError::Queued { id: 1 }.is_retryable());
    }

    #[test]
    fn test_from_status_non_error_code() {
        let err = FetchError::from_status(304, "");
        assert!(matches!(err, FetchError::InvalidResponse(_)));
    }

    #[test]
    fn test_truncate_long_body() {
        let body = "x".repeat(MAX_ERROR_BODY_LENGTH + 20);
        match FetchError::from_status(500, &body) {
            FetchError::Http { body, .. } => {
                assert!(body.contains("truncated"));
                assert!(body.contains(&(MAX_ERROR_BODY_LENGTH + 20).to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_reqwest_builder_error_is_invalid_url() {
        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err = FetchError::from(err);
        assert!(matches!(err, FetchError::InvalidUrl(_)));
        assert!(!err.is_retryable());
    }
}
