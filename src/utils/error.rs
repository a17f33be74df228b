//! Error types for source adapters
//!
//! This module defines the errors a single fetch attempt can end with.
//! None of them are fatal to the scheduler: every variant is recorded as a
//! failed attempt against the source that produced it.

use thiserror::Error;

/// Errors that can occur while fetching a source
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request error
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status code
    #[error("Unexpected HTTP status: {0}")]
    Status(u16),

    /// The attempt did not finish before its deadline
    #[error("Fetch timed out after {0} ms")]
    Timeout(u64),

    /// Response body could not be turned into items
    #[error("Parse error: {0}")]
    Parse(String),

    /// Source needs a proxy but none is configured
    #[error("No proxy endpoint available")]
    ProxyUnavailable,

    /// Request through the proxy failed
    #[error("Proxy request failed: {0}")]
    Proxy(String),

    /// No adapter family is registered for the requested kind
    #[error("Unsupported adapter family: {0}")]
    UnsupportedAdapter(String),

    /// Invalid URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Adapter-specific failure (browser crash, exhausted strategies, ...)
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Create an adapter-specific error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Check if retrying the same request may succeed
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Status(code) => *code == 429 || *code >= 500,
            Self::Timeout(_) | Self::Proxy(_) => true,
            Self::Parse(_)
            | Self::ProxyUnavailable
            | Self::UnsupportedAdapter(_)
            | Self::InvalidUrl(_)
            | Self::Other(_) => false,
        }
    }

    /// Whether this failure happened on the proxy leg of a request
    pub fn is_proxy_error(&self) -> bool {
        matches!(self, Self::Proxy(_) | Self::ProxyUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_recoverability() {
        assert!(FetchError::Status(503).is_recoverable());
        assert!(FetchError::Status(429).is_recoverable());
        assert!(!FetchError::Status(404).is_recoverable());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FetchError::Timeout(1500).to_string(),
            "Fetch timed out after 1500 ms"
        );
        assert_eq!(FetchError::other("browser crashed").to_string(), "browser crashed");
    }

    #[test]
    fn test_proxy_classification() {
        assert!(FetchError::ProxyUnavailable.is_proxy_error());
        assert!(FetchError::Proxy("refused".into()).is_proxy_error());
        assert!(!FetchError::Timeout(10).is_proxy_error());
    }
}
