//! Error types for the transport layer.

use thiserror::Error;

/// Errors raised while performing a single HTTP round-trip.
///
/// The transport never retries and never interprets response bodies, so every
/// variant describes a failure to obtain a response at all. Non-success HTTP
/// statuses are returned as ordinary responses.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error requesting {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Request timed out before completion.
    #[error("timeout requesting {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The provided URL is malformed or invalid.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// The connection broke while a response body was being read.
    #[error("connection interrupted reading {url}: {reason}")]
    Interrupted {
        /// The URL whose body was being read.
        url: String,
        /// Human-readable cause.
        reason: String,
    },

    /// HTTP client construction failed.
    #[error("failed to build HTTP client: {reason}")]
    ClientBuild {
        /// Why the builder failed.
        reason: String,
    },
}

impl TransportError {
    /// Creates a network error from a reqwest error, promoting timeouts.
    pub fn from_reqwest(url: impl Into<String>, source: reqwest::Error) -> Self {
        let url = url.into();
        if source.is_timeout() {
            Self::Timeout { url }
        } else {
            Self::Network { url, source }
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates an interrupted-body error.
    pub fn interrupted(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Interrupted {
            url: url.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_display_contains_url() {
        let error = TransportError::timeout("http://box.example/svc");
        let msg = error.to_string();
        assert!(msg.contains("timeout"), "Expected 'timeout' in: {msg}");
        assert!(msg.contains("http://box.example/svc"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_interrupted_display_contains_reason() {
        let error = TransportError::interrupted("http://files.example/a.pdf", "reset by peer");
        let msg = error.to_string();
        assert!(msg.contains("reset by peer"), "Expected reason in: {msg}");
    }

    #[test]
    fn test_invalid_url_display() {
        let msg = TransportError::invalid_url("not-a-url").to_string();
        assert!(msg.contains("invalid URL"));
        assert!(msg.contains("not-a-url"));
    }
}
