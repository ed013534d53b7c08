//! Error types for credentials and the session manager.

use thiserror::Error;

use crate::transport::TransportError;

/// Invalid credential input.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    /// The username is empty or whitespace.
    #[error("username must not be empty")]
    EmptyUsername,

    /// The supplied password hash is not a 32-character hex string.
    #[error("password hash must be 32 hex characters (got {length} characters)")]
    InvalidHash {
        /// Length of the rejected value.
        length: usize,
    },
}

impl CredentialsError {
    /// Creates an invalid-hash error.
    #[must_use]
    pub fn invalid_hash(length: usize) -> Self {
        Self::InvalidHash { length }
    }
}

/// Errors surfaced by session-backed protocol calls.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Login returned no usable token.
    #[error("[AUTH] login failed for {user} (status: {status})")]
    Authentication {
        /// Account name that failed to log in.
        user: String,
        /// `<a:status>` reported by the service, or `unknown`.
        status: String,
    },

    /// The round-trip itself failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The run was cancelled before the round-trip was issued.
    #[error("cancelled before requesting {url}")]
    Cancelled {
        /// The URL that was about to be requested.
        url: String,
    },
}

impl SessionError {
    /// Creates an authentication error.
    pub fn authentication(user: impl Into<String>, status: Option<String>) -> Self {
        Self::Authentication {
            user: user.into(),
            status: status.unwrap_or_else(|| "unknown".to_string()),
        }
    }

    /// Creates a cancellation error.
    pub fn cancelled(url: impl Into<String>) -> Self {
        Self::Cancelled { url: url.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authentication_display_includes_status() {
        let error = SessionError::authentication("chomik", Some("ERROR".to_string()));
        let msg = error.to_string();
        assert!(msg.contains("[AUTH]"), "missing tag: {msg}");
        assert!(msg.contains("chomik"));
        assert!(msg.contains("ERROR"));
    }

    #[test]
    fn test_authentication_without_status_reports_unknown() {
        let error = SessionError::authentication("chomik", None);
        assert!(error.to_string().contains("unknown"));
    }

    #[test]
    fn test_transport_error_converts() {
        let error: SessionError = TransportError::timeout("http://x").into();
        assert!(matches!(error, SessionError::Transport(_)));
        assert!(error.to_string().contains("timeout"));
    }

    #[test]
    fn test_invalid_hash_display() {
        assert!(
            CredentialsError::invalid_hash(5)
                .to_string()
                .contains("got 5")
        );
    }
}
