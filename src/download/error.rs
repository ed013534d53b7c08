//! Error types for the transfer executor.
//!
//! Every variant is either fatal to the run or scoped to one file; see
//! [`DownloadError::is_fatal`].

use std::path::PathBuf;

use thiserror::Error;

use crate::session::SessionError;
use crate::transport::TransportError;

/// Errors that can occur while resolving, planning or transferring files.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// A session-backed protocol call failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// The destination could not be created, opened, written or renamed.
    #[error("IO error writing to {path}: {source}")]
    FileSystem {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The file host answered 404; the link is dead.
    #[error("file not found (HTTP 404) at {url}")]
    NotFound {
        /// The link that returned 404.
        url: String,
    },

    /// The file host answered with another unusable status.
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The link that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The file request or body stream failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The run was cancelled.
    #[error("download cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Creates a file-system error.
    pub fn file_system(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileSystem {
            path: path.into(),
            source,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(url: impl Into<String>) -> Self {
        Self::NotFound { url: url.into() }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// True when the error must stop the whole run.
    ///
    /// Login failure, file-system failure and cancellation are fatal. Dead
    /// links, bad statuses and network failures only affect the file or batch
    /// they occurred in.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Session(SessionError::Authentication { .. } | SessionError::Cancelled { .. })
            | Self::FileSystem { .. }
            | Self::Cancelled => true,
            Self::Session(SessionError::Transport(_))
            | Self::NotFound { .. }
            | Self::HttpStatus { .. }
            | Self::Transport(_) => false,
        }
    }
}
