//! ChomikBox Core Library
//!
//! Client for the ChomikBox file-hosting protocol: log in, resolve folder and
//! file URLs into service file ids, trade those for signed download links,
//! and write the files to disk with resumable, collision-safe semantics.
//!
//! # Architecture
//!
//! The library is organized into the following modules, leaf-first:
//! - [`transport`] - HTTP request/response collaborator (`reqwest`)
//! - [`protocol`] - SOAP envelope encoder and tolerant response decoders
//! - [`session`] - Credentials, login token reuse and the sequence stamp
//! - [`resolver`] - First protocol phase: URLs to file descriptors
//! - [`planner`] - Second protocol phase: descriptors to signed links
//! - [`download`] - Transfer executor, partial-file naming, folder crawl
//! - [`engine`] - Run orchestration with folder worklist
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use chomikbox_core::{
//!     Credentials, DownloadOptions, Endpoints, Engine, HttpTransport, Session,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::from_password("chomikoryba", "secret")?;
//! let session = Session::new(Arc::new(HttpTransport::new()?), Endpoints::default(), credentials);
//! let engine = Engine::new(Arc::new(session));
//! let summary = engine
//!     .download(
//!         &["http://chomikuj.pl/chomikoryba/Fonts".to_string()],
//!         &DownloadOptions::default(),
//!     )
//!     .await?;
//! println!("downloaded {}", summary.transfer.downloaded);
//! # Ok(())
//! # }
//! ```

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod download;
pub mod engine;
pub mod planner;
pub mod protocol;
pub mod resolver;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use download::{
    DEFAULT_CONCURRENCY, DownloadError, MAX_CONCURRENCY, TransferExecutor, TransferOptions,
    TransferStats, TransferSummary,
};
pub use engine::{DownloadOptions, Engine, RunSummary};
pub use planner::{DownloadLink, DownloadPlanner, ExtensionFilter};
pub use protocol::Endpoints;
pub use resolver::{FileDescriptor, Resolver};
pub use session::{Credentials, CredentialsError, Session, SessionError};
pub use transport::{HttpTimeouts, HttpTransport, Transport, TransportError};
