//! Transfer executor: planned links to files on disk.
//!
//! # Features
//!
//! - Streaming downloads (memory-efficient for large files)
//! - Resume from `.part` files with byte-range requests
//! - Collision-free naming (`name(2).ext`, `name(3).ext`, ...)
//! - Optional pipelining with per-destination locking
//! - Cancellation checked before every request and between chunks
//! - Subfolder discovery for recursive runs ([`FolderCrawler`])

mod crawl;
mod error;
mod executor;
pub mod filename;

pub use crawl::FolderCrawler;
pub use error::DownloadError;
pub use executor::{
    DEFAULT_CONCURRENCY, MAX_CONCURRENCY, TransferExecutor, TransferOptions, TransferOutcome,
    TransferStats, TransferSummary,
};

// Note: no module-local Result alias; signatures spell out
// `Result<T, DownloadError>`.
