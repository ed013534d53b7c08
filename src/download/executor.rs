//! Resumable, collision-safe file transfers.
//!
//! Each [`DownloadLink`] moves through the on-disk states *absent*,
//! *partial* (`name.part`, holding the bytes received so far) and *final*
//! (`name`). A partial file is only ever renamed to its final name once it
//! holds at least the expected number of bytes or the server says it is
//! complete.
//!
//! Transfers run in input order. With `concurrency > 1` up to that many run
//! at once. Links sharing a destination run one after another, and the final
//! name is claimed before writing starts, so two tasks never reconcile the
//! same partial file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use futures_util::StreamExt;
use serde::Serialize;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::DownloadError;
use super::filename::{next_available_path, partial_path};
use crate::planner::DownloadLink;
use crate::protocol::FILE_HEADERS;
use crate::transport::{Transport, TransportRequest};

/// Default number of simultaneous transfers.
pub const DEFAULT_CONCURRENCY: usize = 1;

/// Maximum number of simultaneous transfers.
pub const MAX_CONCURRENCY: usize = 16;

/// Where and how files are written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferOptions {
    /// Root directory for all destinations.
    pub destination_root: PathBuf,
    /// Recreate the remote folder path below the root.
    pub use_structure: bool,
    /// Replace existing final files.
    pub overwrite: bool,
    /// Simultaneous transfers, clamped to `1..=MAX_CONCURRENCY`.
    pub concurrency: usize,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            destination_root: PathBuf::from("."),
            use_structure: false,
            overwrite: false,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

/// What happened to one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// Downloaded from the first byte.
    Downloaded,
    /// Appended to an existing partial file.
    Resumed,
    /// The partial file was already complete and was renamed.
    FinalizedPartial,
    /// A final file already existed and the link was skipped.
    Skipped,
}

/// Per-run transfer counters.
///
/// Uses atomic counters so concurrent transfer tasks can update it.
#[derive(Debug, Default)]
pub struct TransferStats {
    downloaded: AtomicUsize,
    resumed: AtomicUsize,
    finalized: AtomicUsize,
    skipped: AtomicUsize,
    not_found: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

impl TransferStats {
    /// Creates a tracker with zero counts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Files downloaded from scratch.
    #[must_use]
    pub fn downloaded(&self) -> usize {
        self.downloaded.load(Ordering::SeqCst)
    }

    /// Files completed by resuming a partial file.
    #[must_use]
    pub fn resumed(&self) -> usize {
        self.resumed.load(Ordering::SeqCst)
    }

    /// Partial files that were already complete.
    #[must_use]
    pub fn finalized(&self) -> usize {
        self.finalized.load(Ordering::SeqCst)
    }

    /// Links skipped because the final file existed.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped.load(Ordering::SeqCst)
    }

    /// Links that answered 404.
    #[must_use]
    pub fn not_found(&self) -> usize {
        self.not_found.load(Ordering::SeqCst)
    }

    /// Links that failed for any other per-file reason.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Body bytes written to disk.
    #[must_use]
    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::SeqCst)
    }

    /// Copies the counters into a serializable value.
    #[must_use]
    pub fn snapshot(&self) -> TransferSummary {
        TransferSummary {
            downloaded: self.downloaded(),
            resumed: self.resumed(),
            finalized: self.finalized(),
            skipped: self.skipped(),
            not_found: self.not_found(),
            failed: self.failed(),
            bytes: self.bytes(),
        }
    }

    fn record(&self, outcome: TransferOutcome) {
        let counter = match outcome {
            TransferOutcome::Downloaded => &self.downloaded,
            TransferOutcome::Resumed => &self.resumed,
            TransferOutcome::FinalizedPartial => &self.finalized,
            TransferOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn record_failure(&self, error: &DownloadError) {
        let counter = match error {
            DownloadError::NotFound { .. } => &self.not_found,
            _ => &self.failed,
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn add_bytes(&self, count: u64) {
        self.bytes.fetch_add(count, Ordering::SeqCst);
    }
}

/// Point-in-time copy of [`TransferStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferSummary {
    /// Files downloaded from scratch.
    pub downloaded: usize,
    /// Files completed by resuming.
    pub resumed: usize,
    /// Partial files finalized without a request.
    pub finalized: usize,
    /// Links skipped because the final file existed.
    pub skipped: usize,
    /// Links that answered 404.
    pub not_found: usize,
    /// Other per-file failures.
    pub failed: usize,
    /// Body bytes written.
    pub bytes: u64,
}

struct TransferContext {
    transport: Arc<dyn Transport>,
    options: TransferOptions,
    cancel: CancellationToken,
    stats: Arc<TransferStats>,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
    /// Final paths owned by in-flight transfers.
    claimed: DashSet<PathBuf>,
    naming: Mutex<()>,
}

/// Exclusive ownership of a final destination, released on drop.
struct Claim<'a> {
    claimed: &'a DashSet<PathBuf>,
    path: PathBuf,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.claimed.remove(&self.path);
    }
}

/// Writes planned links to disk.
pub struct TransferExecutor {
    context: Arc<TransferContext>,
    semaphore: Arc<Semaphore>,
}

impl std::fmt::Debug for TransferExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferExecutor")
            .field("options", &self.context.options)
            .field("stats", &self.context.stats)
            .finish_non_exhaustive()
    }
}

impl TransferExecutor {
    /// Creates an executor.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        mut options: TransferOptions,
        cancel: CancellationToken,
    ) -> Self {
        options.concurrency = options.concurrency.clamp(1, MAX_CONCURRENCY);
        let semaphore = Arc::new(Semaphore::new(options.concurrency));
        Self {
            context: Arc::new(TransferContext {
                transport,
                options,
                cancel,
                stats: Arc::new(TransferStats::new()),
                locks: DashMap::new(),
                claimed: DashSet::new(),
                naming: Mutex::new(()),
            }),
            semaphore,
        }
    }

    /// Returns the options in effect.
    #[must_use]
    pub fn options(&self) -> &TransferOptions {
        &self.context.options
    }

    /// Returns the shared counters.
    #[must_use]
    pub fn stats(&self) -> Arc<TransferStats> {
        Arc::clone(&self.context.stats)
    }

    /// Transfers `links` in order.
    ///
    /// Per-file failures are logged, counted and skipped.
    ///
    /// # Errors
    ///
    /// Returns the first fatal error (file system or cancellation). No new
    /// transfer is started after a fatal error.
    #[instrument(skip(self, links), fields(links = links.len(), root = %self.context.options.destination_root.display()))]
    pub async fn transfer(&self, links: Vec<DownloadLink>) -> Result<(), DownloadError> {
        let root = &self.context.options.destination_root;
        fs::create_dir_all(root)
            .await
            .map_err(|e| DownloadError::file_system(root, e))?;

        // Stops new transfers once one task hits a fatal error.
        let halt = self.context.cancel.child_token();
        let fatal: Arc<Mutex<Option<DownloadError>>> = Arc::new(Mutex::new(None));
        let mut handles = Vec::with_capacity(links.len());

        for link in links {
            if halt.is_cancelled() {
                break;
            }
            let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
                break;
            };

            let context = Arc::clone(&self.context);
            let halt = halt.clone();
            let fatal = Arc::clone(&fatal);
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                if halt.is_cancelled() {
                    return;
                }
                match transfer_one(&context, &link).await {
                    Ok(outcome) => context.stats.record(outcome),
                    Err(error) if error.is_fatal() => {
                        let mut slot = fatal.lock().await;
                        if slot.is_none() {
                            *slot = Some(error);
                        }
                        halt.cancel();
                    }
                    Err(error) => {
                        warn!(name = %link.name, url = %link.url, error = %error, "transfer failed, continuing");
                        context.stats.record_failure(&error);
                    }
                }
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "transfer task panicked");
            }
        }

        let first_fatal = fatal.lock().await.take();
        match first_fatal {
            Some(error) => Err(error),
            None if self.context.cancel.is_cancelled() => Err(DownloadError::Cancelled),
            None => Ok(()),
        }
    }
}

#[instrument(level = "debug", skip(context, link), fields(name = %link.name))]
async fn transfer_one(
    context: &TransferContext,
    link: &DownloadLink,
) -> Result<TransferOutcome, DownloadError> {
    if context.cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    let options = &context.options;
    let initial = link.destination_path(&options.destination_root, options.use_structure);

    let lock = context
        .locks
        .entry(initial.clone())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone();
    let _guard = lock.lock().await;

    if let Some(parent) = initial.parent() {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| DownloadError::file_system(parent, e))?;
    }

    let Some(claim) = claim_destination(context, initial).await? else {
        return Ok(TransferOutcome::Skipped);
    };
    let destination = claim.path.as_path();

    let partial = partial_path(destination);
    let offset = match fs::metadata(&partial).await {
        Ok(meta) => Some(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
        Err(e) => return Err(DownloadError::file_system(&partial, e)),
    };

    if let Some(size) = offset
        && size >= link.expected_size
    {
        finalize(&partial, destination).await?;
        info!(path = %destination.display(), "partial file already complete");
        return Ok(TransferOutcome::FinalizedPartial);
    }

    fetch(context, link, &partial, destination, offset).await
}

/// Picks the final destination for `initial` and claims it.
///
/// Paths claimed by other in-flight transfers count as taken, so two tasks
/// never share a `.part` file. Returns `None` when the link is already
/// satisfied on disk.
async fn claim_destination(
    context: &TransferContext,
    initial: PathBuf,
) -> Result<Option<Claim<'_>>, DownloadError> {
    let options = &context.options;
    let _naming = context.naming.lock().await;
    let in_use = |path: &Path| context.claimed.contains(path);

    let mut destination = initial;
    if in_use(&destination) || exists(&destination).await? {
        if options.use_structure && !options.overwrite {
            info!(path = %destination.display(), "already downloaded, skipping");
            return Ok(None);
        }
        if options.overwrite {
            debug!(path = %destination.display(), "overwriting existing file");
            remove_if_present(&destination).await?;
        } else {
            destination = next_available_path(&destination, &in_use)
                .await
                .map_err(|e| DownloadError::file_system(&destination, e))?;
            debug!(path = %destination.display(), "name taken, using next free name");
        }
    }

    context.claimed.insert(destination.clone());
    Ok(Some(Claim {
        claimed: &context.claimed,
        path: destination,
    }))
}

async fn fetch(
    context: &TransferContext,
    link: &DownloadLink,
    partial: &Path,
    destination: &Path,
    offset: Option<u64>,
) -> Result<TransferOutcome, DownloadError> {
    let start = offset.unwrap_or(0);
    let mut request = TransportRequest::get(&link.url);
    for (name, value) in FILE_HEADERS {
        request = request.header(name, value);
    }
    request = request.header("Range", format!("bytes={start}-"));

    if context.cancel.is_cancelled() {
        return Err(DownloadError::Cancelled);
    }
    debug!(url = %link.url, start, expected = link.expected_size, "requesting file body");
    let mut response = context.transport.stream(request).await?;

    match response.status {
        404 => {
            remove_if_present(partial).await?;
            warn!(url = %link.url, name = %link.name, "link returned 404, removed partial artifact");
            return Err(DownloadError::not_found(&link.url));
        }
        416 if offset.is_some() => {
            finalize(partial, destination).await?;
            info!(path = %destination.display(), "server reports partial file complete");
            return Ok(TransferOutcome::FinalizedPartial);
        }
        status if !(200..300).contains(&status) => {
            return Err(DownloadError::http_status(&link.url, status));
        }
        _ => {}
    }

    // A 200 to a ranged request means the range was ignored.
    let append = offset.is_some() && response.status == 206;
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(partial)
        .await
        .map_err(|e| DownloadError::file_system(partial, e))?;

    let mut written: u64 = 0;
    while let Some(chunk) = response.chunks.next().await {
        if context.cancel.is_cancelled() {
            file.flush()
                .await
                .map_err(|e| DownloadError::file_system(partial, e))?;
            return Err(DownloadError::Cancelled);
        }
        let chunk = chunk?;
        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::file_system(partial, e))?;
        written += chunk.len() as u64;
        context.stats.add_bytes(chunk.len() as u64);
    }
    file.flush()
        .await
        .map_err(|e| DownloadError::file_system(partial, e))?;
    drop(file);

    finalize(partial, destination).await?;
    info!(path = %destination.display(), bytes = written, resumed = append, "download complete");
    Ok(if append {
        TransferOutcome::Resumed
    } else {
        TransferOutcome::Downloaded
    })
}

async fn exists(path: &Path) -> Result<bool, DownloadError> {
    fs::try_exists(path)
        .await
        .map_err(|e| DownloadError::file_system(path, e))
}

async fn finalize(partial: &Path, destination: &Path) -> Result<(), DownloadError> {
    fs::rename(partial, destination)
        .await
        .map_err(|e| DownloadError::file_system(destination, e))
}

async fn remove_if_present(path: &Path) -> Result<(), DownloadError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(DownloadError::file_system(path, e)),
    }
}
