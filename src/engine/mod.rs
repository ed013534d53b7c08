//! Run orchestration: resolve, plan and transfer, then descend into subfolders.
//!
//! Folder traversal is a worklist of URL batches plus a visited set keyed by
//! normalized URL. A folder page that links back to an ancestor is therefore
//! visited only once.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use url::Url;

use crate::download::{
    DownloadError, FolderCrawler, TransferExecutor, TransferOptions, TransferSummary,
};
use crate::planner::{DownloadPlanner, ExtensionFilter};
use crate::resolver::Resolver;
use crate::session::Session;

/// Options for one [`Engine::download`] run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOptions {
    /// Allowed extensions; empty allows everything.
    pub extensions: ExtensionFilter,
    /// Descend into subfolders listed on each batch URL's page.
    pub recursive: bool,
    /// Destination and write behavior.
    pub transfer: TransferOptions,
}

/// What a run did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// URL batches processed (the input batch plus one per crawled folder page).
    pub batches: usize,
    /// Batches abandoned because resolution or planning failed.
    pub failed_batches: usize,
    /// Distinct URLs seen.
    pub urls_visited: usize,
    /// File descriptors returned by resolution.
    pub files_resolved: usize,
    /// Links planned after filtering.
    pub links_planned: usize,
    /// Transfer counters.
    pub transfer: TransferSummary,
}

/// Ties resolver, planner, executor and crawler to one session.
#[derive(Debug)]
pub struct Engine {
    session: Arc<Session>,
    resolver: Resolver,
    planner: DownloadPlanner,
    crawler: FolderCrawler,
}

impl Engine {
    /// Creates an engine over `session`.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            resolver: Resolver::new(Arc::clone(&session)),
            planner: DownloadPlanner::new(Arc::clone(&session)),
            crawler: FolderCrawler::new(Arc::clone(&session)),
            session,
        }
    }

    /// Returns the underlying session.
    #[must_use]
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Returns the resolver and its descriptor cache.
    #[must_use]
    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    /// Downloads everything reachable from `urls`.
    ///
    /// An empty `urls` list is a successful no-op and does not log in.
    /// Failures scoped to one file or one batch are logged and counted.
    ///
    /// # Errors
    ///
    /// Returns the first fatal [`DownloadError`]: login failure, a file-system
    /// failure, or cancellation.
    #[instrument(skip(self, urls, options), fields(urls = urls.len(), recursive = options.recursive))]
    pub async fn download(
        &self,
        urls: &[String],
        options: &DownloadOptions,
    ) -> Result<RunSummary, DownloadError> {
        let mut summary = RunSummary::default();
        if urls.is_empty() {
            info!("no URLs given, nothing to do");
            return Ok(summary);
        }

        self.session.ensure_authenticated().await?;

        let executor = TransferExecutor::new(
            Arc::clone(self.session.transport()),
            options.transfer.clone(),
            self.session.cancellation().clone(),
        );

        let mut visited = HashSet::new();
        let mut worklist = VecDeque::new();
        let first = unvisited(urls.iter().cloned(), &mut visited);
        if !first.is_empty() {
            worklist.push_back(first);
        }

        while let Some(batch) = worklist.pop_front() {
            if self.session.cancellation().is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            summary.batches += 1;
            debug!(batch = summary.batches, urls = batch.len(), "processing batch");

            match self.run_batch(&batch, options, &executor).await {
                Ok((resolved, planned)) => {
                    summary.files_resolved += resolved;
                    summary.links_planned += planned;
                }
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!(error = %error, "batch failed, continuing");
                    summary.failed_batches += 1;
                }
            }

            if options.recursive {
                for url in &batch {
                    match self.crawler.subfolders(url).await {
                        Ok(folders) => {
                            let next = unvisited(folders, &mut visited);
                            if !next.is_empty() {
                                debug!(parent = %url, folders = next.len(), "queued subfolders");
                                worklist.push_back(next);
                            }
                        }
                        Err(error) => {
                            let error = DownloadError::from(error);
                            if error.is_fatal() {
                                return Err(error);
                            }
                            warn!(url = %url, error = %error, "could not read folder page");
                        }
                    }
                }
            }
        }

        summary.urls_visited = visited.len();
        summary.transfer = executor.stats().snapshot();
        info!(
            batches = summary.batches,
            resolved = summary.files_resolved,
            planned = summary.links_planned,
            downloaded = summary.transfer.downloaded,
            resumed = summary.transfer.resumed,
            skipped = summary.transfer.skipped,
            not_found = summary.transfer.not_found,
            failed = summary.transfer.failed,
            "run complete"
        );
        Ok(summary)
    }

    async fn run_batch(
        &self,
        batch: &[String],
        options: &DownloadOptions,
        executor: &TransferExecutor,
    ) -> Result<(usize, usize), DownloadError> {
        let descriptors = self.resolver.resolve(batch).await?;
        let links = self.planner.plan(&descriptors, &options.extensions).await?;
        let counts = (descriptors.len(), links.len());
        executor.transfer(links).await?;
        Ok(counts)
    }
}

/// Visited-set key: parsed URL without fragment or trailing `/`.
#[must_use]
pub fn normalize_url(url: &str) -> String {
    let trimmed = url.trim();
    match Url::parse(trimmed) {
        Ok(mut parsed) => {
            parsed.set_fragment(None);
            parsed.as_str().trim_end_matches('/').to_string()
        }
        Err(_) => trimmed.trim_end_matches('/').to_string(),
    }
}

fn unvisited(urls: impl IntoIterator<Item = String>, visited: &mut HashSet<String>) -> Vec<String> {
    urls.into_iter()
        .filter(|url| !url.trim().is_empty())
        .filter(|url| visited.insert(normalize_url(url)))
        .collect()
}
