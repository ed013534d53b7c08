//! Second protocol phase: file metadata to signed download links.
//!
//! Each descriptor is sent back to the service with its agreement tier (and
//! cost, for paid tiers) to obtain a time-limited URL plus the folder path
//! the file lives in. The service only answers reliably one file at a time,
//! hence [`PLAN_BATCH_SIZE`].

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::protocol::{LinkRecord, PlanEntry, decode_download_links};
use crate::resolver::FileDescriptor;
use crate::session::{Session, SessionError};

/// Descriptors per planning request. A protocol constraint, not a tuning knob.
pub const PLAN_BATCH_SIZE: usize = 1;

/// Allowed file extensions. Empty means every file is allowed.
///
/// Matching is exact and case-sensitive against the text after the last `.`
/// of the file name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionFilter {
    allowed: HashSet<String>,
}

impl ExtensionFilter {
    /// Builds a filter, dropping blanks and any leading dots.
    pub fn new<I, S>(extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed = extensions
            .into_iter()
            .map(|ext| ext.as_ref().trim().trim_start_matches('.').to_string())
            .filter(|ext| !ext.is_empty())
            .collect();
        Self { allowed }
    }

    /// A filter that allows everything.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// True when no restriction applies.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_empty()
    }

    /// True when `file_name` passes the filter.
    #[must_use]
    pub fn allows(&self, file_name: &str) -> bool {
        self.is_unrestricted() || self.allowed.contains(extension_of(file_name))
    }
}

/// A planned transfer for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadLink {
    /// Descriptor the link was planned from.
    pub source: FileDescriptor,
    /// Signed file URL.
    pub url: String,
    /// Remote folder path, printable ASCII, `/`-separated.
    pub remote_path: String,
    /// File name to store under.
    pub name: String,
    /// Size the finished file must have.
    pub expected_size: u64,
}

impl DownloadLink {
    /// Final destination under `root`.
    ///
    /// With `use_structure` the remote folder path is recreated below `root`.
    /// `.` and `..` segments are dropped, so the result never escapes `root`.
    #[must_use]
    pub fn destination_path(&self, root: &Path, use_structure: bool) -> PathBuf {
        let mut path = root.to_path_buf();
        if use_structure {
            for segment in self.remote_path.split(['/', '\\']) {
                if !matches!(segment.trim(), "" | "." | "..") {
                    path.push(segment);
                }
            }
        }
        path.push(safe_file_name(&self.name));
        path
    }
}

/// Plans download links through a shared session.
#[derive(Debug)]
pub struct DownloadPlanner {
    session: Arc<Session>,
}

impl DownloadPlanner {
    /// Creates a planner.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Obtains signed links for `descriptors`, in input order.
    ///
    /// Files without a link (nil URL) are dropped with a warning. Files whose
    /// extension is not allowed by `filter` are dropped silently.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if login or a round-trip fails.
    #[instrument(level = "debug", skip(self, descriptors, filter), fields(files = descriptors.len()))]
    pub async fn plan(
        &self,
        descriptors: &[FileDescriptor],
        filter: &ExtensionFilter,
    ) -> Result<Vec<DownloadLink>, SessionError> {
        let mut links = Vec::with_capacity(descriptors.len());

        for batch in descriptors.chunks(PLAN_BATCH_SIZE) {
            let entries: Vec<PlanEntry> = batch
                .iter()
                .map(|descriptor| PlanEntry {
                    id: descriptor.id.clone(),
                    agreement: descriptor.agreement_name.clone(),
                    cost: descriptor.cost,
                })
                .collect();

            let body = self.session.download_call(&entries).await?;
            let decoded = decode_download_links(&body);
            debug!(
                remote_path = %decoded.remote_path,
                links = decoded.links.len(),
                "planned batch"
            );

            for record in decoded.links {
                if !filter.allows(&record.entry.name) {
                    debug!(name = %record.entry.name, "extension not allowed, skipping");
                    continue;
                }
                if let Some(link) = into_link(record, batch, &decoded.remote_path) {
                    links.push(link);
                }
            }
        }
        Ok(links)
    }
}

fn into_link(record: LinkRecord, batch: &[FileDescriptor], remote_path: &str) -> Option<DownloadLink> {
    let Some(url) = record.url else {
        warn!(id = %record.entry.id, name = %record.entry.name, "no download link, dropping");
        return None;
    };
    let source = batch
        .iter()
        .find(|descriptor| descriptor.id == record.entry.id)
        .cloned()
        .unwrap_or_else(|| FileDescriptor::from(record.entry.clone()));
    Some(DownloadLink {
        source,
        url,
        remote_path: remote_path.to_string(),
        name: record.entry.name,
        expected_size: record.entry.size,
    })
}

/// Text after the last `.`, or empty.
fn extension_of(file_name: &str) -> &str {
    file_name.rsplit_once('.').map_or("", |(_, ext)| ext)
}

fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
        .collect();
    match cleaned.trim() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
