//! First protocol phase: URL to file metadata.
//!
//! [`Resolver::resolve`] turns site URLs into [`FileDescriptor`]s. Folder URLs
//! in a multi-URL batch are split out and resolved one per request; the
//! remaining file URLs go out together in a single Download envelope.
//! Every descriptor seen is cached by id for the life of the resolver.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, info, instrument};
use url::Url;

use crate::protocol::{EntrySchema, FileEntryRecord, ResolveEntry, decode_file_entries};
use crate::session::{Session, SessionError};

/// Resolved metadata for one remote file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    /// Service file id.
    pub id: String,
    /// Agreement tier required to obtain a link.
    pub agreement_name: String,
    /// Cost to acknowledge; `None` for the free tier.
    pub cost: Option<u64>,
    /// Service "real" id.
    pub real_id: String,
    /// File name as published.
    pub name: String,
    /// Size in bytes.
    pub size_bytes: u64,
}

impl From<FileEntryRecord> for FileDescriptor {
    fn from(record: FileEntryRecord) -> Self {
        Self {
            id: record.id,
            agreement_name: record.agreement,
            cost: record.cost,
            real_id: record.real_id,
            name: record.name,
            size_bytes: record.size,
        }
    }
}

/// Resolves site URLs through a shared session.
#[derive(Debug)]
pub struct Resolver {
    session: Arc<Session>,
    cache: DashMap<String, FileDescriptor>,
}

impl Resolver {
    /// Creates a resolver with an empty cache.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            cache: DashMap::new(),
        }
    }

    /// Resolves `urls` into file descriptors in discovery order.
    ///
    /// When more than one URL is given, each extensionless URL is treated as a
    /// folder and resolved in its own request ahead of the file batch. An
    /// empty or unrecognizable response yields no descriptors.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if login or a round-trip fails.
    #[instrument(level = "debug", skip(self, urls), fields(urls = urls.len()))]
    pub async fn resolve(&self, urls: &[String]) -> Result<Vec<FileDescriptor>, SessionError> {
        let mut descriptors = Vec::new();
        let mut file_urls = Vec::with_capacity(urls.len());

        let split_folders = urls.len() > 1;
        for url in urls {
            if split_folders && is_folder_url(url) {
                debug!(url = %url, "resolving folder on its own");
                descriptors.extend(self.resolve_batch(std::slice::from_ref(url)).await?);
            } else {
                file_urls.push(url.clone());
            }
        }

        if !file_urls.is_empty() {
            descriptors.extend(self.resolve_batch(&file_urls).await?);
        }
        Ok(descriptors)
    }

    /// Returns a previously resolved descriptor.
    #[must_use]
    pub fn cached(&self, id: &str) -> Option<FileDescriptor> {
        self.cache.get(id).map(|entry| entry.value().clone())
    }

    /// Number of distinct descriptors resolved so far.
    #[must_use]
    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }

    async fn resolve_batch(&self, urls: &[String]) -> Result<Vec<FileDescriptor>, SessionError> {
        let endpoints = self.session.endpoints();
        let entries: Vec<ResolveEntry> = urls
            .iter()
            .map(|url| ResolveEntry {
                path: endpoints.lookup_key(url),
            })
            .collect();

        let body = self.session.download_call(&entries).await?;
        let descriptors: Vec<FileDescriptor> =
            decode_file_entries(&body, EntrySchema::Resolution)
                .into_iter()
                .map(FileDescriptor::from)
                .collect();

        for descriptor in &descriptors {
            self.cache
                .insert(descriptor.id.clone(), descriptor.clone());
        }
        info!(
            requested = urls.len(),
            found = descriptors.len(),
            "resolved file information"
        );
        Ok(descriptors)
    }
}

/// True when the URL's last path segment has no extension.
#[must_use]
pub fn is_folder_url(url: &str) -> bool {
    let last_segment = match Url::parse(url) {
        Ok(parsed) => parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back().map(str::to_string))
            .unwrap_or_default(),
        Err(_) => url
            .split(['?', '#'])
            .next()
            .unwrap_or("")
            .rsplit('/')
            .next()
            .unwrap_or("")
            .to_string(),
    };
    !matches!(last_segment.rsplit_once('.'), Some((_, ext)) if !ext.is_empty())
}
