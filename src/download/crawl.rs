//! Subfolder discovery on site folder pages.

use std::sync::Arc;

use tracing::{debug, instrument};

use crate::protocol::decode_folder_links;
use crate::session::{Session, SessionError};

/// Finds subfolder URLs by reading a folder's page through the session.
#[derive(Debug)]
pub struct FolderCrawler {
    session: Arc<Session>,
}

impl FolderCrawler {
    /// Creates a crawler.
    #[must_use]
    pub fn new(session: Arc<Session>) -> Self {
        Self { session }
    }

    /// Returns the absolute URLs listed in the page's folder list.
    ///
    /// A page without a folder list yields no URLs.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError`] if the page cannot be fetched.
    #[instrument(level = "debug", skip(self))]
    pub async fn subfolders(&self, url: &str) -> Result<Vec<String>, SessionError> {
        let page = self.session.fetch_page(url).await?;
        let endpoints = self.session.endpoints();
        let folders: Vec<String> = decode_folder_links(&page)
            .iter()
            .map(|href| endpoints.absolutize(href))
            .collect();
        debug!(found = folders.len(), "discovered subfolders");
        Ok(folders)
    }
}
