//! ChomikBox wire protocol codec.
//!
//! Outbound traffic is two fixed SOAP envelopes ([`encode_auth_request`] and
//! [`encode_download_request`]). Inbound payloads are decoded by a small set of
//! named extraction rules (see [`extract`]) rather than an XML parser: the
//! service does not always return well-formed XML, and a decoder that finds
//! nothing returns an empty result instead of failing.

mod decode;
mod envelope;
pub mod extract;

pub use decode::{
    EntrySchema, FileEntryRecord, LinkBatch, LinkRecord, decode_auth_response,
    decode_auth_status, decode_download_links, decode_file_entries, decode_folder_links,
    decode_server_stamp, unescape_entities,
};
pub use envelope::{
    Disposition, ListEntry, PlanEntry, ResolveEntry, encode_auth_request, encode_download_request,
};

use url::Url;

/// Public ChomikBox service endpoint.
pub const DEFAULT_SERVICE_URL: &str = "http://box.chomikuj.pl/services/ChomikBoxService.svc";

/// Public site root that human-facing folder and file URLs live under.
pub const DEFAULT_SITE_URL: &str = "http://chomikuj.pl/";

/// SOAP action header value for the Auth call.
pub const SOAP_ACTION_AUTH: &str = "http://chomikuj.pl/IChomikBoxService/Auth";

/// SOAP action header value for the Download call.
pub const SOAP_ACTION_DOWNLOAD: &str = "http://chomikuj.pl/IChomikBoxService/Download";

/// Agreement tier that is free and carries no cost acknowledgment.
pub const FREE_AGREEMENT: &str = "small";

/// Headers sent with every service envelope, after `SOAPAction`.
pub const SERVICE_HEADERS: [(&str, &str); 4] = [
    ("Content-Type", "text/xml;charset=utf-8"),
    ("Connection", "Keep-Alive"),
    ("Accept-Language", "pl-PL,en,*"),
    ("User-Agent", "Mozilla/5.0"),
];

/// Headers sent with every file body request, before `Range`.
pub const FILE_HEADERS: [(&str, &str); 4] = [
    ("Icy-MetaData", "1"),
    ("Connection", "Keep-Alive"),
    ("Accept-Language", "pl-PL,en,*"),
    ("User-Agent", "Mozilla/5.0"),
];

/// Service and site locations.
///
/// Both default to the public service; tests point them at a mock server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// URL that receives SOAP envelopes.
    pub service_url: String,
    /// Site root that user URLs are relative to. Always ends with `/`.
    pub site_url: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            service_url: DEFAULT_SERVICE_URL.to_string(),
            site_url: DEFAULT_SITE_URL.to_string(),
        }
    }
}

impl Endpoints {
    /// Creates endpoints, normalizing the site root to end with `/`.
    #[must_use]
    pub fn new(service_url: impl Into<String>, site_url: impl Into<String>) -> Self {
        let mut site_url = site_url.into();
        if !site_url.ends_with('/') {
            site_url.push('/');
        }
        Self {
            service_url: service_url.into(),
            site_url,
        }
    }

    /// Returns the service lookup key for a user URL: `/` + path below the site root.
    ///
    /// URLs outside the site root fall back to their own path.
    #[must_use]
    pub fn lookup_key(&self, url: &str) -> String {
        if let Some(rest) = url.strip_prefix(self.site_url.as_str()) {
            return format!("/{rest}");
        }
        Url::parse(url).map_or_else(
            |_| format!("/{}", url.trim_start_matches('/')),
            |parsed| parsed.path().to_string(),
        )
    }

    /// Turns an `href` found on a site page into an absolute URL.
    #[must_use]
    pub fn absolutize(&self, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        let origin = self.site_url.trim_end_matches('/');
        if href.starts_with('/') {
            format!("{origin}{href}")
        } else {
            format!("{origin}/{href}")
        }
    }
}
