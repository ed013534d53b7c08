//! Inbound payload decoders.
//!
//! None of these functions fail: a payload that matches nothing decodes to
//! `None` or an empty list, and the caller decides whether that matters.

use tracing::trace;

use super::FREE_AGREEMENT;
use super::extract::{
    AUTH_STATUS, AUTH_TOKEN, FOLDERS_LIST, GLOBAL_ID, HREF, LINK_ENTRY, RESOLVED_ENTRY, Record,
    SERVER_STAMP,
};

/// Which file entry layout a response uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySchema {
    /// Resolution response: entries carry agreement tier and cost.
    Resolution,
    /// Planning response: entries carry a signed URL or a nil URL marker.
    Link,
}

/// A file entry as decoded from a service response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntryRecord {
    /// Service file id.
    pub id: String,
    /// Agreement tier name. Empty for [`EntrySchema::Link`] entries.
    pub agreement: String,
    /// Cost for non-free tiers.
    pub cost: Option<u64>,
    /// Service "real" id.
    pub real_id: String,
    /// File name.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
}

/// A planning-response entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRecord {
    /// The decoded file entry.
    pub entry: FileEntryRecord,
    /// Unescaped signed URL, or `None` when the service sent a nil marker.
    pub url: Option<String>,
}

/// Everything a planning response yields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkBatch {
    /// Folder path shared by the batch, printable ASCII only, no leading `/`.
    pub remote_path: String,
    /// Entries in document order.
    pub links: Vec<LinkRecord>,
}

/// Extracts the session token from an Auth response.
///
/// Returns `None` when the token element is missing or empty.
#[must_use]
pub fn decode_auth_response(body: &str) -> Option<String> {
    AUTH_TOKEN
        .first(body)
        .map(|record| record.text("token").to_string())
        .filter(|token| !token.is_empty())
}

/// Extracts the upper-cased `<a:status>` of an Auth response.
#[must_use]
pub fn decode_auth_status(body: &str) -> Option<String> {
    AUTH_STATUS
        .first(body)
        .map(|record| record.text("status").trim().to_uppercase())
}

/// Extracts the server-side sequence stamp, if the response carries one.
#[must_use]
pub fn decode_server_stamp(body: &str) -> Option<u64> {
    SERVER_STAMP
        .first(body)
        .and_then(|record| record.text("stamp").parse().ok())
}

/// Decodes every file entry of `body` using the given layout.
#[must_use]
pub fn decode_file_entries(body: &str, schema: EntrySchema) -> Vec<FileEntryRecord> {
    match schema {
        EntrySchema::Resolution => RESOLVED_ENTRY
            .all(body)
            .iter()
            .map(resolved_entry)
            .collect(),
        EntrySchema::Link => decode_link_records(body)
            .into_iter()
            .map(|link| link.entry)
            .collect(),
    }
}

/// Decodes a planning response: shared folder path plus per-file links.
#[must_use]
pub fn decode_download_links(body: &str) -> LinkBatch {
    let remote_path = GLOBAL_ID
        .first(body)
        .map(|record| clean_remote_path(record.text("path")))
        .unwrap_or_default();

    LinkBatch {
        remote_path,
        links: decode_link_records(body),
    }
}

/// Extracts subfolder link targets from a site folder page.
///
/// Only the first `foldersList` block is considered. Targets are returned
/// unescaped and as written on the page (usually site-relative).
#[must_use]
pub fn decode_folder_links(html: &str) -> Vec<String> {
    let Some(block) = FOLDERS_LIST.first(html) else {
        return Vec::new();
    };
    HREF.all(block.text("body"))
        .iter()
        .map(|record| unescape_entities(record.text("href")))
        .filter(|href| !href.is_empty())
        .collect()
}

/// Decodes the HTML entities the service escapes inside text values.
#[must_use]
pub fn unescape_entities(value: &str) -> String {
    const ENTITIES: [(&str, char); 7] = [
        ("&amp;", '&'),
        ("&quot;", '"'),
        ("&lt;", '<'),
        ("&gt;", '>'),
        ("&#039;", '\''),
        ("&#39;", '\''),
        ("&apos;", '\''),
    ];

    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(pos) = rest.find('&') {
        out.push_str(&rest[..pos]);
        rest = &rest[pos..];
        match ENTITIES
            .iter()
            .find(|(entity, _)| rest.starts_with(entity))
        {
            Some((entity, ch)) => {
                out.push(*ch);
                rest = &rest[entity.len()..];
            }
            None => {
                out.push('&');
                rest = &rest[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

fn decode_link_records(body: &str) -> Vec<LinkRecord> {
    LINK_ENTRY
        .all(body)
        .iter()
        .map(|record| LinkRecord {
            entry: FileEntryRecord {
                id: record.text("id").to_string(),
                agreement: String::new(),
                cost: None,
                real_id: record.text("real_id").to_string(),
                name: unescape_entities(record.text("name")),
                size: parse_size(record),
            },
            url: record
                .get("url")
                .map(unescape_entities)
                .filter(|url| !url.is_empty()),
        })
        .collect()
}

fn resolved_entry(record: &Record<'_>) -> FileEntryRecord {
    let agreement = record.text("agreement").to_string();
    let cost = if agreement == FREE_AGREEMENT {
        None
    } else {
        record.get("cost").and_then(|cost| cost.parse().ok())
    };
    FileEntryRecord {
        id: record.text("id").to_string(),
        agreement,
        cost,
        real_id: record.text("real_id").to_string(),
        name: unescape_entities(record.text("name")),
        size: parse_size(record),
    }
}

fn parse_size(record: &Record<'_>) -> u64 {
    let raw = record.text("size").trim();
    raw.parse().unwrap_or_else(|_| {
        trace!(size = raw, "unparseable file size, treating as zero");
        0
    })
}

/// Drops the leading `/`, decodes entities and keeps printable ASCII only.
fn clean_remote_path(raw: &str) -> String {
    let without_root = raw.get(1..).unwrap_or("");
    unescape_entities(without_root)
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const RESOLVE_RESPONSE: &str = concat!(
        r#"<s:Envelope><s:Body><DownloadResponse><DownloadResult><a:messageSequence><stamp>5100</stamp></a:messageSequence>"#,
        r#"<a:list><FileEntry><id>101</id><agreementInfo><AgreementInfo><name>small</name><cost>0</cost></AgreementInfo></agreementInfo>"#,
        r#"<realId>9001</realId><name>a.pdf</name><size>1024</size></FileEntry>"#,
        r#"<FileEntry><id>102</id><agreementInfo><AgreementInfo><name>transfer</name><cost>2048</cost></AgreementInfo></agreementInfo>"#,
        r#"<realId>9002</realId><name>b &amp; c.docx</name><size>2048</size></FileEntry></a:list>"#,
        r#"</DownloadResult></DownloadResponse></s:Body></s:Envelope>"#,
    );

    const LINK_RESPONSE: &str = concat!(
        r#"<s:Envelope><s:Body><DownloadResponse><globalId>/chomikoryba/Fonty ł</globalId>"#,
        r#"<FileEntry><id>101</id><realId>9001</realId><name>a.pdf</name><size>1024</size>"#,
        r#"<url>http://s.example/get?id=101&amp;sig=x</url></FileEntry>"#,
        r#"<FileEntry><id>102</id><realId>9002</realId><name>b.docx</name><size>0</size>"#,
        r#"<url i:nil="true"/></FileEntry>"#,
        r#"</DownloadResponse></s:Body></s:Envelope>"#,
    );

    #[test]
    fn test_decode_auth_response_token() {
        let body = "<a:status>Ok</a:status><a:token>abc-123</a:token>";
        assert_eq!(decode_auth_response(body), Some("abc-123".to_string()));
        assert_eq!(decode_auth_status(body), Some("OK".to_string()));
    }

    #[test]
    fn test_decode_auth_response_empty_token_is_none() {
        assert_eq!(decode_auth_response("<a:token></a:token>"), None);
        assert_eq!(decode_auth_response("garbage"), None);
    }

    #[test]
    fn test_decode_server_stamp() {
        assert_eq!(decode_server_stamp(RESOLVE_RESPONSE), Some(5100));
        assert_eq!(decode_server_stamp("<a:messageSequence/>"), None);
    }

    #[test]
    fn test_decode_resolution_entries() {
        let entries = decode_file_entries(RESOLVE_RESPONSE, EntrySchema::Resolution);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "101");
        assert_eq!(entries[0].agreement, "small");
        assert_eq!(entries[0].cost, None);
        assert_eq!(entries[0].real_id, "9001");
        assert_eq!(entries[0].size, 1024);
        assert_eq!(entries[1].agreement, "transfer");
        assert_eq!(entries[1].cost, Some(2048));
        assert_eq!(entries[1].name, "b & c.docx");
    }

    #[test]
    fn test_decode_resolution_entry_without_cost() {
        let body = concat!(
            r#"<FileEntry><id>5</id><agreementInfo><AgreementInfo><name>small</name></AgreementInfo></agreementInfo>"#,
            r#"<realId>6</realId><name>x.txt</name><size>1</size></FileEntry>"#,
        );
        let entries = decode_file_entries(body, EntrySchema::Resolution);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].cost, None);
    }

    #[test]
    fn test_decode_malformed_payload_is_empty() {
        assert!(decode_file_entries("<FileEntry><id>1", EntrySchema::Resolution).is_empty());
        assert!(decode_download_links("").links.is_empty());
        assert!(decode_folder_links("<html></html>").is_empty());
    }

    #[test]
    fn test_decode_download_links_unescapes_and_marks_nil() {
        let batch = decode_download_links(LINK_RESPONSE);
        assert_eq!(batch.remote_path, "chomikoryba/Fonty ");
        assert_eq!(batch.links.len(), 2);
        assert_eq!(
            batch.links[0].url.as_deref(),
            Some("http://s.example/get?id=101&sig=x")
        );
        assert_eq!(batch.links[1].url, None);
        assert_eq!(batch.links[1].entry.name, "b.docx");
    }

    #[test]
    fn test_decode_link_schema_entries() {
        let entries = decode_file_entries(LINK_RESPONSE, EntrySchema::Link);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.agreement.is_empty()));
    }

    #[test]
    fn test_decode_folder_links_reads_first_block_only() {
        let html = concat!(
            r#"<div id="foldersList"><a href="/user/Docs">Docs</a>"#,
            "\n",
            r#"<a href="/user/Fonts?x=1&amp;y=2">Fonts</a></div>"#,
            r#"<div id="fileList"><a href="/user/file,1.pdf">f</a></div>"#,
        );
        assert_eq!(
            decode_folder_links(html),
            vec!["/user/Docs".to_string(), "/user/Fonts?x=1&y=2".to_string()]
        );
    }

    #[test]
    fn test_unescape_entities_single_pass() {
        assert_eq!(unescape_entities("a&amp;lt;b"), "a&lt;b");
        assert_eq!(unescape_entities("&quot;x&quot; &#039;y&#039;"), "\"x\" 'y'");
        assert_eq!(unescape_entities("lone & sign"), "lone & sign");
    }
}
