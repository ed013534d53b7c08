//! Outbound SOAP envelopes.
//!
//! The service does not version its schema, so element names, order and the
//! absence of whitespace between elements must stay exactly as written here.

use std::fmt::Write as _;

use crate::session::Credentials;

use super::FREE_AGREEMENT;

const ENVELOPE_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8"?>"#,
    r#"<s:Envelope xmlns:s="http://schemas.xmlsoap.org/soap/envelope/" s:encodingStyle="http://schemas.xmlsoap.org/soap/encoding/">"#,
    "<s:Body>",
);

const ENVELOPE_CLOSE: &str = "</s:Body></s:Envelope>";

/// Protocol version announced in the Auth call.
const AUTH_PROTOCOL_VERSION: u32 = 4;

/// Client identity announced in the Auth call.
const CLIENT_NAME: &str = "chomikbox";
const CLIENT_VERSION: &str = "2.0.7.9";

/// Value of the `disposition` element of a Download call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Request download metadata / links.
    Download,
}

impl Disposition {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Download => "download",
        }
    }
}

/// Resolution-phase list entry: a path below the site root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveEntry {
    /// Lookup key, starting with `/`.
    pub path: String,
}

/// Planning-phase list entry: a file id plus its cost acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanEntry {
    /// Service file id.
    pub id: String,
    /// Agreement tier name echoed back to the service.
    pub agreement: String,
    /// Cost echoed back for non-free tiers.
    pub cost: Option<u64>,
}

/// Entries that can appear in a Download call's `list` element.
pub trait ListEntry {
    /// Appends this entry's `DownloadReqEntry` element to `out`.
    fn write_entry(&self, out: &mut String);
}

impl ListEntry for ResolveEntry {
    fn write_entry(&self, out: &mut String) {
        let _ = write!(
            out,
            "<DownloadReqEntry><id>{}</id></DownloadReqEntry>",
            escape_text(&self.path)
        );
    }
}

impl ListEntry for PlanEntry {
    fn write_entry(&self, out: &mut String) {
        let _ = write!(
            out,
            "<DownloadReqEntry><id>{}</id><agreementInfo><AgreementInfo><name>{}</name>",
            escape_text(&self.id),
            escape_text(&self.agreement)
        );
        if self.agreement != FREE_AGREEMENT
            && let Some(cost) = self.cost
        {
            let _ = write!(out, "<cost>{cost}</cost>");
        }
        out.push_str("</AgreementInfo></agreementInfo></DownloadReqEntry>");
    }
}

/// Builds the Auth envelope.
#[must_use]
pub fn encode_auth_request(credentials: &Credentials) -> String {
    let mut out = String::with_capacity(512);
    out.push_str(ENVELOPE_OPEN);
    let _ = write!(
        out,
        r#"<Auth xmlns="http://chomikuj.pl/"><name>{}</name><passHash>{}</passHash><ver>{AUTH_PROTOCOL_VERSION}</ver><client><name>{CLIENT_NAME}</name><version>{CLIENT_VERSION}</version></client></Auth>"#,
        escape_text(credentials.username()),
        credentials.password_hash(),
    );
    out.push_str(ENVELOPE_CLOSE);
    out
}

/// Builds a Download envelope carrying `entries`.
#[must_use]
pub fn encode_download_request<E: ListEntry>(
    token: &str,
    stamp: u64,
    entries: &[E],
    disposition: Disposition,
) -> String {
    let mut out = String::with_capacity(512 + entries.len() * 128);
    out.push_str(ENVELOPE_OPEN);
    let _ = write!(
        out,
        r#"<Download xmlns="http://chomikuj.pl/"><token>{}</token><sequence><stamp>{stamp}</stamp><part>0</part><count>1</count></sequence><disposition>{}</disposition><list>"#,
        escape_text(token),
        disposition.as_str(),
    );
    for entry in entries {
        entry.write_entry(&mut out);
    }
    out.push_str("</list></Download>");
    out.push_str(ENVELOPE_CLOSE);
    out
}

/// Escapes XML text content. Ordinary values pass through unchanged.
fn escape_text(value: &str) -> std::borrow::Cow<'_, str> {
    if !value.contains(['&', '<', '>']) {
        return std::borrow::Cow::Borrowed(value);
    }
    let mut escaped = String::with_capacity(value.len() + 8);
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            c => escaped.push(c),
        }
    }
    std::borrow::Cow::Owned(escaped)
}
