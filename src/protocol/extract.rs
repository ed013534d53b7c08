//! Tolerant field extraction.
//!
//! Each response type is decoded by a fixed set of named [`ExtractionRule`]s.
//! A rule is a pattern with named capture groups; matching never fails, it
//! just yields zero or more [`Record`]s.

use std::sync::LazyLock;

use regex::{Captures, Regex};

/// A named pattern that pulls fields out of loosely structured markup.
#[derive(Debug)]
pub struct ExtractionRule {
    name: &'static str,
    pattern: Regex,
}

impl ExtractionRule {
    /// Compiles a rule.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is not a valid regex. Rules are static patterns
    /// compiled once, so this only fires on a programming error.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new(name: &'static str, pattern: &str) -> Self {
        Self {
            name,
            pattern: Regex::new(pattern).expect("extraction rule pattern is valid"), // Static pattern, safe to panic
        }
    }

    /// Returns the rule's name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the first match, if any.
    #[must_use]
    pub fn first<'t>(&self, text: &'t str) -> Option<Record<'t>> {
        self.pattern.captures(text).map(Record)
    }

    /// Returns every non-overlapping match in document order.
    #[must_use]
    pub fn all<'t>(&self, text: &'t str) -> Vec<Record<'t>> {
        self.pattern.captures_iter(text).map(Record).collect()
    }
}

/// One match of an [`ExtractionRule`].
#[derive(Debug)]
pub struct Record<'t>(Captures<'t>);

impl<'t> Record<'t> {
    /// Returns the named field, or `None` if the group did not participate.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&'t str> {
        self.0.name(field).map(|m| m.as_str())
    }

    /// Returns the named field, or an empty string.
    #[must_use]
    pub fn text(&self, field: &str) -> &'t str {
        self.get(field).unwrap_or("")
    }
}

/// `<a:token>` of an Auth response.
pub static AUTH_TOKEN: LazyLock<ExtractionRule> =
    LazyLock::new(|| ExtractionRule::new("auth_token", r"<a:token>(?P<token>.*?)</a:token>"));

/// `<a:status>` of an Auth response.
pub static AUTH_STATUS: LazyLock<ExtractionRule> = LazyLock::new(|| {
    ExtractionRule::new("auth_status", r"(?s)<a:status>(?P<status>.*?)</a:status>")
});

/// Server-side sequence stamp echoed in any service response.
pub static SERVER_STAMP: LazyLock<ExtractionRule> = LazyLock::new(|| {
    ExtractionRule::new(
        "server_stamp",
        r"<a:messageSequence><stamp>(?P<stamp>\d+)</stamp>",
    )
});

/// File entry of a resolution response.
pub static RESOLVED_ENTRY: LazyLock<ExtractionRule> = LazyLock::new(|| {
    ExtractionRule::new(
        "resolved_entry",
        concat!(
            r"<FileEntry><id>(?P<id>\d+)</id><agreementInfo>.*?",
            r"<AgreementInfo><name>(?P<agreement>.*?)</name>(?:<cost>(?P<cost>\d+)</cost>)?</AgreementInfo>.*?",
            r"<realId>(?P<real_id>.*?)</realId>.*?",
            r"<name>(?P<name>.*?)</name><size>(?P<size>.*?)</size>.*?</FileEntry>",
        ),
    )
});

/// File entry of a planning response, with a URL or a nil URL marker.
pub static LINK_ENTRY: LazyLock<ExtractionRule> = LazyLock::new(|| {
    ExtractionRule::new(
        "link_entry",
        concat!(
            r"<FileEntry>.*?<id>(?P<id>.*?)</id>.*?",
            r"<realId>(?P<real_id>.*?)</realId>.*?",
            r"<name>(?P<name>.*?)</name><size>(?P<size>.*?)</size>.*?",
            r#"(?:<url i:nil="true"/>|<url>(?P<url>.*?)</url>).*?</FileEntry>"#,
        ),
    )
});

/// Folder path shared by all entries of a planning response.
pub static GLOBAL_ID: LazyLock<ExtractionRule> =
    LazyLock::new(|| ExtractionRule::new("global_id", r"<globalId>(?P<path>.*?)</globalId>"));

/// Subfolder list block of a site folder page.
pub static FOLDERS_LIST: LazyLock<ExtractionRule> = LazyLock::new(|| {
    ExtractionRule::new(
        "folders_list",
        r#"(?s)<div id="foldersList">(?P<body>.*?)</div>"#,
    )
});

/// Link target inside a folder list block.
pub static HREF: LazyLock<ExtractionRule> =
    LazyLock::new(|| ExtractionRule::new("href", r#"(?s)href="(?P<href>.*?)""#));
