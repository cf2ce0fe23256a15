//! The ESMTP extension keyword table (§4.2) and EHLO response parser.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical (uppercase) extension keywords this crate knows about. Any other keyword a peer
/// advertises is retained in [`Extensions`] under its own uppercased spelling.
pub const STARTTLS: &str = "STARTTLS";
pub const AUTH: &str = "AUTH";
pub const SIZE: &str = "SIZE";
pub const PIPELINING: &str = "PIPELINING";
pub const EIGHT_BIT_MIME: &str = "8BITMIME";
pub const DSN: &str = "DSN";
pub const ENHANCED_STATUS_CODES: &str = "ENHANCEDSTATUSCODES";
pub const SMTP_UTF8: &str = "SMTPUTF8";
pub const CHUNKING: &str = "CHUNKING";

/// A case-insensitive keyword→parameter map, as advertised in an EHLO response.
///
/// Keys are stored canonicalized to uppercase; a keyword with no parameter text (e.g. bare
/// `PIPELINING`) maps to an empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Extensions(HashMap<String, String>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, keyword: impl AsRef<str>, param: impl Into<String>) {
        self.0.insert(keyword.as_ref().to_ascii_uppercase(), param.into());
    }

    pub fn get(&self, keyword: &str) -> Option<&str> {
        self.0.get(&keyword.to_ascii_uppercase()).map(String::as_str)
    }

    pub fn has(&self, keyword: &str) -> bool {
        self.0.contains_key(&keyword.to_ascii_uppercase())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The numeric SIZE parameter, or 0 if SIZE is absent or unparseable.
    pub fn max_size(&self) -> usize {
        self.get(SIZE).and_then(|s| s.trim().parse().ok()).unwrap_or(0)
    }

    /// Parses a full EHLO response body (the reply's text lines, greeting line included).
    /// The first line (the greeting + hostname) is skipped; each remaining line is split at
    /// its first space into keyword and parameter. Duplicate keywords: last one wins.
    pub fn parse_ehlo_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        let mut extensions = Self::new();
        for line in lines.into_iter().skip(1) {
            let (keyword, param) = match line.split_once(' ') {
                Some((k, p)) => (k, p),
                None => (line, ""),
            };
            if keyword.is_empty() {
                continue;
            }
            extensions.insert(keyword, param);
        }
        extensions
    }
}
