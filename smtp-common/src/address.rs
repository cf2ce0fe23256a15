//! RFC 5321 §4.1.2 mailbox, reverse-path, and forward-path parsing.
//!
//! This parser is deliberately independent of any general-purpose RFC 5322 mailbox library:
//! `MAIL FROM`/`RCPT TO` syntax is stricter (no display names, no comments, no folding) and a
//! permissive header-style parser accepts input this protocol must reject.

use core::fmt::{self, Display, Formatter};
use std::net::{Ipv4Addr, Ipv6Addr};

const MAX_PATH_LEN: usize = 256;
const MAX_LOCAL_PART_LEN: usize = 64;
const MAX_DOMAIN_LEN: usize = 255;
const MAX_LABEL_LEN: usize = 63;

#[derive(Debug, thiserror::Error, PartialEq, Eq, Clone)]
pub enum AddressError {
    #[error("path is empty")]
    Empty,
    #[error("path exceeds {MAX_PATH_LEN} octets")]
    PathTooLong,
    #[error("local part exceeds {MAX_LOCAL_PART_LEN} octets")]
    LocalPartTooLong,
    #[error("domain exceeds {MAX_DOMAIN_LEN} octets")]
    DomainTooLong,
    #[error("path is missing an opening '<'")]
    MissingOpenBracket,
    #[error("path is missing a closing '>'")]
    MissingCloseBracket,
    #[error("mailbox is missing '@'")]
    MissingAtSign,
    #[error("invalid local part: {0}")]
    InvalidLocalPart(String),
    #[error("invalid domain: {0}")]
    InvalidDomain(String),
    #[error("invalid address literal: {0}")]
    InvalidAddressLiteral(String),
    #[error("quoted string is not terminated")]
    UnclosedQuotedString,
    #[error("invalid quoted string: {0}")]
    InvalidQuotedString(String),
}

pub type Result<T> = core::result::Result<T, AddressError>;

/// A `(local-part, domain)` pair. `domain` may instead be a bracketed address literal,
/// stored with its brackets included (e.g. `[192.0.2.1]`, `[IPv6:::1]`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Mailbox {
    pub local_part: String,
    pub domain: String,
}

impl Display for Mailbox {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}@{}", self.local_part, self.domain)
    }
}

/// The `MAIL FROM` path: either the null reverse-path (`<>`) or a [`Mailbox`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReversePath {
    Null,
    Mailbox(Mailbox),
}

impl Display for ReversePath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => fmt.write_str("<>"),
            Self::Mailbox(mailbox) => write!(fmt, "<{mailbox}>"),
        }
    }
}

/// The `RCPT TO` path: a [`Mailbox`], never null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardPath(pub Mailbox);

impl Display for ForwardPath {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "<{}>", self.0)
    }
}

/// Parses a `MAIL FROM` path: `<>`, `<mailbox>`, or a bare mailbox.
pub fn parse_reverse_path(input: &str) -> Result<ReversePath> {
    let trimmed = input.trim();
    if trimmed == "<>" {
        return Ok(ReversePath::Null);
    }
    let path = parse_path(trimmed)?;
    match path {
        Some(mailbox) => Ok(ReversePath::Mailbox(mailbox)),
        None => Ok(ReversePath::Null),
    }
}

/// Parses a `RCPT TO` path: `<mailbox>` or a bare mailbox. Rejects the empty/null path.
pub fn parse_forward_path(input: &str) -> Result<ForwardPath> {
    let trimmed = input.trim();
    if trimmed.is_empty() || trimmed == "<>" {
        return Err(AddressError::Empty);
    }
    match parse_path(trimmed)? {
        Some(mailbox) => Ok(ForwardPath(mailbox)),
        None => Err(AddressError::Empty),
    }
}

/// Parses a mailbox, optionally wrapped in `<...>`, returning `None` only for an explicit
/// empty `<>`. Handles (and discards) RFC 5321's deprecated source-route prefix `@a,@b:`.
fn parse_path(input: &str) -> Result<Option<Mailbox>> {
    if input.len() > MAX_PATH_LEN {
        return Err(AddressError::PathTooLong);
    }

    let inner = if let Some(rest) = input.strip_prefix('<') {
        let Some(inner) = rest.strip_suffix('>') else {
            return Err(AddressError::MissingCloseBracket);
        };
        inner
    } else if input.contains('<') {
        return Err(AddressError::MissingOpenBracket);
    } else {
        input
    };

    if inner.is_empty() {
        return Ok(None);
    }

    let without_source_route = match find_source_route_colon(inner) {
        Some(colon) => &inner[colon + 1..],
        None => inner,
    };

    parse_mailbox(without_source_route).map(Some)
}

/// Finds the `:` ending a deprecated source-route prefix (`@a.example,@b.example:`), ignoring
/// any `:` that appears inside brackets (address literals) or quotes.
fn find_source_route_colon(input: &str) -> Option<usize> {
    if !input.starts_with('@') {
        return None;
    }
    let mut depth_bracket = 0i32;
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth_bracket += 1,
            ']' if !in_quotes => depth_bracket -= 1,
            ':' if !in_quotes && depth_bracket == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

pub fn parse_mailbox(input: &str) -> Result<Mailbox> {
    if input.is_empty() {
        return Err(AddressError::Empty);
    }

    let at = find_unquoted_at(input).ok_or(AddressError::MissingAtSign)?;
    let (local_part, domain) = (&input[..at], &input[at + 1..]);

    if local_part.len() > MAX_LOCAL_PART_LEN {
        return Err(AddressError::LocalPartTooLong);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(AddressError::DomainTooLong);
    }

    let local_part = parse_local_part(local_part)?;
    let domain = parse_domain_or_address_literal(domain)?;

    Ok(Mailbox { local_part, domain })
}

/// Finds the first `@` not inside a quoted string or bracketed literal, honoring
/// backslash-escapes within quotes.
fn find_unquoted_at(input: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut depth_bracket = 0i32;
    let mut escaped = false;
    for (i, ch) in input.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => escaped = true,
            '"' => in_quotes = !in_quotes,
            '[' if !in_quotes => depth_bracket += 1,
            ']' if !in_quotes => depth_bracket -= 1,
            '@' if !in_quotes && depth_bracket == 0 => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_local_part(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidLocalPart("empty local part".into()));
    }
    if input.starts_with('"') {
        parse_quoted_string(input)
    } else {
        parse_dot_string(input)
    }
}

fn parse_dot_string(input: &str) -> Result<String> {
    if input.starts_with('.') || input.ends_with('.') || input.contains("..") {
        return Err(AddressError::InvalidLocalPart(format!(
            "leading, trailing, or consecutive dot in {input:?}"
        )));
    }
    for atom in input.split('.') {
        if atom.is_empty() || !atom.chars().all(is_atext) {
            return Err(AddressError::InvalidLocalPart(format!("invalid atom {atom:?}")));
        }
    }
    Ok(input.to_string())
}

fn parse_quoted_string(input: &str) -> Result<String> {
    let Some(inner) = input.strip_prefix('"').and_then(|s| s.strip_suffix('"')) else {
        return Err(AddressError::UnclosedQuotedString);
    };
    let mut chars = inner.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch == '\\' {
            match chars.next() {
                Some(escaped) if escaped.is_ascii() => continue,
                _ => {
                    return Err(AddressError::InvalidQuotedString(
                        "dangling backslash escape".into(),
                    ))
                }
            }
        }
        if !is_qtext_smtp(ch) {
            return Err(AddressError::InvalidQuotedString(format!("invalid qtext {ch:?}")));
        }
    }
    Ok(input.to_string())
}

fn parse_domain_or_address_literal(input: &str) -> Result<String> {
    if input.is_empty() {
        return Err(AddressError::InvalidDomain("empty domain".into()));
    }
    if input.starts_with('[') {
        parse_address_literal(input)
    } else {
        parse_domain(input)
    }
}

fn parse_domain(input: &str) -> Result<String> {
    if input.starts_with('.') || input.ends_with('.') || input.contains("..") {
        return Err(AddressError::InvalidDomain(format!(
            "leading, trailing, or consecutive dot in {input:?}"
        )));
    }
    for label in input.split('.') {
        parse_subdomain(label)?;
    }
    Ok(input.to_string())
}

/// A DNS label: alphanumeric (or any non-ASCII code point, for RFC 6531 internationalized
/// domains) optionally with interior hyphens, never starting or ending with `-`.
fn parse_subdomain(label: &str) -> Result<()> {
    if label.is_empty() || label.len() > MAX_LABEL_LEN {
        return Err(AddressError::InvalidDomain(format!("invalid label length {label:?}")));
    }
    let mut chars = label.chars();
    let first = chars.next().unwrap();
    let last = label.chars().next_back().unwrap();
    if first == '-' || last == '-' {
        return Err(AddressError::InvalidDomain(format!("label starts/ends with '-': {label:?}")));
    }
    if !label.chars().all(|c| c.is_alphanumeric() || c == '-' || !c.is_ascii()) {
        return Err(AddressError::InvalidDomain(format!("invalid character in {label:?}")));
    }
    Ok(())
}

fn parse_address_literal(input: &str) -> Result<String> {
    let Some(inner) = input.strip_prefix('[').and_then(|s| s.strip_suffix(']')) else {
        return Err(AddressError::InvalidAddressLiteral("missing closing ']'".into()));
    };
    if let Some(v6) = inner.strip_prefix("IPv6:") {
        v6.parse::<Ipv6Addr>().map_err(|e| {
            AddressError::InvalidAddressLiteral(format!("invalid IPv6 literal: {e}"))
        })?;
        return Ok(input.to_string());
    }
    if inner.parse::<Ipv4Addr>().is_ok() {
        return Ok(input.to_string());
    }
    // General address literal: `tag:value`, tag is a dot-atom-like identifier.
    if let Some((tag, value)) = inner.split_once(':') {
        if !tag.is_empty() && tag.chars().all(|c| c.is_ascii_alphanumeric()) && !value.is_empty() {
            return Ok(input.to_string());
        }
    }
    Err(AddressError::InvalidAddressLiteral(format!("unrecognized literal {inner:?}")))
}

const LOCAL_PART_SPECIALS: &str = "!#$%&'*+-/=?^_`{|}~";

fn is_atext(c: char) -> bool {
    c.is_ascii_alphanumeric() || LOCAL_PART_SPECIALS.contains(c)
}

fn is_qtext_smtp(c: char) -> bool {
    matches!(c as u32, 32..=33 | 35..=91 | 93..=126)
}
