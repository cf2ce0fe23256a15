//! The wire-facing error type carried across every layer boundary.

use core::fmt::{self, Display, Formatter};

use crate::status::{EnhancedCode, ReplyCode};

/// A reply the core intends to send (or did receive) verbatim: a reply code, an optional
/// enhanced status code, and human-readable text that may itself be multi-line.
///
/// [`Display`] renders the full wire form: a single-line message becomes `"DDD X.Y.Z text"`
/// (or `"DDD text"` if the enhanced code is absent); a multi-line message splits on `\n` and
/// prefixes every line but the last with `"DDD-"`, the last with `"DDD "`, repeating the
/// enhanced code on every line per SPEC_FULL.md §8 (Multi-line error).
#[derive(Debug, Clone, thiserror::Error)]
#[error("{}", self.render())]
pub struct ProtocolError {
    pub code: ReplyCode,
    pub enhanced: EnhancedCode,
    pub text: String,
}

impl ProtocolError {
    pub fn new(code: ReplyCode, enhanced: EnhancedCode, text: impl Into<String>) -> Self {
        Self { code, enhanced, text: text.into() }
    }

    /// Builds a `ProtocolError` using the conventional enhanced code for `code`'s class.
    pub fn generic(code: ReplyCode, text: impl Into<String>) -> Self {
        Self::new(code, EnhancedCode::generic_for(code), text)
    }

    pub fn is_transient(&self) -> bool {
        self.code.is_transient()
    }

    pub fn is_permanent(&self) -> bool {
        self.code.is_permanent()
    }

    /// Renders every reply line this error should produce on the wire, in order.
    pub fn lines(&self) -> Vec<String> {
        let code = self.code;
        let lines: Vec<&str> = self.text.split('\n').collect();
        let last = lines.len().saturating_sub(1);
        lines
            .iter()
            .enumerate()
            .map(|(i, line)| {
                let sep = if i == last { ' ' } else { '-' };
                if self.enhanced.is_absent() {
                    format!("{code}{sep}{line}")
                } else {
                    format!("{code}{sep}{} {line}", self.enhanced)
                }
            })
            .collect()
    }

    fn render(&self) -> String {
        self.lines().join("\r\n")
    }
}
