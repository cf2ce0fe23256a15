//! Pure reply-line formatting, split out from [`super::Session`] so the wire text a given
//! outcome produces can be checked without a connection — mirrors the reference workspace's
//! `session/response.rs` split between response *generation* and the I/O that sends it.

use smtp_common::ProtocolError;

pub(super) fn ok_line(text: &str) -> String {
    format!("250 {text}")
}

pub(super) fn error_lines(err: &ProtocolError) -> Vec<String> {
    err.lines()
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtp_common::{EnhancedCode, ReplyCode};

    #[test]
    fn ok_line_format() {
        assert_eq!(ok_line("queued"), "250 queued");
    }

    #[test]
    fn error_lines_single() {
        let err = ProtocolError::new(ReplyCode::SyntaxError, EnhancedCode::new(5, 5, 1), "bad");
        assert_eq!(error_lines(&err), vec!["500 5.5.1 bad".to_string()]);
    }
}
