//! Parses one command line's verb + argument tail into a [`Command`] (§4.4).

use smtp_common::address::{self, ForwardPath, ReversePath};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyType {
    SevenBit,
    EightBitMime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MailParams {
    pub size: Option<usize>,
    pub body: Option<BodyType>,
    pub smtputf8: bool,
    pub ret: Option<String>,
    pub envid: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RcptParams {
    pub notify: Option<String>,
    pub orcpt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Ehlo(String),
    Helo(String),
    Mail { path: ReversePath, params: MailParams },
    Rcpt { path: ForwardPath, params: RcptParams },
    Data,
    Bdat { size: usize, last: bool },
    Rset,
    Noop,
    Vrfy(String),
    Auth { mechanism: String, initial: Option<String> },
    StartTls,
    Quit,
    /// A syntactically recognized but malformed command, or an unrecognized verb; carries a
    /// human-readable reason for logging. Dispatch always answers this with 500/501.
    Invalid(String),
}

impl Command {
    /// Parses a raw command line (no CRLF). `verb` comparison is case-insensitive.
    pub fn parse(line: &str) -> Self {
        let (verb, rest) = match line.split_once(' ') {
            Some((v, r)) => (v, r.trim_start()),
            None => (line, ""),
        };
        let verb_upper = verb.to_ascii_uppercase();

        match verb_upper.as_str() {
            "EHLO" if !rest.is_empty() => Self::Ehlo(rest.to_string()),
            "HELO" if !rest.is_empty() => Self::Helo(rest.to_string()),
            "MAIL" => Self::parse_mail(rest),
            "RCPT" => Self::parse_rcpt(rest),
            "DATA" if rest.is_empty() => Self::Data,
            "BDAT" => Self::parse_bdat(rest),
            "RSET" if rest.is_empty() => Self::Rset,
            "NOOP" => Self::Noop,
            "VRFY" if !rest.is_empty() => Self::Vrfy(rest.to_string()),
            "AUTH" if !rest.is_empty() => Self::parse_auth(rest),
            "STARTTLS" if rest.is_empty() => Self::StartTls,
            "QUIT" if rest.is_empty() => Self::Quit,
            _ => Self::Invalid(format!("unrecognized command {line:?}")),
        }
    }

    fn parse_mail(rest: &str) -> Self {
        let Some(after_from) = strip_prefix_ci(rest, "FROM:") else {
            return Self::Invalid("MAIL requires FROM:<path>".to_string());
        };
        let (path_text, param_text) = split_path_and_params(after_from);
        let path = match address::parse_reverse_path(path_text) {
            Ok(path) => path,
            Err(err) => return Self::Invalid(format!("invalid reverse-path: {err}")),
        };
        let params = match parse_mail_params(param_text) {
            Ok(params) => params,
            Err(reason) => return Self::Invalid(reason),
        };
        Self::Mail { path, params }
    }

    fn parse_rcpt(rest: &str) -> Self {
        let Some(after_to) = strip_prefix_ci(rest, "TO:") else {
            return Self::Invalid("RCPT requires TO:<path>".to_string());
        };
        let (path_text, param_text) = split_path_and_params(after_to);
        let path = match address::parse_forward_path(path_text) {
            Ok(path) => path,
            Err(err) => return Self::Invalid(format!("invalid forward-path: {err}")),
        };
        let params = parse_rcpt_params(param_text);
        Self::Rcpt { path, params }
    }

    fn parse_bdat(rest: &str) -> Self {
        let mut parts = rest.split_whitespace();
        let Some(size_text) = parts.next() else {
            return Self::Invalid("BDAT requires a chunk size".to_string());
        };
        let Ok(size) = size_text.parse::<usize>() else {
            return Self::Invalid(format!("invalid BDAT size {size_text:?}"));
        };
        let last = match parts.next() {
            None => false,
            Some(tok) if tok.eq_ignore_ascii_case("LAST") => true,
            Some(tok) => return Self::Invalid(format!("unrecognized BDAT argument {tok:?}")),
        };
        if parts.next().is_some() {
            return Self::Invalid("too many arguments to BDAT".to_string());
        }
        Self::Bdat { size, last }
    }

    fn parse_auth(rest: &str) -> Self {
        let mut parts = rest.splitn(2, ' ');
        let mechanism = parts.next().unwrap_or_default().to_ascii_uppercase();
        let initial = parts.next().filter(|s| !s.is_empty()).map(str::to_string);
        Self::Auth { mechanism, initial }
    }
}

fn strip_prefix_ci<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len() && s[..prefix.len()].eq_ignore_ascii_case(prefix) {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}

/// Splits `<path>[ params...]` honoring a bracketed path that may itself contain spaces only
/// inside quotes (rare, but a quoted local-part could in principle hold one).
fn split_path_and_params(input: &str) -> (&str, &str) {
    if let Some(stripped) = input.strip_prefix('<') {
        if let Some(end) = stripped.find('>') {
            let path = &input[..end + 2];
            let rest = input[end + 2..].trim_start();
            return (path, rest);
        }
    }
    match input.split_once(' ') {
        Some((path, rest)) => (path, rest.trim_start()),
        None => (input, ""),
    }
}

fn parse_mail_params(text: &str) -> Result<MailParams, String> {
    let mut params = MailParams::default();
    let mut seen_size = false;
    for token in text.split_whitespace() {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        match key.to_ascii_uppercase().as_str() {
            "SIZE" => {
                if seen_size {
                    return Err("duplicate SIZE parameter".to_string());
                }
                seen_size = true;
                match value.parse::<usize>() {
                    Ok(0) => return Err("SIZE=0 is not a valid message size".to_string()),
                    Ok(n) => params.size = Some(n),
                    Err(_) => {
                        // A malformed SIZE value is ignored rather than rejecting the whole
                        // command, matching the reference parser's leniency here.
                    }
                }
            }
            "BODY" => {
                params.body = match value.to_ascii_uppercase().as_str() {
                    "7BIT" => Some(BodyType::SevenBit),
                    "8BITMIME" => Some(BodyType::EightBitMime),
                    _ => return Err(format!("unrecognized BODY value {value:?}")),
                };
            }
            "SMTPUTF8" => params.smtputf8 = true,
            "RET" => params.ret = Some(value.to_string()),
            "ENVID" => params.envid = Some(value.to_string()),
            _ => {
                // Unknown parameters are tolerated and simply not recorded; strictness lives
                // in the fields this crate actually understands.
            }
        }
    }
    Ok(params)
}

fn parse_rcpt_params(text: &str) -> RcptParams {
    let mut params = RcptParams::default();
    for token in text.split_whitespace() {
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        match key.to_ascii_uppercase().as_str() {
            "NOTIFY" => params.notify = Some(value.to_string()),
            "ORCPT" => params.orcpt = Some(value.to_string()),
            _ => {}
        }
    }
    params
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn string_casing(s: &str) -> Vec<String> {
        vec![s.to_ascii_uppercase(), s.to_ascii_lowercase(), s.to_string()]
    }

    #[test]
    fn ehlo_case_insensitive() {
        for verb in string_casing("ehlo") {
            let cmd = Command::parse(&format!("{verb} c.test"));
            assert_eq!(cmd, Command::Ehlo("c.test".to_string()));
        }
    }

    #[test]
    fn data_rejects_trailing_argument() {
        assert!(matches!(Command::parse("DATA extra"), Command::Invalid(_)));
    }

    #[test]
    fn mail_from_null_sender() {
        let cmd = Command::parse("MAIL FROM:<>");
        assert_eq!(cmd, Command::Mail { path: ReversePath::Null, params: MailParams::default() });
    }

    #[test]
    fn mail_from_with_size() {
        let cmd = Command::parse("MAIL FROM:<a@x> SIZE=12345");
        let Command::Mail { params, .. } = cmd else { panic!("expected Mail") };
        assert_eq!(params.size, Some(12345));
    }

    #[test]
    fn mail_from_size_zero_rejected() {
        assert!(matches!(Command::parse("MAIL FROM:<a@x> SIZE=0"), Command::Invalid(_)));
    }

    #[test]
    fn mail_from_duplicate_size_rejected() {
        assert!(matches!(
            Command::parse("MAIL FROM:<a@x> SIZE=1 SIZE=2"),
            Command::Invalid(_)
        ));
    }

    #[test]
    fn mail_from_malformed_size_is_ignored_not_rejected() {
        let cmd = Command::parse("MAIL FROM:<a@x> SIZE=abc");
        let Command::Mail { params, .. } = cmd else { panic!("expected Mail") };
        assert_eq!(params.size, None);
    }

    #[test]
    fn mail_from_size_case_insensitive_keyword() {
        let cmd = Command::parse("MAIL FROM:<a@x> size=10");
        let Command::Mail { params, .. } = cmd else { panic!("expected Mail") };
        assert_eq!(params.size, Some(10));
    }

    #[test]
    fn mail_from_combined_params() {
        let cmd = Command::parse("MAIL FROM:<a@x> SIZE=10 BODY=8BITMIME SMTPUTF8");
        let Command::Mail { params, .. } = cmd else { panic!("expected Mail") };
        assert_eq!(params.size, Some(10));
        assert_eq!(params.body, Some(BodyType::EightBitMime));
        assert!(params.smtputf8);
    }

    #[test]
    fn rcpt_to_with_notify() {
        let cmd = Command::parse("RCPT TO:<b@y> NOTIFY=SUCCESS,FAILURE");
        let Command::Rcpt { path, params } = cmd else { panic!("expected Rcpt") };
        assert_eq!(path.0.local_part, "b");
        assert_eq!(params.notify.as_deref(), Some("SUCCESS,FAILURE"));
    }

    #[test]
    fn bdat_last_case_insensitive() {
        assert_eq!(Command::parse("BDAT 8 last"), Command::Bdat { size: 8, last: true });
        assert_eq!(Command::parse("BDAT 8 LAST"), Command::Bdat { size: 8, last: true });
        assert_eq!(Command::parse("BDAT 9"), Command::Bdat { size: 9, last: false });
    }

    #[test]
    fn auth_with_initial_response() {
        let cmd = Command::parse("AUTH PLAIN AHRlc3R1c2VyAHRlc3RwYXNz");
        assert_eq!(
            cmd,
            Command::Auth {
                mechanism: "PLAIN".to_string(),
                initial: Some("AHRlc3R1c2VyAHRlc3RwYXNz".to_string()),
            }
        );
    }

    #[test]
    fn auth_without_initial_response() {
        assert_eq!(
            Command::parse("AUTH LOGIN"),
            Command::Auth { mechanism: "LOGIN".to_string(), initial: None }
        );
    }

    #[test]
    fn quit_and_rset_and_noop() {
        assert_eq!(Command::parse("QUIT"), Command::Quit);
        assert_eq!(Command::parse("RSET"), Command::Rset);
        assert_eq!(Command::parse("NOOP"), Command::Noop);
        assert_eq!(Command::parse("noop ignored-arg"), Command::Noop);
    }

    #[test]
    fn unknown_verb_is_invalid() {
        assert!(matches!(Command::parse("FROBNICATE"), Command::Invalid(_)));
    }
}
