//! Builds the EHLO response line list per §4.4, in the fixed order the RFC-ish contract
//! requires: SIZE, PIPELINING, 8BITMIME, ENHANCEDSTATUSCODES, DSN, SMTPUTF8, CHUNKING,
//! STARTTLS (conditionally), AUTH (conditionally).

use smtp_common::extensions::{
    AUTH, CHUNKING, DSN, EIGHT_BIT_MIME, ENHANCED_STATUS_CODES, PIPELINING, SIZE, SMTP_UTF8,
    STARTTLS,
};

pub struct EhloContext {
    pub hostname: String,
    pub client_name: String,
    pub max_message_size: usize,
    pub tls_configured: bool,
    pub session_is_tls: bool,
    pub auth_configured: bool,
    pub session_authenticated: bool,
}

/// Builds the full set of EHLO response lines, greeting line first.
pub fn ehlo_lines(ctx: &EhloContext) -> Vec<String> {
    let mut lines = vec![format!("{} Hello {}", ctx.hostname, ctx.client_name)];

    if ctx.max_message_size > 0 {
        lines.push(format!("{SIZE} {}", ctx.max_message_size));
    }
    lines.push(PIPELINING.to_string());
    lines.push(EIGHT_BIT_MIME.to_string());
    lines.push(ENHANCED_STATUS_CODES.to_string());
    lines.push(DSN.to_string());
    lines.push(SMTP_UTF8.to_string());
    lines.push(CHUNKING.to_string());

    if ctx.tls_configured && !ctx.session_is_tls {
        lines.push(STARTTLS.to_string());
    }
    if ctx.auth_configured && !ctx.session_authenticated {
        lines.push(format!("{AUTH} PLAIN LOGIN CRAM-MD5"));
    }

    lines
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn simple_send_scenario_order() {
        let ctx = EhloContext {
            hostname: "mail.test".into(),
            client_name: "c.test".into(),
            max_message_size: 10_485_760,
            tls_configured: false,
            session_is_tls: false,
            auth_configured: false,
            session_authenticated: false,
        };
        let lines = ehlo_lines(&ctx);
        assert_eq!(
            lines,
            vec![
                "mail.test Hello c.test".to_string(),
                "SIZE 10485760".to_string(),
                "PIPELINING".to_string(),
                "8BITMIME".to_string(),
                "ENHANCEDSTATUSCODES".to_string(),
                "DSN".to_string(),
                "SMTPUTF8".to_string(),
                "CHUNKING".to_string(),
            ]
        );
    }

    #[test]
    fn starttls_hidden_once_tls() {
        let ctx = EhloContext {
            hostname: "mail.test".into(),
            client_name: "c".into(),
            max_message_size: 0,
            tls_configured: true,
            session_is_tls: true,
            auth_configured: false,
            session_authenticated: false,
        };
        let lines = ehlo_lines(&ctx);
        assert!(!lines.iter().any(|l| l == "STARTTLS"));
    }

    #[test]
    fn auth_hidden_once_authenticated() {
        let ctx = EhloContext {
            hostname: "mail.test".into(),
            client_name: "c".into(),
            max_message_size: 0,
            tls_configured: false,
            session_is_tls: false,
            auth_configured: true,
            session_authenticated: true,
        };
        let lines = ehlo_lines(&ctx);
        assert!(!lines.iter().any(|l| l.starts_with("AUTH")));
    }
}
