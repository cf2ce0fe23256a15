//! The client driver (§4.3): dial, command methods, STARTTLS, AUTH, and the `submit_message`
//! convenience. Grounded on the reference workspace's `client/client.rs` `SmtpClient` —
//! generalized from its swaks-style fluent builder (`SmtpClientBuilder`/`QuitAfter`, out of
//! scope here) into a direct command-method API, and from its bespoke `ClientError`/
//! `Response`/`ResponseLine` types onto the crate's own [`crate::error::ClientError`],
//! [`crate::codec::parse_reply_line`], and [`smtp_common::status::EnhancedCode`], which are
//! shared with the server side rather than duplicated. The reference's `MessageBuilder`/
//! `Attachment` (full MIME/attachment construction) is dropped entirely — out of scope per
//! SPEC_FULL.md's message-parsing Non-goal.

mod auth;
mod connection;

use std::time::Duration;

use smtp_common::address::{ForwardPath, ReversePath};
use smtp_common::extensions::{Extensions, STARTTLS};
use smtp_common::sasl::Mechanism;
use smtp_common::status::{EnhancedCode, ReplyCode};
use smtp_common::ProtocolError;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

use self::connection::ClientConnection;
use crate::codec::{parse_reply_line, REPLY_LINE_LIMIT};
use crate::command::{BodyType, MailParams, RcptParams};
use crate::error::{ClientError, ConnectionError};

/// Dial-time and per-connection client settings (SPEC_FULL.md §4.3 "Dial"). Plain enough to
/// deserialize from a TOML/JSON/env-sourced config file with no custom glue (§1.1).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ClientConfig {
    /// Sent as the argument to EHLO/HELO.
    #[serde(default = "default_local_name")]
    pub local_name: String,
    /// Overall deadline for connect + greeting + EHLO/HELO.
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout: Duration,
}

fn default_local_name() -> String {
    "localhost".to_string()
}

fn default_dial_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { local_name: default_local_name(), dial_timeout: default_dial_timeout() }
    }
}

/// One assembled reply: the leading code, its enhanced status (absent if the peer didn't
/// send one), and every text line with the enhanced-code prefix already stripped.
#[derive(Debug, Clone)]
pub struct Reply {
    pub code: ReplyCode,
    pub enhanced: EnhancedCode,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

/// An SMTP client session over `S`. Constructed either via [`Client::dial`] (TCP, with the
/// overall dial deadline SPEC_FULL.md requires) or [`Client::from_stream`] (any transport,
/// for `tokio::io::duplex`-backed tests).
pub struct Client<S: AsyncRead + AsyncWrite + Unpin + Send> {
    connection: Option<ClientConnection<S>>,
    config: ClientConfig,
    extensions: Extensions,
    greeting: String,
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Client<S> {
    /// Wraps an already-connected transport and runs the greeting + EHLO/HELO handshake
    /// against it, under `deadline`.
    pub async fn from_stream(stream: S, config: ClientConfig, deadline: Duration) -> Result<Self, ClientError> {
        let mut client = Self {
            connection: Some(ClientConnection::plain(stream)),
            extensions: Extensions::new(),
            greeting: String::new(),
            config,
        };

        let greeting = client.read_reply(deadline).await?;
        if greeting.code.code() != 220 {
            return Err(protocol_err(&greeting));
        }
        client.greeting = greeting.text();

        let local_name = client.config.local_name.clone();
        client.ehlo_or_helo(&local_name, deadline).await?;
        Ok(client)
    }

    fn conn(&mut self) -> &mut ClientConnection<S> {
        self.connection.as_mut().expect("connection present outside of an in-progress STARTTLS upgrade")
    }

    #[must_use]
    pub fn is_tls(&self) -> bool {
        self.connection.as_ref().is_some_and(ClientConnection::is_tls)
    }

    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    #[must_use]
    pub fn greeting(&self) -> &str {
        &self.greeting
    }

    /// The advertised SIZE extension value, or 0 if the server didn't advertise one.
    #[must_use]
    pub fn server_max_size(&self) -> usize {
        self.extensions.max_size()
    }

    async fn read_reply(&mut self, deadline: Duration) -> Result<Reply, ClientError> {
        let mut code = None;
        let mut enhanced = EnhancedCode::ABSENT;
        let mut lines = Vec::new();

        loop {
            let raw = tokio::time::timeout(deadline, self.conn().read_line(REPLY_LINE_LIMIT))
                .await
                .map_err(|_| ClientError::Timeout)?
                .map_err(map_connection_err)?;
            let text = String::from_utf8_lossy(&raw).into_owned();
            let (line_code, continuation, rest) = parse_reply_line(&text)?;

            match code {
                None => code = Some(line_code),
                Some(expected) if expected != line_code => {
                    return Err(ClientError::UnexpectedReply { expected, got: line_code });
                }
                Some(_) => {}
            }

            let (line_enhanced, stripped) = EnhancedCode::parse(&rest);
            if lines.is_empty() {
                enhanced = line_enhanced;
            }
            lines.push(stripped.to_string());

            if !continuation {
                break;
            }
        }

        Ok(Reply { code: ReplyCode::from(code.expect("loop always assigns code before breaking")), enhanced, lines })
    }

    /// Sends one command line and assembles its reply, translating any non-positive (not
    /// 2xx/3xx) reply into a [`ClientError::Protocol`] per SPEC_FULL.md §4.3's error
    /// translation rule.
    async fn command(&mut self, line: &str, deadline: Duration) -> Result<Reply, ClientError> {
        tokio::time::timeout(deadline, self.conn().write_line(line))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(map_connection_err)?;
        let reply = self.read_reply(deadline).await?;
        if reply.code.is_positive() {
            Ok(reply)
        } else {
            Err(protocol_err(&reply))
        }
    }

    async fn ehlo_or_helo(&mut self, local_name: &str, deadline: Duration) -> Result<(), ClientError> {
        match self.command(&format!("EHLO {local_name}"), deadline).await {
            Ok(reply) => {
                self.extensions = Extensions::parse_ehlo_lines(reply.lines.iter().map(String::as_str));
                Ok(())
            }
            Err(ClientError::Protocol(err)) if matches!(err.code.code(), 500 | 502) => {
                self.command(&format!("HELO {local_name}"), deadline).await?;
                self.extensions = Extensions::new();
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    pub async fn ehlo(&mut self, local_name: &str, deadline: Duration) -> Result<(), ClientError> {
        self.ehlo_or_helo(local_name, deadline).await
    }

    pub async fn mail(&mut self, path: &ReversePath, params: &MailParams, deadline: Duration) -> Result<(), ClientError> {
        self.command(&format_mail_from(path, params), deadline).await?;
        Ok(())
    }

    pub async fn rcpt(&mut self, path: &ForwardPath, params: &RcptParams, deadline: Duration) -> Result<(), ClientError> {
        self.command(&format_rcpt_to(path, params), deadline).await?;
        Ok(())
    }

    /// Sends `DATA`, waits for the 354 intermediate reply, then the dot-stuffed body, then
    /// the final reply. A non-354 response to the `DATA` line is a protocol error; the body
    /// is never sent in that case.
    pub async fn data(&mut self, body: &[u8], deadline: Duration) -> Result<(), ClientError> {
        let open = self.command("DATA", deadline).await?;
        if open.code.code() != 354 {
            return Err(ClientError::UnexpectedReply { expected: 354, got: open.code.code() });
        }

        tokio::time::timeout(deadline, self.conn().write_dot_body(body))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(map_connection_err)?;

        let reply = self.read_reply(deadline).await?;
        if reply.code.is_positive() {
            Ok(())
        } else {
            Err(protocol_err(&reply))
        }
    }

    /// Sends one `BDAT` chunk with no dot transformation; `last` appends `LAST`.
    pub async fn bdat(&mut self, chunk: &[u8], last: bool, deadline: Duration) -> Result<(), ClientError> {
        let line = if last { format!("BDAT {} LAST", chunk.len()) } else { format!("BDAT {}", chunk.len()) };
        tokio::time::timeout(deadline, self.conn().write_line(&line))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(map_connection_err)?;
        tokio::time::timeout(deadline, self.conn().write_raw(chunk))
            .await
            .map_err(|_| ClientError::Timeout)?
            .map_err(map_connection_err)?;

        let reply = self.read_reply(deadline).await?;
        if reply.code.is_positive() {
            Ok(())
        } else {
            Err(protocol_err(&reply))
        }
    }

    pub async fn rset(&mut self, deadline: Duration) -> Result<(), ClientError> {
        self.command("RSET", deadline).await?;
        Ok(())
    }

    pub async fn noop(&mut self, deadline: Duration) -> Result<(), ClientError> {
        self.command("NOOP", deadline).await?;
        Ok(())
    }

    /// Sends `QUIT` and waits for the closing reply, best-effort: any error is swallowed
    /// since the connection is being torn down either way.
    pub async fn quit(&mut self, deadline: Duration) {
        let _ = self.command("QUIT", deadline).await;
    }

    /// Performs STARTTLS: sends the command, expects 220, upgrades the transport for
    /// `domain`, then re-issues EHLO/HELO to refresh [`Client::extensions`] (a TLS session
    /// may advertise a different extension set, and any pre-handshake advertisement is
    /// discarded per SPEC_FULL.md §9's STARTTLS command-injection guard).
    pub async fn starttls(&mut self, domain: &str, deadline: Duration) -> Result<(), ClientError> {
        self.command("STARTTLS", deadline).await?;

        let connection = self.connection.take().ok_or(ClientError::ConnectionClosed)?;
        let upgraded = tokio::time::timeout(deadline, connection.upgrade(domain))
            .await
            .map_err(|_| ClientError::Timeout)??;
        self.connection = Some(upgraded);
        self.extensions = Extensions::new();

        let local_name = self.config.local_name.clone();
        self.ehlo_or_helo(&local_name, deadline).await
    }

    /// Drives the SASL challenge/response loop for `mechanism` to completion.
    pub async fn auth<M: Mechanism>(&mut self, mechanism: M, deadline: Duration) -> Result<(), ClientError> {
        auth::run(self, mechanism, deadline).await
    }

    /// STARTTLS-if-offered-and-not-already-TLS, then AUTH-if-given, then a full
    /// MAIL/RCPT.../DATA transaction (SPEC_FULL.md §4.3 "SubmitMessage").
    #[allow(clippy::too_many_arguments)]
    pub async fn submit_message<M: Mechanism>(
        &mut self,
        tls_domain: Option<&str>,
        credentials: Option<M>,
        from: &ReversePath,
        to: &[ForwardPath],
        body: &[u8],
        deadline: Duration,
    ) -> Result<(), ClientError> {
        if !self.is_tls() {
            if let Some(domain) = tls_domain {
                if self.extensions.has(STARTTLS) {
                    self.starttls(domain, deadline).await?;
                }
            }
        }

        if let Some(mechanism) = credentials {
            self.auth(mechanism, deadline).await?;
        }

        self.mail(from, &MailParams::default(), deadline).await?;
        for recipient in to {
            self.rcpt(recipient, &RcptParams::default(), deadline).await?;
        }
        self.data(body, deadline).await
    }
}

impl Client<TcpStream> {
    /// Connects to `addr` and runs the dial handshake (greeting + EHLO, with HELO fallback)
    /// under a single overall deadline taken from `config.dial_timeout`.
    pub async fn dial(addr: impl tokio::net::ToSocketAddrs, config: ClientConfig) -> Result<Self, ClientError> {
        let dial_timeout = config.dial_timeout;
        tokio::time::timeout(dial_timeout, async move {
            let stream = TcpStream::connect(addr).await.map_err(ClientError::Io)?;
            Self::from_stream(stream, config, dial_timeout).await
        })
        .await
        .map_err(|_| ClientError::Timeout)?
    }
}

fn protocol_err(reply: &Reply) -> ClientError {
    ClientError::Protocol(ProtocolError::new(reply.code, reply.enhanced, reply.text()))
}

fn map_connection_err(err: ConnectionError) -> ClientError {
    match err {
        ConnectionError::Io(e) | ConnectionError::Send(e) | ConnectionError::Receive(e) => ClientError::Io(e),
        ConnectionError::Closed => ClientError::ConnectionClosed,
        ConnectionError::Framing(f) => ClientError::Framing(f),
    }
}

fn format_mail_from(path: &ReversePath, params: &MailParams) -> String {
    let mut cmd = format!("MAIL FROM:{path}");
    if let Some(size) = params.size {
        cmd.push_str(&format!(" SIZE={size}"));
    }
    if let Some(body) = params.body {
        cmd.push_str(match body {
            BodyType::SevenBit => " BODY=7BIT",
            BodyType::EightBitMime => " BODY=8BITMIME",
        });
    }
    if params.smtputf8 {
        cmd.push_str(" SMTPUTF8");
    }
    if let Some(ret) = &params.ret {
        cmd.push_str(&format!(" RET={ret}"));
    }
    if let Some(envid) = &params.envid {
        cmd.push_str(&format!(" ENVID={envid}"));
    }
    cmd
}

fn format_rcpt_to(path: &ForwardPath, params: &RcptParams) -> String {
    let mut cmd = format!("RCPT TO:{path}");
    if let Some(notify) = &params.notify {
        cmd.push_str(&format!(" NOTIFY={notify}"));
    }
    if let Some(orcpt) = &params.orcpt {
        cmd.push_str(&format!(" ORCPT={orcpt}"));
    }
    cmd
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtp_common::address::Mailbox;

    #[test]
    fn format_mail_from_includes_params() {
        let path = ReversePath::Mailbox(Mailbox { local_part: "a".into(), domain: "x.test".into() });
        let params = MailParams { size: Some(10), body: Some(BodyType::EightBitMime), smtputf8: true, ..Default::default() };
        assert_eq!(format_mail_from(&path, &params), "MAIL FROM:<a@x.test> SIZE=10 BODY=8BITMIME SMTPUTF8");
    }

    #[test]
    fn format_mail_from_null_sender() {
        assert_eq!(format_mail_from(&ReversePath::Null, &MailParams::default()), "MAIL FROM:<>");
    }

    #[test]
    fn format_rcpt_to_includes_notify() {
        let path = ForwardPath(Mailbox { local_part: "b".into(), domain: "y.test".into() });
        let params = RcptParams { notify: Some("SUCCESS".into()), orcpt: None };
        assert_eq!(format_rcpt_to(&path, &params), "RCPT TO:<b@y.test> NOTIFY=SUCCESS");
    }

    /// Drives `Client::from_stream` against a fake server that rejects EHLO, over an in-memory
    /// duplex, and checks the HELO retry lands with an empty extension view (SPEC_FULL.md §8
    /// "EHLO/HELO fallback").
    #[tokio::test]
    async fn ehlo_rejected_with_500_falls_back_to_helo() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let mut server = BufReader::new(server_stream);
            server.get_mut().write_all(b"220 fake.test ready\r\n").await.unwrap();

            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("EHLO"));
            server.get_mut().write_all(b"500 5.5.1 Command not recognized\r\n").await.unwrap();

            line.clear();
            server.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("HELO"));
            server.get_mut().write_all(b"250 fake.test Hello\r\n").await.unwrap();
        });

        let config = ClientConfig { local_name: "c.test".to_string(), ..Default::default() };
        let client = Client::from_stream(client_stream, config, Duration::from_secs(5)).await.unwrap();

        assert!(client.extensions().is_empty(), "HELO fallback must present an empty extension view");
        server.await.unwrap();
    }

    /// A 502 ("not implemented") triggers the same fallback as 500 ("not recognized").
    #[tokio::test]
    async fn ehlo_rejected_with_502_falls_back_to_helo() {
        use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

        let (client_stream, server_stream) = tokio::io::duplex(4096);
        let server = tokio::spawn(async move {
            let mut server = BufReader::new(server_stream);
            server.get_mut().write_all(b"220 fake.test ready\r\n").await.unwrap();

            let mut line = String::new();
            server.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("EHLO"));
            server.get_mut().write_all(b"502 5.5.1 Command not implemented\r\n").await.unwrap();

            line.clear();
            server.read_line(&mut line).await.unwrap();
            assert!(line.starts_with("HELO"));
            server.get_mut().write_all(b"250 fake.test Hello\r\n").await.unwrap();
        });

        let config = ClientConfig { local_name: "c.test".to_string(), ..Default::default() };
        let client = Client::from_stream(client_stream, config, Duration::from_secs(5)).await.unwrap();

        assert!(client.extensions().is_empty());
        server.await.unwrap();
    }
}
