//! The server session: the per-connection command loop, dispatch, and transaction sub-state
//! (§4.4). Grounded on the reference workspace's `Session<Stream>` + `SessionConfig` builder,
//! generalized from its FFI validate-module dispatch to the plain [`Handlers`] trait and from
//! its byte-buffer `Context` to an explicit [`State`] + [`Transaction`] pair.

mod auth;
mod response;

use std::{net::SocketAddr, sync::Arc, time::Duration};

use smtp_common::{EnhancedCode, ForwardPath, ProtocolError, ReplyCode, ReversePath};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::broadcast;

use crate::{
    codec::COMMAND_LINE_LIMIT,
    command::Command,
    connection::{Connection, TlsContext},
    error::{ConnectionError, FramingError, SessionError},
    extensions::{ehlo_lines, EhloContext},
    handlers::{Body, Handlers},
    state::State,
};

/// Broadcast to every live session; `Shutdown` is delivered once and every session reacts by
/// failing its next command read with a 421.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub hostname: String,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_message_size: usize,
    pub max_recipients: usize,
    pub max_invalid_commands: u32,
    pub tls_context: Option<TlsContext>,
    pub submission_mode: bool,
    pub handlers: Arc<dyn Handlers>,
}

impl SessionConfig {
    #[must_use]
    pub fn builder() -> SessionConfigBuilder {
        SessionConfigBuilder::default()
    }
}

pub struct SessionConfigBuilder {
    hostname: String,
    read_timeout: Duration,
    write_timeout: Duration,
    max_message_size: usize,
    max_recipients: usize,
    max_invalid_commands: u32,
    tls_context: Option<TlsContext>,
    submission_mode: bool,
    handlers: Arc<dyn Handlers>,
}

impl Default for SessionConfigBuilder {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            read_timeout: Duration::from_secs(300),
            write_timeout: Duration::from_secs(300),
            max_message_size: 10 * 1024 * 1024,
            max_recipients: 100,
            max_invalid_commands: 10,
            tls_context: None,
            submission_mode: false,
            handlers: Arc::new(crate::handlers::NoopHandlers),
        }
    }
}

impl SessionConfigBuilder {
    #[must_use]
    pub fn with_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.hostname = hostname.into();
        self
    }

    #[must_use]
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    #[must_use]
    pub fn with_max_recipients(mut self, n: usize) -> Self {
        self.max_recipients = n;
        self
    }

    #[must_use]
    pub fn with_max_invalid_commands(mut self, n: u32) -> Self {
        self.max_invalid_commands = n;
        self
    }

    #[must_use]
    pub fn with_tls_context(mut self, tls_context: Option<TlsContext>) -> Self {
        self.tls_context = tls_context;
        self
    }

    #[must_use]
    pub fn with_submission_mode(mut self, submission_mode: bool) -> Self {
        self.submission_mode = submission_mode;
        self
    }

    #[must_use]
    pub fn with_handlers(mut self, handlers: Arc<dyn Handlers>) -> Self {
        self.handlers = handlers;
        self
    }

    #[must_use]
    pub fn build(self) -> SessionConfig {
        SessionConfig {
            hostname: self.hostname,
            read_timeout: self.read_timeout,
            write_timeout: self.write_timeout,
            max_message_size: self.max_message_size,
            max_recipients: self.max_recipients,
            max_invalid_commands: self.max_invalid_commands,
            tls_context: self.tls_context,
            submission_mode: self.submission_mode,
            handlers: self.handlers,
        }
    }
}

/// Per-transaction sub-state, wiped on RSET, successful DATA/BDAT-LAST, or EHLO/HELO.
#[derive(Debug, Default)]
struct Transaction {
    reverse_path: Option<ReversePath>,
    forward_paths: Vec<ForwardPath>,
    bdat_buffer: Vec<u8>,
}

pub struct Session<Stream: AsyncRead + AsyncWrite + Unpin + Send> {
    /// `None` only for the instant `handle_starttls` owns the transport to perform the
    /// handshake; every other method sees it as always-present.
    connection: Option<Connection<Stream>>,
    peer: SocketAddr,
    config: SessionConfig,
    state: State,
    client_name: Option<String>,
    authenticated: bool,
    transaction: Transaction,
    invalid_command_count: u32,
}

enum Outcome {
    Continue,
    Close,
}

impl<Stream: AsyncRead + AsyncWrite + Unpin + Send> Session<Stream> {
    pub fn new(stream: Stream, peer: SocketAddr, config: SessionConfig) -> Self {
        Self {
            connection: Some(Connection::plain(stream)),
            peer,
            config,
            state: State::New,
            client_name: None,
            authenticated: false,
            transaction: Transaction::default(),
            invalid_command_count: 0,
        }
    }

    fn conn(&mut self) -> &mut Connection<Stream> {
        self.connection.as_mut().expect("connection is always present outside of handle_starttls")
    }

    /// Drives the command loop to completion: greeting, then read-dispatch-reply until QUIT,
    /// shutdown, a transport error, or too many invalid commands.
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), SessionError> {
        if let Err(err) = self.config.handlers.on_connect(self.peer).await {
            let _ = self.reply_error(&err).await;
            return Ok(());
        }

        self.conn()
            .write_line(&format!("220 {} ESMTP ready", self.config.hostname))
            .await?;

        loop {
            let raw = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    let _ = self.conn().write_line("421 4.3.2 Server shutting down").await;
                    return Err(SessionError::Shutdown);
                }
                read = tokio::time::timeout(self.config.read_timeout, self.conn().read_line(COMMAND_LINE_LIMIT)) => {
                    match read {
                        Err(_) => return Err(SessionError::Timeout(self.config.read_timeout.as_secs())),
                        Ok(Ok(line)) => line,
                        Ok(Err(ConnectionError::Closed)) => return Ok(()),
                        Ok(Err(ConnectionError::Framing(FramingError::LineTooLong { .. }))) => {
                            if self.bump_invalid_and_maybe_close().await? {
                                return Err(SessionError::TooManyInvalidCommands);
                            }
                            self.reply_error(&ProtocolError::generic(
                                ReplyCode::SyntaxError,
                                "Line too long",
                            ))
                            .await?;
                            continue;
                        }
                        Ok(Err(err)) => return Err(err.into()),
                    }
                }
            };

            if raw.contains(&0) {
                if self.bump_invalid_and_maybe_close().await? {
                    return Err(SessionError::TooManyInvalidCommands);
                }
                self.reply_error(&ProtocolError::generic(
                    ReplyCode::SyntaxError,
                    "Command line contains a NUL byte",
                ))
                .await?;
                continue;
            }

            let text = String::from_utf8_lossy(&raw).into_owned();
            let command = Command::parse(&text);

            match self.dispatch(command).await? {
                Outcome::Continue => {}
                Outcome::Close => return Ok(()),
            }
        }
    }

    /// Returns `true` once `max_invalid_commands` has been reached (caller should send 421 and
    /// drop the connection).
    async fn bump_invalid_and_maybe_close(&mut self) -> Result<bool, SessionError> {
        self.invalid_command_count += 1;
        if self.invalid_command_count >= self.config.max_invalid_commands {
            let _ = self.conn().write_line("421 4.7.0 Too many invalid commands").await;
            return Ok(true);
        }
        Ok(false)
    }

    async fn reply_ok(&mut self, text: &str) -> Result<(), SessionError> {
        self.conn().write_line(&response::ok_line(text)).await?;
        Ok(())
    }

    async fn reply_error(&mut self, err: &ProtocolError) -> Result<(), SessionError> {
        for line in response::error_lines(err) {
            self.conn().write_line(&line).await?;
        }
        Ok(())
    }

    async fn dispatch(&mut self, command: Command) -> Result<Outcome, SessionError> {
        if let Command::Invalid(reason) = &command {
            tracing::debug!(reason, "invalid command");
            if self.bump_invalid_and_maybe_close().await? {
                return Err(SessionError::TooManyInvalidCommands);
            }
            self.reply_error(&ProtocolError::generic(ReplyCode::SyntaxError, "Syntax error"))
                .await?;
            return Ok(Outcome::Continue);
        }

        if !self.state.allows(&command) {
            if self.bump_invalid_and_maybe_close().await? {
                return Err(SessionError::TooManyInvalidCommands);
            }
            self.reply_error(&ProtocolError::new(
                ReplyCode::BadSequence,
                EnhancedCode::new(5, 5, 1),
                "Command out of sequence",
            ))
            .await?;
            return Ok(Outcome::Continue);
        }

        match command {
            Command::Ehlo(name) => self.handle_ehlo(name).await,
            Command::Helo(name) => self.handle_helo(name).await,
            Command::Mail { path, params } => self.handle_mail(path, params.size).await,
            Command::Rcpt { path, .. } => self.handle_rcpt(path).await,
            Command::Data => self.handle_data().await,
            Command::Bdat { size, last } => self.handle_bdat(size, last).await,
            Command::Rset => self.handle_rset().await,
            Command::Noop => {
                self.reply_ok("Ok").await?;
                Ok(Outcome::Continue)
            }
            Command::Vrfy(param) => self.handle_vrfy(param).await,
            Command::Auth { mechanism, initial } => self.handle_auth(mechanism, initial).await,
            Command::StartTls => self.handle_starttls().await,
            Command::Quit => {
                self.conn().write_line("221 Bye").await?;
                Ok(Outcome::Close)
            }
            Command::Invalid(_) => unreachable!("handled above"),
        }
    }

    async fn handle_ehlo(&mut self, name: String) -> Result<Outcome, SessionError> {
        if let Err(err) = self.config.handlers.on_helo(&name).await {
            self.reply_error(&err).await?;
            return Ok(Outcome::Continue);
        }
        self.client_name = Some(name.clone());
        self.transaction = Transaction::default();
        self.state = State::Greeted;

        let ctx = EhloContext {
            hostname: self.config.hostname.clone(),
            client_name: name,
            max_message_size: self.config.max_message_size,
            tls_configured: self.config.tls_context.is_some(),
            session_is_tls: self.conn().is_tls(),
            auth_configured: self.config.handlers.has_auth_handler(),
            session_authenticated: self.authenticated,
        };
        let lines = ehlo_lines(&ctx);
        let last = lines.len().saturating_sub(1);
        for (i, line) in lines.iter().enumerate() {
            let sep = if i == last { ' ' } else { '-' };
            self.conn().write_line(&format!("250{sep}{line}")).await?;
        }
        Ok(Outcome::Continue)
    }

    async fn handle_helo(&mut self, name: String) -> Result<Outcome, SessionError> {
        if let Err(err) = self.config.handlers.on_helo(&name).await {
            self.reply_error(&err).await?;
            return Ok(Outcome::Continue);
        }
        self.client_name = Some(name.clone());
        self.transaction = Transaction::default();
        self.state = State::Greeted;
        self.conn()
            .write_line(&format!("250 {} Hello {name}", self.config.hostname))
            .await?;
        Ok(Outcome::Continue)
    }

    async fn handle_mail(
        &mut self,
        path: ReversePath,
        size: Option<usize>,
    ) -> Result<Outcome, SessionError> {
        if self.config.submission_mode && !self.authenticated {
            self.reply_error(&ProtocolError::generic(
                ReplyCode::AuthRequired,
                "Authentication required",
            ))
            .await?;
            return Ok(Outcome::Continue);
        }
        if let Some(size) = size {
            if self.config.max_message_size > 0 && size > self.config.max_message_size {
                self.reply_error(&ProtocolError::new(
                    ReplyCode::ExceededStorage,
                    EnhancedCode::new(5, 2, 3),
                    "Message size exceeds fixed maximum message size",
                ))
                .await?;
                return Ok(Outcome::Continue);
            }
        }
        if let Err(err) = self.config.handlers.on_mail(&path).await {
            self.reply_error(&err).await?;
            return Ok(Outcome::Continue);
        }
        self.transaction = Transaction { reverse_path: Some(path), ..Transaction::default() };
        self.state = State::Mail;
        self.reply_ok("Ok").await?;
        Ok(Outcome::Continue)
    }

    async fn handle_rcpt(&mut self, path: ForwardPath) -> Result<Outcome, SessionError> {
        if self.transaction.forward_paths.len() >= self.config.max_recipients {
            self.reply_error(&ProtocolError::generic(
                ReplyCode::InsufficientStorage,
                "Too many recipients",
            ))
            .await?;
            return Ok(Outcome::Continue);
        }
        if let Err(err) = self.config.handlers.on_rcpt(&path).await {
            self.reply_error(&err).await?;
            return Ok(Outcome::Continue);
        }
        self.transaction.forward_paths.push(path);
        self.state = State::Rcpt;
        self.reply_ok("Ok").await?;
        Ok(Outcome::Continue)
    }

    async fn handle_data(&mut self) -> Result<Outcome, SessionError> {
        self.conn()
            .write_line("354 End data with <CR><LF>.<CR><LF>")
            .await?;
        let body = self.conn().read_dot_body(self.config.max_message_size.max(1)).await?;
        self.finish_transaction(body).await
    }

    async fn handle_bdat(&mut self, size: usize, last: bool) -> Result<Outcome, SessionError> {
        let chunk = self.conn().read_exact_raw(size).await?;
        self.transaction.bdat_buffer.extend_from_slice(&chunk);

        if !last {
            let n = self.transaction.bdat_buffer.len();
            self.state = State::Rcpt;
            self.conn().write_line(&format!("250 {n} bytes received")).await?;
            return Ok(Outcome::Continue);
        }

        let body = std::mem::take(&mut self.transaction.bdat_buffer);
        self.finish_transaction(body).await
    }

    async fn finish_transaction(&mut self, body: Vec<u8>) -> Result<Outcome, SessionError> {
        let reverse_path = self.transaction.reverse_path.clone().unwrap_or(ReversePath::Null);
        let forward_paths = std::mem::take(&mut self.transaction.forward_paths);

        let result = self
            .config
            .handlers
            .on_data(&reverse_path, &forward_paths, Body(&body))
            .await;

        self.transaction = Transaction::default();
        self.state = State::Greeted;

        match result {
            Ok(()) => {
                self.reply_ok("Ok: message accepted").await?;
            }
            Err(err) => {
                self.reply_error(&err).await?;
            }
        }
        Ok(Outcome::Continue)
    }

    async fn handle_rset(&mut self) -> Result<Outcome, SessionError> {
        self.config.handlers.on_reset().await;
        self.transaction = Transaction::default();
        if self.state != State::New {
            self.state = State::Greeted;
        }
        self.reply_ok("Ok").await?;
        Ok(Outcome::Continue)
    }

    async fn handle_vrfy(&mut self, param: String) -> Result<Outcome, SessionError> {
        let (text, result) = self.config.handlers.on_vrfy(&param).await;
        match result {
            Ok(()) => self.reply_ok(&text).await?,
            Err(err) => self.reply_error(&err).await?,
        }
        Ok(Outcome::Continue)
    }

    async fn handle_starttls(&mut self) -> Result<Outcome, SessionError> {
        let Some(tls_context) = self.config.tls_context.clone() else {
            self.reply_error(&ProtocolError::generic(
                ReplyCode::CommandNotImplemented,
                "TLS not available",
            ))
            .await?;
            return Ok(Outcome::Continue);
        };
        self.conn().write_line("220 Ready to begin TLS").await?;

        let connection = self.connection.take().expect("connection is always present before STARTTLS");
        match connection.upgrade(&tls_context).await {
            Ok(upgraded) => {
                self.connection = Some(upgraded);
                self.transaction = Transaction::default();
                self.client_name = None;
                // STARTTLS wipes everything except the (now-true) TLS flag.
                self.authenticated = false;
                self.state = State::New;
                Ok(Outcome::Continue)
            }
            Err(err) => Err(SessionError::Tls(err)),
        }
    }

    async fn handle_auth(
        &mut self,
        mechanism: String,
        initial: Option<String>,
    ) -> Result<Outcome, SessionError> {
        if !self.config.handlers.has_auth_handler() {
            self.reply_error(&ProtocolError::generic(
                ReplyCode::CommandNotImplemented,
                "Authentication not available",
            ))
            .await?;
            return Ok(Outcome::Continue);
        }
        if self.authenticated {
            self.reply_error(&ProtocolError::new(
                ReplyCode::BadSequence,
                EnhancedCode::new(5, 5, 1),
                "Already authenticated",
            ))
            .await?;
            return Ok(Outcome::Continue);
        }

        let outcome = auth::run(self, &mechanism, initial).await?;
        match outcome {
            auth::Outcome::Success => {
                self.authenticated = true;
                self.conn().write_line("235 2.7.0 Authentication successful").await?;
            }
            auth::Outcome::Failure(err) => {
                self.reply_error(&err).await?;
            }
            auth::Outcome::Aborted => {
                self.reply_error(&ProtocolError::generic(
                    ReplyCode::SyntaxErrorInParameters,
                    "Authentication cancelled",
                ))
                .await?;
            }
            auth::Outcome::UnsupportedMechanism => {
                self.reply_error(&ProtocolError::generic(
                    ReplyCode::ParameterNotImplemented,
                    "Unrecognized authentication mechanism",
                ))
                .await?;
            }
        }
        Ok(Outcome::Continue)
    }

    async fn read_auth_line(&mut self) -> Result<String, SessionError> {
        let raw = self.conn().read_line(COMMAND_LINE_LIMIT).await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    async fn write_challenge(&mut self, challenge: &[u8]) -> Result<(), SessionError> {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::STANDARD.encode(challenge);
        self.conn().write_line(&format!("334 {encoded}")).await?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    use super::*;
    use crate::handlers::NoopHandlers;

    fn peer() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end_matches(['\r', '\n']).to_string()
    }

    #[tokio::test]
    async fn kth_invalid_command_gets_500_then_421_and_closes() {
        let (client_stream, server_stream) = tokio::io::duplex(8192);
        let config = SessionConfig::builder()
            .with_max_invalid_commands(2)
            .with_handlers(Arc::new(NoopHandlers))
            .build();
        let session = Session::new(server_stream, peer(), config);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(session.run(shutdown_rx));

        let mut client = BufReader::new(client_stream);
        assert!(read_line(&mut client).await.starts_with("220"));

        client.write_all(b"GARBAGE\r\n").await.unwrap();
        assert!(read_line(&mut client).await.starts_with("500"));

        client.write_all(b"GARBAGE\r\n").await.unwrap();
        assert!(read_line(&mut client).await.starts_with("421"));

        // The server closes the connection once the cap is hit; further reads see EOF.
        let mut trailing = String::new();
        let n = client.read_line(&mut trailing).await.unwrap();
        assert_eq!(n, 0, "connection should be closed after the invalid-command cap is hit");
    }

    #[tokio::test]
    async fn a_second_transaction_needs_no_rset() {
        let (client_stream, server_stream) = tokio::io::duplex(8192);
        let config = SessionConfig::builder().with_handlers(Arc::new(NoopHandlers)).build();
        let session = Session::new(server_stream, peer(), config);
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        tokio::spawn(session.run(shutdown_rx));

        let mut client = BufReader::new(client_stream);
        assert!(read_line(&mut client).await.starts_with("220"));

        client.write_all(b"EHLO c.test\r\n").await.unwrap();
        loop {
            let line = read_line(&mut client).await;
            if line.as_bytes().get(3) != Some(&b'-') {
                break;
            }
        }

        for _ in 0..2 {
            client.write_all(b"MAIL FROM:<a@x>\r\n").await.unwrap();
            assert!(read_line(&mut client).await.starts_with("250"));
            client.write_all(b"RCPT TO:<b@y>\r\n").await.unwrap();
            assert!(read_line(&mut client).await.starts_with("250"));
            client.write_all(b"DATA\r\n").await.unwrap();
            assert!(read_line(&mut client).await.starts_with("354"));
            client.write_all(b"Hi\r\n.\r\n").await.unwrap();
            // No RSET between transactions: `finish_transaction` already reset state/transaction.
            assert!(read_line(&mut client).await.starts_with("250"));
        }
    }
}
