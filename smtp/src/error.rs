//! Error taxonomy for the wire codec, connection, session, and listener layers.
//!
//! Each enum corresponds to one failing layer (SPEC_FULL.md §7.1); lower-layer errors are
//! wrapped with `#[from]` rather than stringified.

use smtp_common::ProtocolError;

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    #[error("line exceeded {max} bytes")]
    LineTooLong { max: usize },
    #[error("reply code {0:?} is not three digits")]
    MalformedCode(String),
    #[error("invalid reply continuation separator at {0:?}")]
    InvalidSeparator(String),
    #[error("line contained a NUL byte")]
    NulByte,
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to send: {0}")]
    Send(std::io::Error),
    #[error("failed to receive: {0}")]
    Receive(std::io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
}

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("I/O error during TLS handshake: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to load certificate from {path}: {source}")]
    CertificateLoad { path: String, source: std::io::Error },
    #[error("failed to load private key from {path}: {reason}")]
    KeyLoad { path: String, reason: String },
    #[error("TLS upgrade failed")]
    UpgradeFailed,
    #[error("rustls error: {0}")]
    Rustls(#[from] tokio_rustls::rustls::Error),
    #[error("TLS is not configured for this session")]
    NotConfigured,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error("session shut down by server")]
    Shutdown,
    #[error("session timed out after {0}s")]
    Timeout(u64),
    #[error("too many invalid commands")]
    TooManyInvalidCommands,
}

impl SessionError {
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::Shutdown)
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::TooManyInvalidCommands | Self::Timeout(_))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    #[error("failed to bind {address}: {source}")]
    BindFailed { address: String, source: std::io::Error },
    #[error("accept failed: {0}")]
    AcceptFailed(#[from] std::io::Error),
    #[error("listener is shutting down")]
    Shutdown,
}

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Listener(#[from] ListenerError),
    #[error("controller did not drain within {0}s")]
    ShutdownTimeout(u64),
    #[error("controller is already running")]
    AlreadyRunning,
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Tls(#[from] TlsError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("operation timed out")]
    Timeout,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("expected reply code {expected}, got {got}")]
    UnexpectedReply { expected: u32, got: u32 },
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
}

impl ClientError {
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Protocol(err) => err.is_transient(),
            Self::Timeout | Self::ConnectionClosed | Self::Io(_) => true,
            _ => false,
        }
    }
}
