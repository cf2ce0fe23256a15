//! Server-side transport: a [`BufferedReader`] that can be swapped in place for STARTTLS.

use std::{fs::File, io::BufReader as StdBufReader, path::Path, path::PathBuf, sync::Arc};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{
    rustls::pki_types::{CertificateDer, PrivateKeyDer},
    rustls::ServerConfig,
    server::TlsStream,
    TlsAcceptor,
};

use crate::codec::BufferedReader;
use crate::error::TlsError;

/// Paths to a PEM certificate chain and private key. `is_available` gates whether STARTTLS
/// can be advertised/offered at all.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct TlsContext {
    pub certificate: PathBuf,
    pub key: PathBuf,
}

impl TlsContext {
    pub fn new(certificate: impl Into<PathBuf>, key: impl Into<PathBuf>) -> Self {
        Self { certificate: certificate.into(), key: key.into() }
    }

    pub fn is_available(&self) -> bool {
        self.certificate.exists() && self.key.exists()
    }
}

/// A connection whose transport can be upgraded from plaintext to TLS in place. Upgrading
/// discards the old [`BufferedReader`] entirely, so any plaintext a client pipelined ahead of
/// the STARTTLS handshake is never interpreted as post-handshake input (SPEC_FULL.md §7/§9).
pub enum Connection<S: AsyncRead + AsyncWrite + Unpin + Send> {
    Plain(BufferedReader<S>),
    Tls(Box<BufferedReader<TlsStream<S>>>),
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> Connection<S> {
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufferedReader::new(stream))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub async fn read_line(&mut self, max_bytes: usize) -> Result<Vec<u8>, crate::error::ConnectionError> {
        match self {
            Self::Plain(r) => r.read_line(max_bytes).await,
            Self::Tls(r) => r.read_line(max_bytes).await,
        }
    }

    pub async fn read_exact_raw(&mut self, n: usize) -> Result<Vec<u8>, crate::error::ConnectionError> {
        match self {
            Self::Plain(r) => r.read_exact_raw(n).await,
            Self::Tls(r) => r.read_exact_raw(n).await,
        }
    }

    pub async fn read_dot_body(&mut self, max_bytes: usize) -> Result<Vec<u8>, crate::error::ConnectionError> {
        match self {
            Self::Plain(r) => r.read_dot_body(max_bytes).await,
            Self::Tls(r) => r.read_dot_body(max_bytes).await,
        }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), crate::error::ConnectionError> {
        match self {
            Self::Plain(r) => r.write_line(line).await,
            Self::Tls(r) => r.write_line(line).await,
        }
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), crate::error::ConnectionError> {
        match self {
            Self::Plain(r) => r.write_raw(data).await,
            Self::Tls(r) => r.write_raw(data).await,
        }
    }

    fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
        let file = File::open(path)
            .map_err(|source| TlsError::CertificateLoad { path: path.display().to_string(), source })?;
        rustls_pemfile::certs(&mut StdBufReader::new(file))
            .collect::<std::io::Result<_>>()
            .map_err(TlsError::Io)
    }

    fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
        let file = File::open(path)
            .map_err(|source| TlsError::CertificateLoad { path: path.display().to_string(), source })?;
        let mut reader = StdBufReader::new(file);
        match rustls_pemfile::read_one(&mut reader).map_err(TlsError::Io)?.map(Into::into) {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => Ok(PrivateKeyDer::Pkcs1(key)),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => Ok(PrivateKeyDer::Pkcs8(key)),
            Some(rustls_pemfile::Item::Sec1Key(key)) => Ok(PrivateKeyDer::Sec1(key)),
            _ => Err(TlsError::KeyLoad {
                path: path.display().to_string(),
                reason: "unrecognized private key format".into(),
            }),
        }
    }

    /// Performs the server-side TLS handshake and replaces the transport. Only valid on a
    /// [`Connection::Plain`]; repeated STARTTLS is rejected by the session state machine
    /// before this is ever called on a `Tls` variant.
    pub async fn upgrade(self, tls_context: &TlsContext) -> Result<Self, TlsError> {
        if !tls_context.is_available() {
            return Err(TlsError::NotConfigured);
        }
        let raw = match self {
            Self::Plain(reader) => reader.into_inner(),
            Self::Tls(_) => return Err(TlsError::UpgradeFailed),
        };

        let certs = Self::load_certs(&tls_context.certificate)?;
        let key = Self::load_key(&tls_context.key)?;
        let config = ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(certs, key)
            .map_err(TlsError::Rustls)?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let stream = acceptor.accept(raw).await?;

        Ok(Self::Tls(Box::new(BufferedReader::new(stream))))
    }
}
