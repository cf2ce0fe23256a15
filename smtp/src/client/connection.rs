//! Client-side transport: the same [`BufferedReader`]-over-swappable-stream shape as the
//! server's [`crate::connection::Connection`], but upgrading via a `rustls` *client* config
//! (native root certificates) instead of a server one. Grounded on the reference workspace's
//! `client/client.rs` `ClientConnection::{Plain,Tls}` + `upgrade_to_tls`, adapted to reuse
//! [`BufferedReader`] rather than the reference's own hand-rolled read buffer.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::codec::{BufferedReader, DotWriter};
use crate::error::{ConnectionError, TlsError};

pub enum ClientConnection<S: AsyncRead + AsyncWrite + Unpin + Send> {
    Plain(BufferedReader<S>),
    Tls(Box<BufferedReader<TlsStream<S>>>),
}

impl<S: AsyncRead + AsyncWrite + Unpin + Send> ClientConnection<S> {
    pub fn plain(stream: S) -> Self {
        Self::Plain(BufferedReader::new(stream))
    }

    pub fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    pub async fn read_line(&mut self, max_bytes: usize) -> Result<Vec<u8>, ConnectionError> {
        match self {
            Self::Plain(r) => r.read_line(max_bytes).await,
            Self::Tls(r) => r.read_line(max_bytes).await,
        }
    }

    pub async fn read_exact_raw(&mut self, n: usize) -> Result<Vec<u8>, ConnectionError> {
        match self {
            Self::Plain(r) => r.read_exact_raw(n).await,
            Self::Tls(r) => r.read_exact_raw(n).await,
        }
    }

    pub async fn write_line(&mut self, line: &str) -> Result<(), ConnectionError> {
        match self {
            Self::Plain(r) => r.write_line(line).await,
            Self::Tls(r) => r.write_line(line).await,
        }
    }

    pub async fn write_raw(&mut self, data: &[u8]) -> Result<(), ConnectionError> {
        match self {
            Self::Plain(r) => r.write_raw(data).await,
            Self::Tls(r) => r.write_raw(data).await,
        }
    }

    /// Writes `body` through a [`DotWriter`] and closes it with the `CRLF.CRLF` terminator
    /// (§4.1, §4.3 "DATA").
    pub async fn write_dot_body(&mut self, body: &[u8]) -> Result<(), ConnectionError> {
        async fn send<W: AsyncWrite + Unpin>(inner: &mut W, body: &[u8]) -> Result<(), ConnectionError> {
            let mut writer = DotWriter::new(inner);
            writer.write_all(body).await.map_err(ConnectionError::Send)?;
            writer.close().await.map_err(ConnectionError::Send)
        }
        match self {
            Self::Plain(r) => send(r.inner_mut(), body).await,
            Self::Tls(r) => send(r.inner_mut(), body).await,
        }
    }

    /// Performs the TLS handshake as a client for `domain`, discarding `self` and any
    /// buffered plaintext exactly as the server side does (SPEC_FULL.md §4.1/§9).
    pub async fn upgrade(self, domain: &str) -> Result<Self, TlsError> {
        let Self::Plain(reader) = self else {
            return Err(TlsError::UpgradeFailed);
        };
        let stream = reader.into_inner();

        let mut roots = RootCertStore::empty();
        let loaded = rustls_native_certs::load_native_certs();
        for cert in loaded.certs {
            let _ = roots.add(cert);
        }

        let config = ClientConfig::builder().with_root_certificates(roots).with_no_client_auth();
        let connector = TlsConnector::from(Arc::new(config));
        let server_name = ServerName::try_from(domain.to_string()).map_err(|_| TlsError::UpgradeFailed)?;

        let tls_stream = connector.connect(server_name, stream).await?;
        Ok(Self::Tls(Box::new(BufferedReader::new(tls_stream))))
    }
}
