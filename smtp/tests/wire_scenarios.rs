//! End-to-end wire scenarios from SPEC_FULL.md §8, run in-process over `tokio::io::duplex`:
//! an [`smtp::Session`] on one end, driven either by [`smtp::client::Client`] or (for the
//! STARTTLS malicious-pipelining case, which needs a trust store the client driver doesn't
//! expose) a bare `tokio-rustls` handshake on the other.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::Mutex;

use smtp::client::{Client, ClientConfig};
use smtp::command::{MailParams, RcptParams};
use smtp::connection::TlsContext;
use smtp::handlers::{Body, HandlerResult, Handlers, NoopHandlers};
use smtp::{ForwardPath, Mailbox, ReversePath, Session, SessionConfig};

const DEADLINE: Duration = Duration::from_secs(5);

fn peer() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn client_config() -> ClientConfig {
    ClientConfig { local_name: "c.test".to_string(), dial_timeout: DEADLINE }
}

fn mailbox(local: &str, domain: &str) -> Mailbox {
    Mailbox { local_part: local.to_string(), domain: domain.to_string() }
}

/// Captures the last accepted transaction so tests can assert on what the handler saw.
#[derive(Default)]
struct RecordingHandlers {
    last_body: Mutex<Option<Vec<u8>>>,
}

#[async_trait]
impl Handlers for RecordingHandlers {
    async fn on_data(
        &self,
        _reverse_path: &ReversePath,
        _forward_paths: &[ForwardPath],
        body: Body<'_>,
    ) -> HandlerResult {
        *self.last_body.lock().await = Some(body.0.to_vec());
        Ok(())
    }

    async fn authenticate(&self, _mechanism: &str, _username: &str, _password: &str) -> HandlerResult {
        Ok(())
    }
}

#[tokio::test]
async fn simple_send() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let config = SessionConfig::builder()
        .with_hostname("mail.test")
        .with_max_message_size(10_485_760)
        .with_handlers(Arc::new(NoopHandlers))
        .build();
    let session = Session::new(server_stream, peer(), config);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(session.run(shutdown_rx));

    let mut client = Client::from_stream(client_stream, client_config(), DEADLINE).await.unwrap();
    assert_eq!(client.server_max_size(), 10_485_760);

    let from = ReversePath::Mailbox(mailbox("a", "x"));
    client.mail(&from, &MailParams::default(), DEADLINE).await.unwrap();

    let to = ForwardPath(mailbox("b", "y"));
    client.rcpt(&to, &RcptParams::default(), DEADLINE).await.unwrap();

    client.data(b"Hi\r\n", DEADLINE).await.unwrap();
    client.quit(DEADLINE).await;
}

#[tokio::test]
async fn bdat_two_chunks_are_concatenated_for_the_handler() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let handlers = Arc::new(RecordingHandlers::default());
    let config = SessionConfig::builder().with_handlers(handlers.clone()).build();
    let session = Session::new(server_stream, peer(), config);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(session.run(shutdown_rx));

    let mut client = Client::from_stream(client_stream, client_config(), DEADLINE).await.unwrap();
    client
        .mail(&ReversePath::Mailbox(mailbox("a", "x")), &MailParams::default(), DEADLINE)
        .await
        .unwrap();
    client
        .rcpt(&ForwardPath(mailbox("b", "y")), &RcptParams::default(), DEADLINE)
        .await
        .unwrap();

    client.bdat(b"Part one ", false, DEADLINE).await.unwrap();
    client.bdat(b"part two", true, DEADLINE).await.unwrap();

    let body = handlers.last_body.lock().await.clone().unwrap();
    assert_eq!(body, b"Part one part two");
}

#[tokio::test]
async fn plain_auth_succeeds() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let config = SessionConfig::builder().with_handlers(Arc::new(NoopHandlers)).build();
    let session = Session::new(server_stream, peer(), config);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(session.run(shutdown_rx));

    let mut client = Client::from_stream(client_stream, client_config(), DEADLINE).await.unwrap();
    let mechanism = smtp::sasl::Plain::new("testuser", "testpass");
    client.auth(mechanism, DEADLINE).await.unwrap();
}

#[tokio::test]
async fn submission_without_auth_is_rejected() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let config = SessionConfig::builder()
        .with_submission_mode(true)
        .with_handlers(Arc::new(NoopHandlers))
        .build();
    let session = Session::new(server_stream, peer(), config);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(session.run(shutdown_rx));

    let mut client = Client::from_stream(client_stream, client_config(), DEADLINE).await.unwrap();
    let err = client
        .mail(&ReversePath::Mailbox(mailbox("a", "x")), &MailParams::default(), DEADLINE)
        .await
        .unwrap_err();

    let smtp::error::ClientError::Protocol(protocol_err) = err else {
        panic!("expected a protocol error, got {err:?}");
    };
    assert_eq!(protocol_err.code.code(), 530);
}

#[tokio::test]
async fn submission_succeeds_after_auth() {
    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let config = SessionConfig::builder()
        .with_submission_mode(true)
        .with_handlers(Arc::new(NoopHandlers))
        .build();
    let session = Session::new(server_stream, peer(), config);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(session.run(shutdown_rx));

    let mut client = Client::from_stream(client_stream, client_config(), DEADLINE).await.unwrap();
    client.auth(smtp::sasl::Plain::new("testuser", "testpass"), DEADLINE).await.unwrap();
    client
        .mail(&ReversePath::Mailbox(mailbox("a", "x")), &MailParams::default(), DEADLINE)
        .await
        .unwrap();
}

fn write_temp_pem(contents: &str, suffix: &str) -> std::path::PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let id = COUNTER.fetch_add(1, Ordering::Relaxed);
    let path = std::env::temp_dir().join(format!("smtp-test-{}-{id}.{suffix}", std::process::id()));
    std::fs::write(&path, contents).unwrap();
    path
}

/// Accepts any certificate; the test generates its own self-signed pair and has no interest
/// in exercising the platform trust store (mirrors the reference workspace's own testing-only
/// `NoVerifier`, kept local to this test rather than shipped in the client API).
#[derive(Debug)]
struct AcceptAnyCert;

impl tokio_rustls::rustls::client::danger::ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[tokio_rustls::rustls::pki_types::CertificateDer<'_>],
        _server_name: &tokio_rustls::rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: tokio_rustls::rustls::pki_types::UnixTime,
    ) -> Result<tokio_rustls::rustls::client::danger::ServerCertVerified, tokio_rustls::rustls::Error> {
        Ok(tokio_rustls::rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<tokio_rustls::rustls::client::danger::HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &tokio_rustls::rustls::pki_types::CertificateDer<'_>,
        _dss: &tokio_rustls::rustls::DigitallySignedStruct,
    ) -> Result<tokio_rustls::rustls::client::danger::HandshakeSignatureValid, tokio_rustls::rustls::Error> {
        Ok(tokio_rustls::rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<tokio_rustls::rustls::SignatureScheme> {
        vec![
            tokio_rustls::rustls::SignatureScheme::RSA_PKCS1_SHA256,
            tokio_rustls::rustls::SignatureScheme::ECDSA_NISTP256_SHA256,
            tokio_rustls::rustls::SignatureScheme::ED25519,
        ]
    }
}

/// Reads one line (without its CRLF) from a raw buffered stream, for driving the protocol
/// manually where the `Client` driver's trust-store assumptions don't apply.
async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> String {
    let mut line = String::new();
    reader.read_line(&mut line).await.unwrap();
    line.trim_end_matches(['\r', '\n']).to_string()
}

#[tokio::test]
async fn starttls_round_trip_discards_pipelined_bytes() {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let cert_path = write_temp_pem(&cert.pem(), "cert.pem");
    let key_path = write_temp_pem(&key_pair.serialize_pem(), "key.pem");

    let (client_stream, server_stream) = tokio::io::duplex(8192);
    let config = SessionConfig::builder()
        .with_tls_context(Some(TlsContext::new(cert_path, key_path)))
        .with_handlers(Arc::new(NoopHandlers))
        .build();
    let session = Session::new(server_stream, peer(), config);
    let (_shutdown_tx, shutdown_rx) = tokio::sync::broadcast::channel(1);
    tokio::spawn(session.run(shutdown_rx));

    let mut client = BufReader::new(client_stream);
    assert!(read_line(&mut client).await.starts_with("220"));

    // STARTTLS is only allowed once greeted (State::Greeted); EHLO first.
    client.write_all(b"EHLO c.test\r\n").await.unwrap();
    loop {
        let line = read_line(&mut client).await;
        if line.as_bytes().get(3) != Some(&b'-') {
            break;
        }
    }

    // Pipeline STARTTLS together with a command that must never be processed once the
    // handshake completes (SPEC_FULL.md §9 "TLS upgrade and stream hygiene").
    client.write_all(b"STARTTLS\r\nNOOP\r\n").await.unwrap();
    assert!(read_line(&mut client).await.starts_with("220"));

    let tls_config = tokio_rustls::rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
        .with_no_client_auth();
    let connector = tokio_rustls::TlsConnector::from(Arc::new(tls_config));
    let server_name =
        tokio_rustls::rustls::pki_types::ServerName::try_from("localhost".to_string()).unwrap();
    let tls_stream = connector.connect(server_name, client).await.unwrap();
    let mut tls_stream = BufReader::new(tls_stream);

    // STARTTLS wipes the state back to `New`; MAIL before the mandatory re-EHLO is 503.
    tls_stream.write_all(b"MAIL FROM:<a@x>\r\n").await.unwrap();
    assert!(read_line(&mut tls_stream).await.starts_with("503"));

    tls_stream.write_all(b"EHLO c.test\r\n").await.unwrap();
    let mut saw_starttls = false;
    loop {
        let line = read_line(&mut tls_stream).await;
        if line.contains("STARTTLS") {
            saw_starttls = true;
        }
        if line.as_bytes().get(3) != Some(&b'-') {
            break;
        }
    }
    assert!(!saw_starttls, "STARTTLS must not be re-advertised once the session is already TLS");

    // The pipelined NOOP was discarded, not processed: the state machine is exactly where a
    // fresh EHLO leaves it (Greeted), so MAIL is allowed and succeeds normally.
    tls_stream.write_all(b"MAIL FROM:<a@x>\r\n").await.unwrap();
    assert!(read_line(&mut tls_stream).await.starts_with("250"));
}
