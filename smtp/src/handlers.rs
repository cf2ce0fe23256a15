//! The application-facing handler set (§6). Every method is optional (default no-op "ok")
//! so a consumer overrides only the stages it cares about.

use std::net::SocketAddr;

use async_trait::async_trait;
use smtp_common::{ForwardPath, ProtocolError, ReplyCode, ReversePath};

pub type HandlerResult = Result<(), ProtocolError>;

fn internal_error() -> ProtocolError {
    ProtocolError::generic(ReplyCode::LocalError, "Internal error")
}

/// Mapped onto [`HandlerResult`] by anything a handler body might fail with that *isn't*
/// already a [`ProtocolError`] — such an error always becomes `451 4.4.0 Internal error`.
pub fn into_handler_result<E>(result: Result<(), E>) -> HandlerResult
where
    E: Into<ProtocolError>,
{
    result.map_err(Into::into)
}

/// A body reader handed to [`Handlers::on_data`]/BDAT delivery: the fully assembled,
/// destuffed message bytes. A streaming reader is unnecessary at this layer since the
/// session already buffers the whole transaction body before invoking the handler.
pub struct Body<'a>(pub &'a [u8]);

/// Optional per-stage callbacks invoked by the server session (§6). Implementations must be
/// safe under concurrent invocation — one instance is shared across all sessions.
#[async_trait]
pub trait Handlers: Send + Sync {
    async fn on_connect(&self, _remote_addr: SocketAddr) -> HandlerResult {
        Ok(())
    }

    async fn on_helo(&self, _client_name: &str) -> HandlerResult {
        Ok(())
    }

    async fn on_mail(&self, _reverse_path: &ReversePath) -> HandlerResult {
        Ok(())
    }

    async fn on_rcpt(&self, _forward_path: &ForwardPath) -> HandlerResult {
        Ok(())
    }

    async fn on_data(
        &self,
        _reverse_path: &ReversePath,
        _forward_paths: &[ForwardPath],
        _body: Body<'_>,
    ) -> HandlerResult {
        Ok(())
    }

    async fn on_reset(&self) {}

    /// Returns the text to include in the VRFY reply, and whether the verb is considered to
    /// have succeeded (352/250-class) or failed (the reply code in the error).
    async fn on_vrfy(&self, _param: &str) -> (String, HandlerResult) {
        (
            "Cannot VRFY".to_string(),
            Err(ProtocolError::generic(ReplyCode::CannotVrfy, "Cannot VRFY user")),
        )
    }

    /// `mechanism` is `"PLAIN"`, `"LOGIN"`, or `"CRAM-MD5"`; for CRAM-MD5, `password` carries
    /// `"<challenge>:<digest>"` rather than a plaintext password (SPEC_FULL.md §9, CRAM-MD5
    /// interface quirk).
    async fn authenticate(&self, _mechanism: &str, _username: &str, _password: &str) -> HandlerResult {
        Err(ProtocolError::generic(ReplyCode::AuthCredentialsInvalid, "Authentication failed"))
    }

    /// Whether AUTH should be offered at all (§4.4: "Not offered if no AuthHandler"). The
    /// default `authenticate` above always fails credentials, which is a different thing from
    /// not having an auth handler configured — implementations that actually check credentials
    /// must override this to `true`.
    fn has_auth_handler(&self) -> bool {
        false
    }
}

/// A `Handlers` implementation that accepts everything: useful for tests and for servers that
/// only want the protocol machinery without any policy.
pub struct NoopHandlers;

#[async_trait]
impl Handlers for NoopHandlers {
    async fn authenticate(&self, _mechanism: &str, _username: &str, _password: &str) -> HandlerResult {
        Ok(())
    }

    fn has_auth_handler(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn default_vrfy_is_cannot_vrfy() {
        let (text, result) = NoopHandlers.on_vrfy("someone").await;
        assert_eq!(text, "Cannot VRFY");
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn noop_handlers_accept_everything_else() {
        let handlers = NoopHandlers;
        assert!(handlers.on_connect("127.0.0.1:2525".parse().unwrap()).await.is_ok());
        assert!(handlers.on_helo("client").await.is_ok());
        assert!(handlers.authenticate("PLAIN", "u", "p").await.is_ok());
    }

    #[test]
    fn internal_error_is_four_five_one() {
        assert_eq!(internal_error().code, ReplyCode::LocalError);
    }

    struct NoAuthHandlers;

    #[async_trait]
    impl Handlers for NoAuthHandlers {}

    #[test]
    fn has_auth_handler_defaults_to_false() {
        assert!(!NoAuthHandlers.has_auth_handler());
    }

    #[test]
    fn noop_handlers_reports_auth_configured() {
        assert!(NoopHandlers.has_auth_handler());
    }
}
