//! Client-side SASL challenge/response loop (§4.3 "Auth"). No teacher precedent (the
//! reference workspace's client never authenticates) — built directly from the AUTH wire
//! contract shared with [`crate::session::auth`], driving any [`smtp_common::sasl::Mechanism`].

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use smtp_common::sasl::Mechanism;
use tokio::io::{AsyncRead, AsyncWrite};

use super::Client;
use crate::error::ClientError;

pub(super) async fn run<S, M>(
    client: &mut Client<S>,
    mut mechanism: M,
    deadline: Duration,
) -> Result<(), ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
    M: Mechanism,
{
    let line = match mechanism.start() {
        Some(initial) => format!("AUTH {} {}", mechanism.name(), BASE64.encode(initial)),
        None => format!("AUTH {}", mechanism.name()),
    };
    let mut reply = client.command(&line, deadline).await?;

    loop {
        match reply.code.code() {
            235 => return Ok(()),
            334 => {
                let challenge_text = reply.lines.first().map(String::as_str).unwrap_or("");
                let challenge = BASE64
                    .decode(challenge_text.trim())
                    .map_err(|_| ClientError::UnexpectedReply { expected: 334, got: 334 })?;
                match mechanism.next(&challenge) {
                    Ok(response) => {
                        reply = client.command(&BASE64.encode(response), deadline).await?;
                    }
                    Err(_) => {
                        let _ = client.command("*", deadline).await;
                        return Err(ClientError::UnexpectedReply { expected: 235, got: reply.code.code() });
                    }
                }
            }
            other => return Err(ClientError::UnexpectedReply { expected: 235, got: other }),
        }
    }
}
