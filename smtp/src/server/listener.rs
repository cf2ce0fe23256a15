//! Accept loop for one bound address (§4.4 "Admission control" / "Graceful shutdown").
//! Grounded on the reference workspace's `Listener<Proto>::serve`: a `tokio::select!` race
//! between the shutdown broadcast and `accept()`, spawning one task per connection and
//! draining them with `join_all` on shutdown. Generalized from the reference's
//! protocol-generic `Proto::handle` to a concrete [`Session<TcpStream>`], since this crate has
//! exactly one wire protocol, and from its `Vec<Extension>`/FFI context to a plain
//! [`SessionConfig`].

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::future::join_all;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Semaphore};
use tokio::task::JoinHandle;

use crate::connection::Connection;
use crate::error::ListenerError;
use crate::session::{Session, SessionConfig, Signal};

/// Binds `address` and accepts connections until a [`Signal::Shutdown`] is broadcast, handing
/// each one off to its own [`Session`]. `max_connections` (0 = unlimited) gates admission via a
/// semaphore; a connection that arrives while the semaphore is full is sent
/// `421 4.7.0 Too many connections, try again later` and closed without a session.
pub struct Listener {
    address: SocketAddr,
    session_config: SessionConfig,
    max_connections: usize,
}

impl Listener {
    #[must_use]
    pub fn new(address: SocketAddr, session_config: SessionConfig, max_connections: usize) -> Self {
        Self { address, session_config, max_connections }
    }

    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Runs the accept loop until `shutdown` delivers [`Signal::Shutdown`], then waits for
    /// every spawned session to finish before returning. Does not itself enforce a drain
    /// deadline; that is [`super::Controller::shutdown`]'s job.
    pub async fn serve(&self, mut shutdown: broadcast::Receiver<Signal>) -> Result<(), ListenerError> {
        let listener = TcpListener::bind(self.address)
            .await
            .map_err(|source| ListenerError::BindFailed { address: self.address.to_string(), source })?;

        let semaphore = (self.max_connections > 0).then(|| Arc::new(Semaphore::new(self.max_connections)));
        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        loop {
            tokio::select! {
                biased;

                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) | Err(broadcast::error::RecvError::Closed) => break,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    }
                }

                accepted = listener.accept() => {
                    let (stream, peer) = accepted?;

                    let permit = match &semaphore {
                        Some(sem) => match Arc::clone(sem).try_acquire_owned() {
                            Ok(permit) => Some(permit),
                            Err(_) => {
                                tokio::spawn(reject_too_many_connections(stream));
                                continue;
                            }
                        },
                        None => None,
                    };

                    let session = Session::new(stream, peer, self.session_config.clone());
                    let session_shutdown = shutdown.resubscribe();
                    sessions.push(tokio::spawn(async move {
                        let _permit = permit;
                        if let Err(err) = session.run(session_shutdown).await {
                            tracing::debug!(peer = %peer, error = %err, "session ended");
                        }
                    }));
                }
            }
        }

        join_all(sessions).await;
        Ok(())
    }
}

async fn reject_too_many_connections(stream: TcpStream) {
    let mut connection = Connection::plain(stream);
    let _ = connection.write_line("421 4.7.0 Too many connections, try again later").await;
}
