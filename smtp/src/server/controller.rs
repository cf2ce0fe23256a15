//! Owns the accept loop's lifecycle: spawn, broadcast shutdown, wait for (or abandon) drain.
//! Grounded on the reference workspace's `Controller<Proto>` (a `Vec<Listener<Proto>>` driven
//! by `join_all` against a shared shutdown broadcast), narrowed to the single listener this
//! crate needs and given the explicit `shutdown(deadline)` / `close()` split SPEC_FULL.md's
//! "Graceful shutdown" calls for, which the reference leaves to its caller (`empath`'s own
//! `shutdown()` function and `SHUTDOWN_BROADCAST`).

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use super::listener::Listener;
use crate::error::{ControllerError, ListenerError};
use crate::session::{SessionConfig, Signal};

/// Configuration for one bound listener (SPEC_FULL.md §6's server option table, minus the
/// per-session fields which live on [`SessionConfig`]).
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub listen_address: SocketAddr,
    pub max_connections: usize,
    pub session: SessionConfig,
}

/// A running server: one accept loop plus the shutdown broadcast that controls it.
/// `spawn` starts accepting immediately; the returned handle is the only way to stop it.
pub struct Controller {
    shutdown_tx: broadcast::Sender<Signal>,
    serve_task: JoinHandle<Result<(), ListenerError>>,
    address: SocketAddr,
}

impl Controller {
    #[must_use]
    pub fn spawn(config: ControllerConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(64);
        let listener = Listener::new(config.listen_address, config.session, config.max_connections);
        let address = listener.address();
        let serve_task = tokio::spawn(async move { listener.serve(shutdown_rx).await });
        Self { shutdown_tx, serve_task, address }
    }

    #[must_use]
    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Closes the listener to new connections, signals every live session to disconnect at
    /// its next command boundary, and waits up to `deadline` for all of them to finish.
    pub async fn shutdown(self, deadline: Duration) -> Result<(), ControllerError> {
        let _ = self.shutdown_tx.send(Signal::Shutdown);
        match tokio::time::timeout(deadline, self.serve_task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(err))) => Err(ControllerError::Listener(err)),
            Ok(Err(_)) | Err(_) => Err(ControllerError::ShutdownTimeout(deadline.as_secs())),
        }
    }

    /// Closes the listener and abandons every live session immediately, without waiting.
    pub fn close(self) {
        self.serve_task.abort();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::handlers::NoopHandlers;
    use std::sync::Arc;

    fn config(port: u16) -> ControllerConfig {
        ControllerConfig {
            listen_address: ([127, 0, 0, 1], port).into(),
            max_connections: 0,
            session: SessionConfig::builder().with_handlers(Arc::new(NoopHandlers)).build(),
        }
    }

    #[tokio::test]
    async fn shutdown_drains_with_no_connections() {
        let controller = Controller::spawn(config(0));
        assert!(controller.shutdown(Duration::from_secs(1)).await.is_ok());
    }

    #[tokio::test]
    async fn close_does_not_block() {
        let controller = Controller::spawn(config(0));
        controller.close();
    }
}
