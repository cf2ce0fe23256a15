//! Plain, serde-derived configuration structs (§1.1 "Configuration"). These are a separate,
//! deserializable layer over the builder-constructed [`crate::session::SessionConfig`] /
//! [`crate::server::ControllerConfig`] — the builders hold an `Arc<dyn Handlers>`, which has
//! no sensible serialized form, so a [`ServerConfig`] carries only the knobs a TOML/JSON/env
//! source can supply and is turned into a [`ControllerConfig`] by handing it handlers at
//! startup. Grounded on the reference workspace's `empath-common::config` module (the
//! `ServerTimeouts`/`ClientTimeouts` split, `#[serde(default = "defaults::...")]` per field,
//! and a `defaults` submodule of const functions).

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::connection::TlsContext;
use crate::handlers::Handlers;
use crate::server::ControllerConfig;
use crate::session::SessionConfig;

/// RFC 5321-recommended server-side timeouts, expressed in whole seconds so they deserialize
/// from plain numbers rather than `Duration`'s nested `{secs, nanos}` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpServerTimeouts {
    /// Timeout for reading one command line. Default: 300s (5 minutes, per RFC 5321).
    #[serde(default = "defaults::read_secs")]
    pub read_secs: u64,
    /// Timeout for writing one reply line. Default: 300s.
    #[serde(default = "defaults::write_secs")]
    pub write_secs: u64,
}

impl Default for SmtpServerTimeouts {
    fn default() -> Self {
        Self { read_secs: defaults::read_secs(), write_secs: defaults::write_secs() }
    }
}

impl SmtpServerTimeouts {
    #[must_use]
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_secs)
    }

    #[must_use]
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_secs)
    }
}

/// The server option table from §6, minus the `Arc<dyn Handlers>` and `tracing` subscriber
/// that a config file cannot express.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub listen_address: SocketAddr,
    #[serde(default = "defaults::hostname")]
    pub hostname: String,
    #[serde(default = "defaults::max_connections")]
    pub max_connections: usize,
    #[serde(default = "defaults::max_message_size")]
    pub max_message_size: usize,
    #[serde(default = "defaults::max_recipients")]
    pub max_recipients: usize,
    #[serde(default = "defaults::max_invalid_commands")]
    pub max_invalid_commands: u32,
    #[serde(default)]
    pub submission_mode: bool,
    #[serde(default)]
    pub tls: Option<TlsContext>,
    #[serde(default)]
    pub timeouts: SmtpServerTimeouts,
}

impl ServerConfig {
    /// Completes this config with the one piece it cannot carry — the application's handler
    /// set — and builds the runtime [`ControllerConfig`].
    #[must_use]
    pub fn into_controller_config(self, handlers: Arc<dyn Handlers>) -> ControllerConfig {
        let session = SessionConfig::builder()
            .with_hostname(self.hostname)
            .with_read_timeout(self.timeouts.read_timeout())
            .with_write_timeout(self.timeouts.write_timeout())
            .with_max_message_size(self.max_message_size)
            .with_max_recipients(self.max_recipients)
            .with_max_invalid_commands(self.max_invalid_commands)
            .with_tls_context(self.tls)
            .with_submission_mode(self.submission_mode)
            .with_handlers(handlers)
            .build();
        ControllerConfig { listen_address: self.listen_address, max_connections: self.max_connections, session }
    }
}

mod defaults {
    pub const fn read_secs() -> u64 {
        300
    }
    pub const fn write_secs() -> u64 {
        300
    }
    pub fn hostname() -> String {
        "localhost".to_string()
    }
    pub const fn max_connections() -> usize {
        1000
    }
    pub const fn max_message_size() -> usize {
        10 * 1024 * 1024
    }
    pub const fn max_recipients() -> usize {
        100
    }
    pub const fn max_invalid_commands() -> u32 {
        10
    }
}
