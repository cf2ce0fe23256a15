//! Thin `tracing` wrappers standardizing the shape of wire-level log lines.
//!
//! `incoming!`/`outgoing!` log a line read from or written to the peer; `log!` logs a
//! free-form internal event. All three carry a `peer` field so multi-connection logs can be
//! split back apart by session.

/// Initializes a process-wide `tracing` subscriber: compact ANSI output, an RFC3339 timer,
/// and a level filter driven by the `SMTP_LOG` environment variable (default `info`).
pub fn init() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_env("SMTP_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt()
        .with_env_filter(filter)
        .with_ansi(true)
        .with_target(true)
        .compact()
        .try_init();
}

#[macro_export]
macro_rules! incoming {
    ($peer:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::DEBUG, peer = %$peer, direction = "incoming", $($arg)*);
    };
}

#[macro_export]
macro_rules! outgoing {
    ($peer:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::DEBUG, peer = %$peer, direction = "outgoing", $($arg)*);
    };
}

#[macro_export]
macro_rules! internal {
    ($peer:expr, $($arg:tt)*) => {
        tracing::event!(tracing::Level::INFO, peer = %$peer, $($arg)*);
    };
}
