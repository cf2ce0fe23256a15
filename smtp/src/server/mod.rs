//! The server: admission control, the per-connection accept loop, and graceful shutdown
//! (§4.4, §5). Split into [`listener`] (the accept loop itself) and [`controller`] (lifecycle:
//! spawn/shutdown/close), mirroring the reference workspace's `Listener`/`Controller` split.

mod controller;
mod listener;

pub use controller::{Controller, ControllerConfig};
pub use listener::Listener;
