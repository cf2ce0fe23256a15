//! An async SMTP client and server: wire codec, session state machine, and transaction
//! driver over RFC 5321 plus STARTTLS/AUTH/Submission/SIZE/PIPELINING/8BITMIME/DSN/
//! ENHANCEDSTATUSCODES/SMTPUTF8/CHUNKING.

pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod extensions;
pub mod handlers;
pub mod server;
pub mod session;
pub mod state;

pub use command::Command;
pub use error::{ConnectionError, SessionError, TlsError};
pub use handlers::Handlers;
pub use server::{Controller, ControllerConfig, Listener};
pub use session::{Session, SessionConfig, SessionConfigBuilder, Signal};
pub use state::State;

pub use smtp_common::{
    address, extensions as extension_keywords, sasl, AddressError, EnhancedCode, ForwardPath,
    Mailbox, ProtocolError, ReplyCode, ReversePath,
};
