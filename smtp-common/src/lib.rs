//! Address, reply-code, extension, and SASL model shared by the `smtp` client and server.
//!
//! This crate carries no networking: it is the `M` (Address & Reply Model) component —
//! mailbox parsing, the reply-code taxonomy, enhanced status codes, the extension keyword
//! table, and client-side SASL mechanisms.

pub mod address;
pub mod error;
pub mod extensions;
pub mod logging;
pub mod sasl;
pub mod status;

pub use address::{AddressError, ForwardPath, Mailbox, ReversePath};
pub use error::ProtocolError;
pub use extensions::Extensions;
pub use status::{EnhancedCode, ReplyCode};

pub use tracing;
