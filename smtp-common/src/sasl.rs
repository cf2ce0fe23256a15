//! Client-side SASL mechanisms (§4.2): PLAIN (RFC 4616), LOGIN, and CRAM-MD5 (RFC 2195).

use hmac::{Hmac, Mac};
use md5::Md5;

#[derive(Debug, thiserror::Error)]
pub enum SaslError {
    #[error("mechanism {0} does not accept a further challenge")]
    NoFurtherChallenge(&'static str),
    #[error("challenge was not valid UTF-8")]
    InvalidChallenge,
}

/// A client-side SASL mechanism: an initial response, then zero or more challenge/response
/// turns.
pub trait Mechanism {
    fn name(&self) -> &'static str;

    /// The initial response sent alongside `AUTH <mech>`, if the mechanism has one.
    fn start(&mut self) -> Option<Vec<u8>>;

    /// Computes the response to a server challenge.
    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError>;
}

pub struct Plain {
    authzid: String,
    username: String,
    password: String,
    started: bool,
}

impl Plain {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { authzid: String::new(), username: username.into(), password: password.into(), started: false }
    }
}

impl Mechanism for Plain {
    fn name(&self) -> &'static str {
        "PLAIN"
    }

    fn start(&mut self) -> Option<Vec<u8>> {
        self.started = true;
        let mut buf = Vec::new();
        buf.extend_from_slice(self.authzid.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.username.as_bytes());
        buf.push(0);
        buf.extend_from_slice(self.password.as_bytes());
        Some(buf)
    }

    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        Err(SaslError::NoFurtherChallenge("PLAIN"))
    }
}

pub struct Login {
    username: String,
    password: String,
    turn: u8,
}

impl Login {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self { username: username.into(), password: password.into(), turn: 0 }
    }
}

impl Mechanism for Login {
    fn name(&self) -> &'static str {
        "LOGIN"
    }

    fn start(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn next(&mut self, _challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        self.turn += 1;
        match self.turn {
            1 => Ok(self.username.clone().into_bytes()),
            2 => Ok(self.password.clone().into_bytes()),
            _ => Err(SaslError::NoFurtherChallenge("LOGIN")),
        }
    }
}

pub struct CramMd5 {
    username: String,
    secret: String,
}

impl CramMd5 {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self { username: username.into(), secret: secret.into() }
    }
}

impl Mechanism for CramMd5 {
    fn name(&self) -> &'static str {
        "CRAM-MD5"
    }

    fn start(&mut self) -> Option<Vec<u8>> {
        None
    }

    fn next(&mut self, challenge: &[u8]) -> Result<Vec<u8>, SaslError> {
        let digest = hmac_md5_hex(self.secret.as_bytes(), challenge);
        Ok(format!("{} {digest}", self.username).into_bytes())
    }
}

/// `HEX(HMAC-MD5(secret, challenge))`, the CRAM-MD5 response body (RFC 2195 §3).
pub fn hmac_md5_hex(secret: &[u8], challenge: &[u8]) -> String {
    let mut mac = Hmac::<Md5>::new_from_slice(secret).expect("HMAC accepts keys of any length");
    mac.update(challenge);
    hex::encode(mac.finalize().into_bytes())
}
