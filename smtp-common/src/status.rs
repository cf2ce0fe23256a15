//! Reply codes (RFC 5321 §4.2) and enhanced status codes (RFC 2034).

use core::fmt::{self, Display, Formatter};

/// A three-digit SMTP reply code in `[100, 599]`.
///
/// The fixed variants cover every code this crate ever emits; anything a remote peer sends
/// that isn't in the table round-trips through [`ReplyCode::Unknown`].
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReplyCode {
    SystemStatus = 211,
    HelpMessage = 214,
    ServiceReady = 220,
    ClosingConnection = 221,
    AuthSucceeded = 235,
    Ok = 250,
    UserNotLocalWillForward = 251,
    CannotVrfy = 252,
    AuthContinue = 334,
    StartMailInput = 354,
    ServiceNotAvailable = 421,
    MailboxUnavailable = 450,
    LocalError = 451,
    InsufficientStorage = 452,
    TemporaryAuthFailure = 454,
    SyntaxError = 500,
    SyntaxErrorInParameters = 501,
    CommandNotImplemented = 502,
    BadSequence = 503,
    ParameterNotImplemented = 504,
    AuthRequired = 530,
    AuthCredentialsInvalid = 535,
    MailboxUnavailablePermanent = 550,
    UserNotLocal = 551,
    ExceededStorage = 552,
    MailboxNameNotAllowed = 553,
    TransactionFailed = 554,
    ParametersNotRecognized = 555,
    Unknown(u32),
}

impl ReplyCode {
    pub fn code(self) -> u32 {
        match self {
            Self::Unknown(n) => n,
            other => {
                // SAFETY-free: `repr(u32)` on a fieldless-except-last enum doesn't let us
                // transmute through `Unknown`, so match every named variant explicitly above
                // and fall back to a literal table here.
                other.named_code()
            }
        }
    }

    fn named_code(self) -> u32 {
        match self {
            Self::SystemStatus => 211,
            Self::HelpMessage => 214,
            Self::ServiceReady => 220,
            Self::ClosingConnection => 221,
            Self::AuthSucceeded => 235,
            Self::Ok => 250,
            Self::UserNotLocalWillForward => 251,
            Self::CannotVrfy => 252,
            Self::AuthContinue => 334,
            Self::StartMailInput => 354,
            Self::ServiceNotAvailable => 421,
            Self::MailboxUnavailable => 450,
            Self::LocalError => 451,
            Self::InsufficientStorage => 452,
            Self::TemporaryAuthFailure => 454,
            Self::SyntaxError => 500,
            Self::SyntaxErrorInParameters => 501,
            Self::CommandNotImplemented => 502,
            Self::BadSequence => 503,
            Self::ParameterNotImplemented => 504,
            Self::AuthRequired => 530,
            Self::AuthCredentialsInvalid => 535,
            Self::MailboxUnavailablePermanent => 550,
            Self::UserNotLocal => 551,
            Self::ExceededStorage => 552,
            Self::MailboxNameNotAllowed => 553,
            Self::TransactionFailed => 554,
            Self::ParametersNotRecognized => 555,
            Self::Unknown(n) => n,
        }
    }

    /// First digit of the code: 2/3 positive, 4 transient, 5 permanent.
    pub fn class(self) -> u32 {
        self.code() / 100
    }

    pub fn is_positive(self) -> bool {
        matches!(self.class(), 2 | 3)
    }

    pub fn is_transient(self) -> bool {
        self.class() == 4
    }

    pub fn is_permanent(self) -> bool {
        self.class() == 5
    }
}

impl From<u32> for ReplyCode {
    fn from(code: u32) -> Self {
        match code {
            211 => Self::SystemStatus,
            214 => Self::HelpMessage,
            220 => Self::ServiceReady,
            221 => Self::ClosingConnection,
            235 => Self::AuthSucceeded,
            250 => Self::Ok,
            251 => Self::UserNotLocalWillForward,
            252 => Self::CannotVrfy,
            334 => Self::AuthContinue,
            354 => Self::StartMailInput,
            421 => Self::ServiceNotAvailable,
            450 => Self::MailboxUnavailable,
            451 => Self::LocalError,
            452 => Self::InsufficientStorage,
            454 => Self::TemporaryAuthFailure,
            500 => Self::SyntaxError,
            501 => Self::SyntaxErrorInParameters,
            502 => Self::CommandNotImplemented,
            503 => Self::BadSequence,
            504 => Self::ParameterNotImplemented,
            530 => Self::AuthRequired,
            535 => Self::AuthCredentialsInvalid,
            550 => Self::MailboxUnavailablePermanent,
            551 => Self::UserNotLocal,
            552 => Self::ExceededStorage,
            553 => Self::MailboxNameNotAllowed,
            554 => Self::TransactionFailed,
            555 => Self::ParametersNotRecognized,
            other => Self::Unknown(other),
        }
    }
}

impl From<ReplyCode> for u32 {
    fn from(status: ReplyCode) -> Self {
        status.code()
    }
}

impl Display for ReplyCode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{:03}", self.code())
    }
}

/// An RFC 2034 enhanced status code triple `(class, subject, detail)`.
///
/// The all-zero triple is the "absent" sentinel: [`EnhancedCode::ABSENT`] never serializes
/// and [`EnhancedCode::parse`] never produces it from real wire text (parsing only accepts
/// `class` in `{2,3,4,5}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnhancedCode {
    pub class: u8,
    pub subject: u16,
    pub detail: u16,
}

impl EnhancedCode {
    pub const ABSENT: Self = Self { class: 0, subject: 0, detail: 0 };

    pub const fn new(class: u8, subject: u16, detail: u16) -> Self {
        Self { class, subject, detail }
    }

    pub fn is_absent(self) -> bool {
        self == Self::ABSENT
    }

    /// Parses a leading `X.Y.Z ` prefix off `text`, returning the code and the remainder.
    /// Returns `(ABSENT, text)` unchanged if there is no valid prefix.
    pub fn parse(text: &str) -> (Self, &str) {
        let Some((prefix, rest)) = text.split_once(' ') else {
            return (Self::ABSENT, text);
        };
        match Self::parse_triple(prefix) {
            Some(code) => (code, rest),
            None => (Self::ABSENT, text),
        }
    }

    fn parse_triple(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, '.');
        let class: u8 = parts.next()?.parse().ok()?;
        if !matches!(class, 2 | 3 | 4 | 5) {
            return None;
        }
        let subject: u16 = parts.next()?.parse().ok()?;
        let detail: u16 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self { class, subject, detail })
    }

    /// Derives the conventional enhanced code for a reply code when no explicit one is
    /// supplied, matching the class of the numeric code (`2.0.0`/`4.0.0`/`5.0.0`).
    pub fn generic_for(code: ReplyCode) -> Self {
        match code.class() {
            2 => Self::new(2, 0, 0),
            4 => Self::new(4, 0, 0),
            5 => Self::new(5, 0, 0),
            _ => Self::ABSENT,
        }
    }
}

impl Display for EnhancedCode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}.{}.{}", self.class, self.subject, self.detail)
    }
}
