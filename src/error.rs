use derive_more::{Display, From};
use std::time::Duration;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Debug, Display, From)]
pub enum Error {
    /// Non-2xx response, carrying the server's `detail` message
    #[display("{message}")]
    Transport { status: Option<u16>, message: String },

    /// Network-level failure before any response arrived
    #[from]
    #[display("request failed: {_0}")]
    Http(reqwest::Error),

    /// Response body did not match the expected record shape
    #[from]
    #[display("unexpected response shape: {_0}")]
    Decode(serde_json::Error),

    #[display("request timed out after {}ms", _0.as_millis())]
    Timeout(Duration),

    /// Rejected on the caller side before anything was sent
    #[display("invalid input: {_0}")]
    Validation(String),

    #[display("configuration error: {_0}")]
    Config(String),

    #[from]
    Io(std::io::Error),

    #[display("request cancelled")]
    Cancelled,
}

impl std::error::Error for Error {}

impl Error {
    #[must_use]
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        Self::Transport {
            status: Some(status),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } | Self::Http(_) => ErrorKind::Transport,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) | Self::Io(_) => ErrorKind::Other,
        }
    }

    /// HTTP status of the failed exchange, when the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { status, .. } => *status,
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Category of a failure recorded in a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ErrorKind {
    Transport,
    /// Transport subtype: the body arrived but could not be decoded
    Decode,
    Timeout,
    Validation,
    Cancelled,
    Other,
}

impl ErrorKind {
    /// Decode failures and timeouts are reported as transport failures.
    #[must_use]
    pub const fn is_transport(self) -> bool {
        matches!(self, Self::Transport | Self::Decode | Self::Timeout)
    }
}

/// Clonable record of an [`Error`], shared by every waiter on a fetch and
/// kept on the cache entry next to the last good data.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{message}")]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn cancelled() -> Self {
        Self::from(&Error::Cancelled)
    }
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind(),
            status: err.status(),
            message: err.to_string(),
        }
    }
}

impl From<Error> for ErrorInfo {
    fn from(err: Error) -> Self {
        Self::from(&err)
    }
}

impl From<ErrorInfo> for Error {
    fn from(info: ErrorInfo) -> Self {
        match info.kind {
            ErrorKind::Validation => Self::Validation(info.message),
            ErrorKind::Cancelled => Self::Cancelled,
            _ => Self::Transport {
                status: info.status,
                message: info.message,
            },
        }
    }
}
