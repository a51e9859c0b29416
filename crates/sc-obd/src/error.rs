//! Error types for the channel, session, formatter, decoder and catalog.

use thiserror::Error;

use crate::formula::FormulaError;

/// Errors raised by a physical or trace channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to open channel {target}: {message}")]
    Open { target: String, message: String },

    #[error("channel I/O error: {0}")]
    Io(String),

    #[error("channel is closed")]
    Closed,
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Io(err.to_string())
    }
}

/// Convenience alias for channel results.
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Errors raised by the transport session. All of these abort the
/// attempted operation; transport faults that only degrade a record
/// (timeouts, echo mismatch, buffer overflow) are logged instead.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no channel configured")]
    NoChannel,

    #[error("reader already connected")]
    AlreadyConnected,

    #[error("reader not connected: cannot {operation}")]
    NotConnected { operation: &'static str },

    #[error("unrecognized reader device type: {0}")]
    UnknownDevice(String),

    #[error("response to {command} still pending; receive it first")]
    ResponsePending { command: String },

    #[error("connection failed: {0}")]
    Connect(String),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Format(#[from] FormatError),
}

/// Convenience alias for session results.
pub type SessionResult<T> = Result<T, SessionError>;

/// Structural errors found while reassembling a record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("invalid hex byte token {token:?}")]
    InvalidToken { token: String },

    #[error("line {line} has {tokens} tokens, need at least {needed} for header, mode, pid and checksum")]
    TruncatedHeader {
        line: usize,
        tokens: usize,
        needed: usize,
    },
}

/// Structural decode failures. Semantic failures are readings, not errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("payload is empty")]
    Empty,

    #[error("mode {mode:02X} response is missing its parameter id")]
    MissingParameterId { mode: u8 },
}

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("I/O error reading catalog {path}: {message}")]
    Io { path: String, message: String },

    #[error("catalog parse error: {0}")]
    Parse(String),

    #[error("bad formula for {key} ({formula:?}): {source}")]
    Formula {
        key: String,
        formula: String,
        source: FormulaError,
    },
}

impl From<toml::de::Error> for CatalogError {
    fn from(err: toml::de::Error) -> Self {
        CatalogError::Parse(err.to_string())
    }
}
