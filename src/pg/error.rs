//! Error types for the PostgreSQL protocol implementation.

use std::fmt;
use std::io;
use std::str::Utf8Error;

use thiserror::Error;

use super::types::WireType;

/// Result type for PostgreSQL operations.
pub type PgResult<T> = Result<T, PgError>;

/// Errors that can occur during PostgreSQL operations.
#[derive(Debug)]
pub enum PgError {
    /// I/O error during communication. The connection is unusable afterwards.
    Io(io::Error),

    /// Protocol error (unexpected message, invalid format, etc.).
    Protocol(String),

    /// Authentication failed.
    Auth(String),

    /// Server returned an error.
    Server {
        severity: String,
        code: String,
        message: String,
        detail: Option<String>,
        hint: Option<String>,
    },

    /// A field value could not be decoded.
    Decode(DecodeError),

    /// Parameters could not be encoded into a Bind message. Nothing was sent.
    Encode(String),

    /// Connection is closed or in invalid state.
    ConnectionClosed,

    /// A single-row query returned no rows.
    NoRows,
}

impl PgError {
    /// Whether this error left the connection unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PgError::Io(_) | PgError::ConnectionClosed)
    }
}

impl fmt::Display for PgError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PgError::Io(e) => write!(f, "I/O error: {}", e),
            PgError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            PgError::Auth(msg) => write!(f, "Authentication failed: {}", msg),
            PgError::Server {
                severity,
                code,
                message,
                detail,
                hint,
            } => {
                write!(f, "{}: {} ({})", severity, message, code)?;
                if let Some(d) = detail {
                    write!(f, "\nDetail: {}", d)?;
                }
                if let Some(h) = hint {
                    write!(f, "\nHint: {}", h)?;
                }
                Ok(())
            }
            PgError::Decode(e) => write!(f, "Decode error: {}", e),
            PgError::Encode(msg) => write!(f, "Encode error: {}", msg),
            PgError::ConnectionClosed => write!(f, "Connection is closed"),
            PgError::NoRows => write!(f, "Query returned no rows"),
        }
    }
}

impl std::error::Error for PgError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PgError::Io(e) => Some(e),
            PgError::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for PgError {
    fn from(e: io::Error) -> Self {
        PgError::Io(e)
    }
}

impl From<DecodeError> for PgError {
    fn from(e: DecodeError) -> Self {
        PgError::Decode(e)
    }
}

/// Failure to decode one binary field value.
///
/// Latched by [`DecodeContext`](super::reader::DecodeContext) until drained.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("invalid length for {ty}: expected {expected} bytes, got {actual}")]
    InvalidLength {
        ty: WireType,
        expected: usize,
        actual: usize,
    },

    #[error("truncated {ty} value: needed {needed} bytes, {remaining} remaining")]
    Truncated {
        ty: WireType,
        needed: usize,
        remaining: usize,
    },

    #[error("unexpected NULL for {0}")]
    UnexpectedNull(WireType),

    #[error("invalid UTF-8 in {ty}: {source}")]
    InvalidUtf8 {
        ty: WireType,
        #[source]
        source: Utf8Error,
    },

    #[error("{0} value out of range")]
    OutOfRange(WireType),

    #[error("{ty}: unsupported array dimension count {dims}")]
    UnsupportedDimensions { ty: WireType, dims: i32 },

    #[error("{0}: NULL array elements are not supported")]
    NullElement(WireType),

    #[error("{ty}: invalid element count {count}")]
    InvalidElementCount { ty: WireType, count: i32 },

    #[error("{ty}: {remaining} trailing bytes after value")]
    TrailingBytes { ty: WireType, remaining: usize },

    #[error("no column at index {0}")]
    ColumnOutOfRange(usize),
}
