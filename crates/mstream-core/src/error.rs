//! Error types for stream operations.
//!
//! A stream holds at most one [`Error`] at a time (the "sticky" error).
//! Wrapper streams never build a new error when an inner call fails; they
//! clone the inner value so the root-cause text survives any chain depth.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result type alias for stream operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Coarse classification of a stream failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The stream could not be constructed over its resource.
    Open,
    /// A read from the underlying resource failed.
    Read,
    /// A write to the underlying resource failed.
    Write,
    /// A blocking call was abandoned by the timeout callback.
    Timeout,
    /// A typed or array read got fewer bytes than it needed.
    UnexpectedEof,
    /// The peer violated the framing protocol.
    Protocol,
}

impl ErrorKind {
    /// Stable name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Open => "open_error",
            ErrorKind::Read => "read_error",
            ErrorKind::Write => "write_error",
            ErrorKind::Timeout => "timeout",
            ErrorKind::UnexpectedEof => "unexpected_eof",
            ErrorKind::Protocol => "protocol_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stream error: a kind plus an owned diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
}

impl Error {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error {
            kind,
            message: message.into(),
        }
    }

    /// Create an open error.
    pub fn open(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Open, message)
    }

    /// Create a read error.
    pub fn read(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Read, message)
    }

    /// Create a write error.
    pub fn write(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Write, message)
    }

    /// Create a timeout error.
    pub fn timeout(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Timeout, message)
    }

    /// Create an unexpected EOF error for a read that wanted `wanted` bytes.
    pub fn unexpected_eof(got: usize, wanted: usize) -> Self {
        Error::new(
            ErrorKind::UnexpectedEof,
            format!("unexpected end of file: got {got} of {wanted} bytes"),
        )
    }

    /// Create a protocol error.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::new(ErrorKind::Protocol, message)
    }

    /// Translate an `std::io::Error` raised by a transport.
    pub fn from_io(kind: ErrorKind, context: &str, err: &io::Error) -> Self {
        let kind = match err.kind() {
            io::ErrorKind::UnexpectedEof if kind == ErrorKind::Read => ErrorKind::UnexpectedEof,
            io::ErrorKind::TimedOut => ErrorKind::Timeout,
            _ => kind,
        };
        Error::new(kind, format!("{context}: {err}"))
    }

    /// The error kind.
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The diagnostic message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Check if the caller may retry after clearing the error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }

    /// Get error category for metrics.
    pub fn category(&self) -> &'static str {
        self.kind.name()
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match err.kind {
            ErrorKind::Open => io::ErrorKind::NotFound,
            ErrorKind::Timeout => io::ErrorKind::TimedOut,
            ErrorKind::UnexpectedEof => io::ErrorKind::UnexpectedEof,
            ErrorKind::Protocol => io::ErrorKind::InvalidData,
            ErrorKind::Read | ErrorKind::Write => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
