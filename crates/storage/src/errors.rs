use std::fmt;

use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Classification of a [`StorageError`].
///
/// Callers normally only need to know that an operation failed; the kind is
/// there for logging and for tests that assert on a specific failure path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// An operation was invoked before `initialize` succeeded.
    Uninitialized,
    /// Creating, reading, writing or removing a file failed.
    Io,
    /// A document could not be parsed, or a value cannot be represented by the codec.
    Encoding,
    /// A context or key was rejected before touching the filesystem.
    InvalidArgument,
}

impl ErrorKind {
    /// Stable numeric code for external mapping/logging
    pub fn code(&self) -> u16 {
        match self {
            ErrorKind::Uninitialized => 1001,
            ErrorKind::Io => 1101,
            ErrorKind::Encoding => 1102,
            ErrorKind::InvalidArgument => 1201,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Uninitialized => "storage not initialized",
            ErrorKind::Io => "i/o error",
            ErrorKind::Encoding => "encoding error",
            ErrorKind::InvalidArgument => "invalid argument",
        };
        f.write_str(s)
    }
}

/// The single error type crossing the [`StorageBackend`](crate::StorageBackend) boundary.
///
/// Carries an optional detail message and an optional wrapped cause, exposed
/// through [`std::error::Error::source`]. Absence of data is never an error.
#[derive(Debug, Error)]
#[error("{kind}: {}", .message.as_deref().unwrap_or("no details"))]
pub struct StorageError {
    kind: ErrorKind,
    message: Option<String>,
    #[source]
    source: Option<BoxError>,
}

impl StorageError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: Some(message.into()), source: None }
    }

    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self { kind, message: Some(message.into()), source: Some(source.into()) }
    }

    pub fn uninitialized(backend: &str) -> Self {
        Self::new(
            ErrorKind::Uninitialized,
            format!("cannot use the {backend} without calling initialize() first"),
        )
    }

    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::with_source(ErrorKind::Io, message, source)
    }

    pub fn encoding(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::with_source(ErrorKind::Encoding, message, source)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn is_uninitialized(&self) -> bool {
        self.kind == ErrorKind::Uninitialized
    }
}

pub type Result<T, E = StorageError> = std::result::Result<T, E>;
