use std::fmt;
use thiserror::Error;

/// The error type for oss-auth operations.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<anyhow::Error>,
}

/// The kind of error that occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials are missing an access key id or secret.
    EmptyCredentials,

    /// Request cannot be signed (no authority, malformed URL, etc.).
    EmptyRequest,

    /// A presign request carries a missing or malformed parameter.
    InvalidParam,

    /// The requested presign expiration exceeds what the signing scheme allows.
    PresignExpiration,

    /// Unexpected errors (formatting, URL reassembly, etc.).
    Unexpected,
}

impl Error {
    /// Create a new error with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Add a source error.
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Get the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }
}

// Convenience constructors
impl Error {
    /// Create an empty credentials error.
    pub fn empty_credentials(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyCredentials, message)
    }

    /// Create an empty request error.
    pub fn empty_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::EmptyRequest, message)
    }

    /// Create an invalid parameter error.
    pub fn invalid_param(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidParam, message)
    }

    /// Create a presign expiration error.
    pub fn presign_expiration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PresignExpiration, message)
    }

    /// Create an unexpected error.
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unexpected, message)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::EmptyCredentials => write!(f, "empty credentials"),
            ErrorKind::EmptyRequest => write!(f, "empty request"),
            ErrorKind::InvalidParam => write!(f, "invalid parameter"),
            ErrorKind::PresignExpiration => write!(f, "presign expiration out of range"),
            ErrorKind::Unexpected => write!(f, "unexpected error"),
        }
    }
}

/// Convenience type alias for Results.
pub type Result<T> = std::result::Result<T, Error>;

// Common From implementations
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(err)
    }
}

impl From<std::fmt::Error> for Error {
    fn from(err: std::fmt::Error) -> Self {
        Self::unexpected(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::Error> for Error {
    fn from(err: http::Error) -> Self {
        Self::empty_request(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::empty_request(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::InvalidHeaderName> for Error {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::empty_request(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUri> for Error {
    fn from(err: http::uri::InvalidUri) -> Self {
        Self::empty_request(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::uri::InvalidUriParts> for Error {
    fn from(err: http::uri::InvalidUriParts) -> Self {
        Self::empty_request(err.to_string()).with_source(anyhow::Error::from(err))
    }
}

impl From<http::header::ToStrError> for Error {
    fn from(err: http::header::ToStrError) -> Self {
        Self::empty_request(err.to_string()).with_source(anyhow::Error::from(err))
    }
}
