// Error types for the Ogg container layer
//
// Every fallible operation returns an OggError directly; there is no shared
// "last error" state. Use kind() to branch on the class of failure.

use thiserror::Error;

/// Result type alias for container operations
pub type Result<T> = std::result::Result<T, OggError>;

/// Errors that can occur while reading, writing or splicing Ogg pages
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OggError {
    /// Malformed or corrupt page (sync mismatch, truncation, checksum mismatch)
    #[error("Invalid page: {0}")]
    Invalid(String),

    /// Payload exceeds what the lacing encoding can represent on one page
    #[error("Bad size: {0}")]
    BadSize(String),

    /// A second logical stream was found where only one was expected
    #[error("Multiple streams: expected serial {expected:#010x}, found {found:#010x}")]
    MultiStream { expected: u32, found: u32 },

    /// The splice target shares a page with another packet
    #[error("Packet shares page {sequence} with another packet")]
    SharedPage { sequence: u32 },

    /// A requested packet or header is not present in the stream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Failure reported by the underlying byte store
    #[error("I/O error: {0}")]
    Io(String),
}

/// Fieldless discriminant of an OggError
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Invalid,
    BadSize,
    MultiStream,
    SharedPage,
    NotFound,
    Io,
}

impl OggError {
    /// Create an invalid page error
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::Invalid(msg.into())
    }

    /// Create a bad size error
    pub fn bad_size(msg: impl Into<String>) -> Self {
        Self::BadSize(msg.into())
    }

    /// Create a not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            OggError::Invalid(_) => ErrorKind::Invalid,
            OggError::BadSize(_) => ErrorKind::BadSize,
            OggError::MultiStream { .. } => ErrorKind::MultiStream,
            OggError::SharedPage { .. } => ErrorKind::SharedPage,
            OggError::NotFound(_) => ErrorKind::NotFound,
            OggError::Io(_) => ErrorKind::Io,
        }
    }
}

impl From<std::io::Error> for OggError {
    fn from(e: std::io::Error) -> Self {
        OggError::Io(e.to_string())
    }
}
