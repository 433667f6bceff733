use crate::state::records::RecordError;
use std::io;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("storage lock not acquired within {0:?}")]
pub struct LockTimeout(pub Duration);

/// Why a state record could not be loaded
///
/// Every variant leaves the caller's in-memory state untouched.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("record '{0}' not found")]
    NotFound(String),

    #[error("failed to open record '{name}': {source}")]
    Open {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("header of record '{0}' is unreadable")]
    HeaderRead(String),

    #[error("record '{name}' has format version {found}, expected {expected}")]
    VersionMismatch { name: String, found: u8, expected: u8 },

    #[error("record '{name}' holds {found} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        found: u32,
        expected: usize,
    },

    #[error("record '{0}' is shorter than its header declares")]
    Truncated(String),

    #[error("checksum mismatch in record '{0}'")]
    ChecksumMismatch(String),

    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),

    #[error("failed to decode record '{name}': {source}")]
    Decode {
        name: String,
        #[source]
        source: RecordError,
    },
}

impl LoadError {
    /// Short failure kind for status lines
    pub fn kind(&self) -> &'static str {
        match self {
            LoadError::NotFound(_) => "not found",
            LoadError::Open { .. } => "open error",
            LoadError::HeaderRead(_) => "header read error",
            LoadError::VersionMismatch { .. } => "version mismatch",
            LoadError::SizeMismatch { .. } => "size mismatch",
            LoadError::Truncated(_) => "truncated",
            LoadError::ChecksumMismatch(_) => "checksum mismatch",
            LoadError::LockTimeout(_) => "lock timeout",
            LoadError::Decode { .. } => "decode error",
        }
    }
}

#[derive(Debug, Error)]
pub enum SaveError {
    #[error("failed to write record '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("record '{name}' is too large ({len} bytes)")]
    TooLarge { name: String, len: usize },

    #[error("record '{name}' cannot be encoded: {source}")]
    Encode {
        name: String,
        #[source]
        source: RecordError,
    },

    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
}

#[derive(Debug, Error)]
pub enum LogError {
    #[error("log I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    LockTimeout(#[from] LockTimeout),
}
