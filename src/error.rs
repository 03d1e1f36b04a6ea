//! Error types for the title installer.

use crate::config::{FS_STATUS_EXISTS, FS_STATUS_NOT_FOUND, GENERIC_FAILURE_CODE};
use thiserror::Error;

/// Result type alias for installer setup and configuration.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while building paths, configs and backends.
///
/// These never come out of an install or uninstall call; those report
/// [`crate::InstallFailure`] instead.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during backend setup.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Derived path exceeds the fixed maximum.
    #[error("Path too long ({len} > {max}): {path}")]
    PathTooLong { path: String, len: usize, max: usize },

    /// Title identifier could not be parsed.
    #[error("Invalid title id: {0}")]
    InvalidTitleId(String),

    /// Volume name is unusable as a path prefix.
    #[error("Invalid volume: {0}")]
    InvalidVolume(String),

    /// Host directory backing a volume does not exist.
    #[error("Volume root not found: {0}")]
    VolumeNotFound(std::path::PathBuf),

    /// Wire protocol error on a storage session.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for Error {
    fn from(e: bincode::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

/// Status of a failed storage adapter call.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// Target already exists.
    #[error("already exists")]
    AlreadyExists,

    /// Target does not exist.
    #[error("not found")]
    NotFound,

    /// Fewer bytes were written than requested.
    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { expected: usize, written: usize },

    /// Any other failure, carrying the raw (negative) status code.
    #[error("storage failure {0}")]
    Other(i32),
}

impl FsError {
    /// Raw status code of this failure. Always negative.
    pub fn code(&self) -> i32 {
        match self {
            FsError::AlreadyExists => FS_STATUS_EXISTS,
            FsError::NotFound => FS_STATUS_NOT_FOUND,
            FsError::ShortWrite { .. } => GENERIC_FAILURE_CODE,
            FsError::Other(code) if *code < 0 => *code,
            FsError::Other(_) => GENERIC_FAILURE_CODE,
        }
    }

    /// Classify a raw status code as returned by a filesystem service.
    ///
    /// Returns `None` for success (non-negative) codes.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            c if c >= 0 => None,
            FS_STATUS_EXISTS => Some(FsError::AlreadyExists),
            FS_STATUS_NOT_FOUND => Some(FsError::NotFound),
            c => Some(FsError::Other(c)),
        }
    }

    /// Map a host I/O error onto an adapter status.
    pub fn from_io(e: &std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::AlreadyExists => FsError::AlreadyExists,
            std::io::ErrorKind::NotFound => FsError::NotFound,
            _ => match e.raw_os_error() {
                Some(errno) if errno > 0 => FsError::Other(-errno),
                _ => FsError::Other(GENERIC_FAILURE_CODE),
            },
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(e: std::io::Error) -> Self {
        FsError::from_io(&e)
    }
}
